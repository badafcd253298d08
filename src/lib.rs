//! Definition References
//!
//! A reference-integrity engine for large, hierarchical, human-edited
//! application definitions. Fields that a person fills in with a *name*
//! ("User", "email") are treated internally like foreign keys holding the
//! target's stable *id*.
//!
//! ## Features
//!
//! - **Discovery**: schema wrappers register entities and references while a
//!   document is validated, without knowing the document's shape up front
//! - **Scoped Resolution**: context slots restrict a reference to the children
//!   of an enclosing entity
//! - **Derived Names**: entity names computed from other entities' names,
//!   evaluated in dependency order
//! - **Rename Propagation**: renamed entities are rewritten into every
//!   reference, to a fixed point
//! - **Delete Planning**: `on_delete` policies turned into concrete actions
//!
//! ## Pipeline
//!
//! ```text
//! raw document
//!   └─ Schema::parse ──────────────► MarkedValue (data + side channel)
//!        └─ extract_definition_refs ► UnresolvedPayload
//!             └─ resolve_ref_payload_names ► RefPayload { data, entities, references }
//!
//! (old document, new document)
//!   └─ fix_reference_renames ──────► new document with references renamed
//! ```

pub mod builder;
pub mod collect;
pub mod config;
pub mod delete;
pub mod entity_type;
pub mod error;
pub mod path;
pub mod rename;
pub mod resolve;
pub mod schema;
pub mod scope;
pub mod serialize;
pub mod types;

pub use builder::{EntityInput, ParentRef, RefBuilder, RefFacts, ReferenceInput};
pub use collect::{collect_refs, extract_definition_refs, CollectedRefs};
pub use config::{EngineConfig, RenameOptions, ResolveOptions};
pub use delete::{plan_deletion, DeleteAction, DeletionPlan, PlannedAction};
pub use entity_type::{create_entity_type, EntityType, EntityTypeOptions};
pub use error::{RefError, Result};
pub use path::{walk_path, PathMatch, PathPattern, PathSegment, PatternSegment, ReferencePath};
pub use rename::{find_entity_renames, fix_reference_renames, EntityPattern, EntityRename, ReferencePattern};
pub use resolve::{
    deserialize_schema_with_transformed_references, parse_schema_with_references,
    parse_schema_with_transformed_references, resolve_ref_payload_names,
};
pub use schema::{ref_builder, ref_context, with_ent, with_ref, MarkedValue, Schema};
pub use scope::{ContextSlot, ScopeTable};
pub use serialize::serialize_schema_with_references;
pub use types::{
    Entity, EntityName, NameDependency, NameResolver, OnDelete, RefPayload, Reference,
    ResolvedName, ResolvedNames, UnresolvedEntity, UnresolvedPayload,
};
