//! Reference Builder
//!
//! A [`RefBuilder`] is handed to annotation callbacks while a subtree is being
//! parsed. It knows the subtree's absolute path, its raw value and the scope
//! table inherited from enclosing scopes, and it records the entities and
//! references the callback declares.

use serde_json::Value;

use crate::entity_type::EntityType;
use crate::error::{RefError, Result};
use crate::path::{self, ReferencePath};
use crate::scope::{ContextSlot, ScopeTable};
use crate::types::{EntityName, NameResolver, OnDelete, Reference, UnresolvedEntity};

/// Facts discovered on one annotated node
#[derive(Debug, Clone, Default)]
pub struct RefFacts {
    pub entities: Vec<UnresolvedEntity>,
    pub references: Vec<Reference>,
}

impl RefFacts {
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty() && self.references.is_empty()
    }
}

/// Where a parent id lives
#[derive(Debug, Clone)]
pub enum ParentRef {
    /// Provided by an enclosing scope
    Slot(ContextSlot),
    /// Relative to the builder's path
    Path(ReferencePath),
}

impl From<ContextSlot> for ParentRef {
    fn from(slot: ContextSlot) -> Self {
        ParentRef::Slot(slot)
    }
}

impl From<&ContextSlot> for ParentRef {
    fn from(slot: &ContextSlot) -> Self {
        ParentRef::Slot(slot.clone())
    }
}

impl From<&str> for ParentRef {
    fn from(path: &str) -> Self {
        ParentRef::Path(ReferencePath::parse(path))
    }
}

// =============================================================================
// Inputs
// =============================================================================

/// Declaration of an entity
#[derive(Debug, Clone)]
pub struct EntityInput {
    pub entity_type: EntityType,
    /// Owning node, relative to the builder
    pub path: ReferencePath,
    /// Id field, relative to `path` (defaults to `id`)
    pub id_path: Option<ReferencePath>,
    /// Literal display name
    pub name: Option<String>,
    /// Field holding the display name, relative to `path` (defaults to `name`)
    pub name_path: Option<ReferencePath>,
    /// Take the name of the entity referenced at this path (relative to `path`)
    pub name_ref_path: Option<ReferencePath>,
    /// Compute the name from other entities' names
    pub name_resolver: Option<NameResolver>,
    pub parent: Option<ParentRef>,
    /// Provide this slot with the entity's id path
    pub add_context: Option<ContextSlot>,
    pub strip_id_when_serializing: bool,
}

impl EntityInput {
    pub fn new(entity_type: &EntityType) -> Self {
        Self {
            entity_type: entity_type.clone(),
            path: ReferencePath::root(),
            id_path: None,
            name: None,
            name_path: None,
            name_ref_path: None,
            name_resolver: None,
            parent: None,
            add_context: None,
            strip_id_when_serializing: false,
        }
    }

    pub fn path(mut self, path: impl Into<ReferencePath>) -> Self {
        self.path = path.into();
        self
    }

    pub fn id_path(mut self, path: impl Into<ReferencePath>) -> Self {
        self.id_path = Some(path.into());
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn name_path(mut self, path: impl Into<ReferencePath>) -> Self {
        self.name_path = Some(path.into());
        self
    }

    pub fn name_ref_path(mut self, path: impl Into<ReferencePath>) -> Self {
        self.name_ref_path = Some(path.into());
        self
    }

    pub fn name_resolver(mut self, resolver: NameResolver) -> Self {
        self.name_resolver = Some(resolver);
        self
    }

    pub fn parent(mut self, parent: impl Into<ParentRef>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    pub fn add_context(mut self, slot: &ContextSlot) -> Self {
        self.add_context = Some(slot.clone());
        self
    }

    pub fn strip_id_when_serializing(mut self) -> Self {
        self.strip_id_when_serializing = true;
        self
    }
}

/// Declaration of a reference
#[derive(Debug, Clone)]
pub struct ReferenceInput {
    pub entity_type: EntityType,
    /// Field holding the reference, relative to the builder
    pub path: ReferencePath,
    pub on_delete: OnDelete,
    pub parent: Option<ParentRef>,
    /// Provide this slot with the reference's path
    pub add_context: Option<ContextSlot>,
}

impl ReferenceInput {
    pub fn new(entity_type: &EntityType) -> Self {
        Self {
            entity_type: entity_type.clone(),
            path: ReferencePath::root(),
            on_delete: OnDelete::default(),
            parent: None,
            add_context: None,
        }
    }

    pub fn path(mut self, path: impl Into<ReferencePath>) -> Self {
        self.path = path.into();
        self
    }

    pub fn on_delete(mut self, on_delete: OnDelete) -> Self {
        self.on_delete = on_delete;
        self
    }

    pub fn parent(mut self, parent: impl Into<ParentRef>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    pub fn add_context(mut self, slot: &ContextSlot) -> Self {
        self.add_context = Some(slot.clone());
        self
    }
}

// =============================================================================
// Builder
// =============================================================================

/// Collects entity and reference declarations for one subtree
pub struct RefBuilder<'a> {
    path: ReferencePath,
    value: &'a Value,
    scope: ScopeTable,
    facts: RefFacts,
}

impl<'a> RefBuilder<'a> {
    pub fn new(path: ReferencePath, value: &'a Value, scope: ScopeTable) -> Self {
        Self {
            path,
            value,
            scope,
            facts: RefFacts::default(),
        }
    }

    /// Absolute path of the subtree
    pub fn path(&self) -> &ReferencePath {
        &self.path
    }

    /// Raw (unvalidated) subtree value
    pub fn value(&self) -> &'a Value {
        self.value
    }

    pub fn scope(&self) -> &ScopeTable {
        &self.scope
    }

    /// Register an entity, returning its id (generated when absent)
    pub fn add_entity(&mut self, input: EntityInput) -> Result<String> {
        let entity_path = self.path.join(&input.path);

        let direct_name = input.name.is_some() || input.name_path.is_some();
        let derived_name = input.name_ref_path.is_some() || input.name_resolver.is_some();
        if (direct_name && derived_name)
            || (input.name_ref_path.is_some() && input.name_resolver.is_some())
        {
            return Err(RefError::ConflictingNameSources {
                path: entity_path.to_string(),
            });
        }

        let id_rel = input.id_path.clone().unwrap_or_else(|| ReferencePath::parse("id"));
        let id = match path::get(self.value, &input.path.join(&id_rel)) {
            Some(Value::String(id)) if !id.is_empty() => id.clone(),
            None | Some(Value::Null) => input.entity_type.generate_new_id(None),
            Some(Value::String(_)) => input.entity_type.generate_new_id(None),
            Some(other) => {
                return Err(RefError::validation(
                    entity_path.join(&id_rel),
                    format!("expected a string id, got {}", other),
                ))
            }
        };

        let name = if let Some(resolver) = input.name_resolver {
            EntityName::Deferred(resolver.rebased(&entity_path))
        } else if let Some(name_ref_path) = &input.name_ref_path {
            EntityName::Deferred(NameResolver::from_reference(entity_path.join(name_ref_path)))
        } else if let Some(name) = input.name {
            EntityName::Resolved(name)
        } else {
            let name_rel = input.name_path.unwrap_or_else(|| ReferencePath::parse("name"));
            match path::get_str(self.value, &input.path.join(&name_rel)) {
                Some(name) => EntityName::Resolved(name.to_string()),
                None => {
                    return Err(RefError::MissingEntityName {
                        path: entity_path.to_string(),
                    })
                }
            }
        };

        let parent_path = self.parent_path(&input.entity_type, input.parent.as_ref())?;

        let id_path = entity_path.join(&id_rel);
        if let Some(slot) = &input.add_context {
            self.scope = self
                .scope
                .provide(slot, id_path.clone(), &input.entity_type, &self.path)?;
        }

        tracing::trace!(id = %id, path = %entity_path, "registered entity");
        self.facts.entities.push(UnresolvedEntity {
            id: id.clone(),
            name,
            entity_type: input.entity_type,
            path: entity_path,
            id_path,
            parent_path,
            strip_id_when_serializing: input.strip_id_when_serializing,
        });
        Ok(id)
    }

    /// Register a reference; absent values register nothing
    pub fn add_reference(&mut self, input: ReferenceInput) -> Result<()> {
        match path::get(self.value, &input.path) {
            None | Some(Value::Null) => return Ok(()),
            Some(_) => {}
        }
        let reference_path = self.path.join(&input.path);
        let parent_path = self.parent_path(&input.entity_type, input.parent.as_ref())?;

        if let Some(slot) = &input.add_context {
            self.scope = self.scope.provide(
                slot,
                reference_path.clone(),
                &input.entity_type,
                &self.path,
            )?;
        }

        self.facts.references.push(Reference {
            entity_type: input.entity_type,
            path: reference_path,
            parent_path,
            on_delete: input.on_delete,
        });
        Ok(())
    }

    /// Absolute parent path, checked against the type's declared parent type
    pub(crate) fn parent_path(
        &self,
        entity_type: &EntityType,
        parent: Option<&ParentRef>,
    ) -> Result<Option<ReferencePath>> {
        resolve_parent_path(&self.scope, &self.path, entity_type, parent)
    }

    pub fn finish(self) -> (RefFacts, ScopeTable) {
        (self.facts, self.scope)
    }
}

pub(crate) fn resolve_parent_path(
    scope: &ScopeTable,
    scope_path: &ReferencePath,
    entity_type: &EntityType,
    parent: Option<&ParentRef>,
) -> Result<Option<ReferencePath>> {
    match (entity_type.parent_type(), parent) {
        (None, None) => Ok(None),
        (None, Some(_)) => Err(RefError::UnexpectedParentPath {
            entity_type: entity_type.to_string(),
            path: scope_path.to_string(),
        }),
        (Some(_), None) => Err(RefError::MissingParentPath {
            entity_type: entity_type.to_string(),
            path: scope_path.to_string(),
        }),
        (Some(parent_type), Some(ParentRef::Slot(slot))) => {
            if slot.entity_type() != parent_type {
                return Err(RefError::ParentTypeMismatch {
                    entity_type: entity_type.to_string(),
                    expected: parent_type.to_string(),
                    actual: slot.entity_type().to_string(),
                    path: scope_path.to_string(),
                });
            }
            scope.resolve(slot, scope_path).map(Some)
        }
        (Some(_), Some(ParentRef::Path(relative))) => Ok(Some(scope_path.join(relative))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn types() -> (EntityType, EntityType) {
        let model = EntityType::new("model");
        let field = EntityType::with_parent("field", &model);
        (model, field)
    }

    #[test]
    fn test_add_entity_reads_id_and_name() {
        let (model, _) = types();
        let value = json!({ "id": "model:abc", "name": "User" });
        let mut builder = RefBuilder::new("models.0".into(), &value, ScopeTable::new());
        let id = builder.add_entity(EntityInput::new(&model)).unwrap();
        assert_eq!(id, "model:abc");

        let (facts, _) = builder.finish();
        let entity = &facts.entities[0];
        assert_eq!(entity.path.to_string(), "models.0");
        assert_eq!(entity.id_path.to_string(), "models.0.id");
        assert!(matches!(&entity.name, EntityName::Resolved(n) if n == "User"));
    }

    #[test]
    fn test_add_entity_generates_missing_id() {
        let (model, _) = types();
        let value = json!({ "title": "Post" });
        let mut builder = RefBuilder::new(ReferencePath::root(), &value, ScopeTable::new());
        let id = builder
            .add_entity(EntityInput::new(&model).name_path("title"))
            .unwrap();
        assert!(id.starts_with("model:"));
    }

    #[test]
    fn test_conflicting_name_sources() {
        let (model, _) = types();
        let value = json!({ "name": "User", "modelRef": "Other" });
        let mut builder = RefBuilder::new(ReferencePath::root(), &value, ScopeTable::new());
        let err = builder
            .add_entity(EntityInput::new(&model).name("User").name_ref_path("modelRef"))
            .unwrap_err();
        assert!(matches!(err, RefError::ConflictingNameSources { .. }));
    }

    #[test]
    fn test_missing_name() {
        let (model, _) = types();
        let value = json!({ "id": "model:1" });
        let mut builder = RefBuilder::new(ReferencePath::root(), &value, ScopeTable::new());
        let err = builder.add_entity(EntityInput::new(&model)).unwrap_err();
        assert!(matches!(err, RefError::MissingEntityName { .. }));
    }

    #[test]
    fn test_parent_required_iff_parent_type() {
        let (model, field) = types();
        let value = json!({ "name": "email", "modelRef": "User" });
        let mut builder = RefBuilder::new(ReferencePath::root(), &value, ScopeTable::new());

        let err = builder.add_entity(EntityInput::new(&field)).unwrap_err();
        assert!(matches!(err, RefError::MissingParentPath { .. }));

        let err = builder
            .add_reference(ReferenceInput::new(&model).path("modelRef").parent("x"))
            .unwrap_err();
        assert!(matches!(err, RefError::UnexpectedParentPath { .. }));

        builder
            .add_entity(EntityInput::new(&field).parent("modelRef"))
            .unwrap();
        let (facts, _) = builder.finish();
        assert_eq!(facts.entities[0].parent_path, Some("modelRef".into()));
    }

    #[test]
    fn test_parent_slot_type_must_match() {
        let (_, field) = types();
        let other = EntityType::new("enum");
        let slot = ContextSlot::new("enum", &other);
        let value = json!({ "name": "email" });
        let mut builder = RefBuilder::new(ReferencePath::root(), &value, ScopeTable::new());
        let err = builder
            .add_entity(EntityInput::new(&field).parent(&slot))
            .unwrap_err();
        assert!(matches!(err, RefError::ParentTypeMismatch { .. }));
    }

    #[test]
    fn test_unresolved_parent_slot() {
        let (model, field) = types();
        let slot = ContextSlot::new("model", &model);
        let value = json!({ "fieldRef": "email" });
        let mut builder = RefBuilder::new("relations.0".into(), &value, ScopeTable::new().declare([&slot]));
        let err = builder
            .add_reference(ReferenceInput::new(&field).path("fieldRef").parent(&slot))
            .unwrap_err();
        assert!(err.to_string().contains("Could not resolve parent path"));
    }

    #[test]
    fn test_reference_chain_through_context() {
        let (model, field) = types();
        let slot = ContextSlot::new("model", &model);
        let value = json!({ "modelRef": "User", "fieldRef": "email", "missing": null });
        let scope = ScopeTable::new().declare([&slot]);
        let mut builder = RefBuilder::new("relations.0".into(), &value, scope);

        builder
            .add_reference(ReferenceInput::new(&model).path("modelRef").add_context(&slot))
            .unwrap();
        builder
            .add_reference(ReferenceInput::new(&field).path("fieldRef").parent(&slot))
            .unwrap();
        builder
            .add_reference(ReferenceInput::new(&model).path("missing"))
            .unwrap();

        let (facts, scope) = builder.finish();
        assert_eq!(facts.references.len(), 2);
        assert_eq!(facts.references[1].path.to_string(), "relations.0.fieldRef");
        assert_eq!(
            facts.references[1].parent_path,
            Some(ReferencePath::parse("relations.0.modelRef"))
        );
        assert!(scope.lookup(&slot).is_some());
    }
}
