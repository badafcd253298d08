//! Entities, references and resolution payloads

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::entity_type::EntityType;
use crate::path::ReferencePath;

// =============================================================================
// Entity
// =============================================================================

/// A node that owns a stable id and a display name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    /// Location of the owning node
    pub path: ReferencePath,
    /// Location of the id field
    pub id_path: ReferencePath,
    /// Location of the parent entity's id (iff the type has a parent type)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_path: Option<ReferencePath>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub strip_id_when_serializing: bool,
}

/// How an entity gets its display name
#[derive(Clone)]
pub enum EntityName {
    Resolved(String),
    Deferred(NameResolver),
}

impl fmt::Debug for EntityName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Resolved(name) => f.debug_tuple("Resolved").field(name).finish(),
            Self::Deferred(resolver) => f.debug_tuple("Deferred").field(resolver).finish(),
        }
    }
}

/// An entity straight out of the parse pass, possibly still waiting on a name
#[derive(Debug, Clone)]
pub struct UnresolvedEntity {
    pub id: String,
    pub name: EntityName,
    pub entity_type: EntityType,
    pub path: ReferencePath,
    pub id_path: ReferencePath,
    pub parent_path: Option<ReferencePath>,
    pub strip_id_when_serializing: bool,
}

impl UnresolvedEntity {
    pub fn name_resolver(&self) -> Option<&NameResolver> {
        match &self.name {
            EntityName::Deferred(resolver) => Some(resolver),
            EntityName::Resolved(_) => None,
        }
    }

    pub fn into_entity(self, name: String) -> Entity {
        Entity {
            id: self.id,
            name,
            entity_type: self.entity_type,
            path: self.path,
            id_path: self.id_path,
            parent_path: self.parent_path,
            strip_id_when_serializing: self.strip_id_when_serializing,
        }
    }
}

// =============================================================================
// Reference
// =============================================================================

/// What happens to a reference when its target disappears
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OnDelete {
    SetNull,
    Delete,
    DeleteParent,
    #[default]
    Restrict,
    SetUndefined,
}

/// A field whose value names an entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reference {
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    /// Location of the field holding the reference
    pub path: ReferencePath,
    /// Only entities whose parent matches the value here are candidates
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_path: Option<ReferencePath>,
    #[serde(default)]
    pub on_delete: OnDelete,
}

// =============================================================================
// Deferred Names
// =============================================================================

/// Where a derived name's dependency comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NameDependency {
    /// A known entity id
    Id(String),
    /// Several known entity ids
    Ids(Vec<String>),
    /// Whatever id ends up at this location once references are resolved
    Path(ReferencePath),
}

/// A dependency's resolved name(s)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedName {
    One(String),
    Many(Vec<String>),
}

/// Resolved names handed to a [`NameResolver`], keyed as declared
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedNames(BTreeMap<String, ResolvedName>);

impl ResolvedNames {
    pub(crate) fn insert(&mut self, key: String, name: ResolvedName) {
        self.0.insert(key, name);
    }

    pub fn get(&self, key: &str) -> Option<&ResolvedName> {
        self.0.get(key)
    }

    /// Single name for `key` (the first one when several were resolved)
    pub fn one(&self, key: &str) -> &str {
        match self.0.get(key) {
            Some(ResolvedName::One(name)) => name.as_str(),
            Some(ResolvedName::Many(names)) => names.first().map(String::as_str).unwrap_or(""),
            None => "",
        }
    }

    pub fn many(&self, key: &str) -> Vec<&str> {
        match self.0.get(key) {
            Some(ResolvedName::One(name)) => vec![name.as_str()],
            Some(ResolvedName::Many(names)) => names.iter().map(String::as_str).collect(),
            None => Vec::new(),
        }
    }
}

type ResolveNameFn = dyn Fn(&ResolvedNames) -> String + Send + Sync;

/// Computes an entity's name from other entities' names
#[derive(Clone)]
pub struct NameResolver {
    pub ids_to_resolve: BTreeMap<String, NameDependency>,
    resolve_name: Arc<ResolveNameFn>,
}

impl NameResolver {
    pub fn new<F>(resolve_name: F) -> Self
    where
        F: Fn(&ResolvedNames) -> String + Send + Sync + 'static,
    {
        Self {
            ids_to_resolve: BTreeMap::new(),
            resolve_name: Arc::new(resolve_name),
        }
    }

    /// Name taken verbatim from the entity at `path`
    pub fn from_reference(path: impl Into<ReferencePath>) -> Self {
        Self::new(|names| names.one("name").to_string())
            .depends_on("name", NameDependency::Path(path.into()))
    }

    pub fn depends_on(mut self, key: impl Into<String>, dependency: NameDependency) -> Self {
        self.ids_to_resolve.insert(key.into(), dependency);
        self
    }

    pub fn resolve_name(&self, names: &ResolvedNames) -> String {
        (self.resolve_name)(names)
    }

    /// Rebase relative `Path` dependencies onto `base`
    pub(crate) fn rebased(mut self, base: &ReferencePath) -> Self {
        for dependency in self.ids_to_resolve.values_mut() {
            if let NameDependency::Path(path) = dependency {
                *path = base.join(path);
            }
        }
        self
    }
}

impl fmt::Debug for NameResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NameResolver")
            .field("ids_to_resolve", &self.ids_to_resolve)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Payloads
// =============================================================================

/// Parsed data plus the entities and references discovered in it
#[derive(Debug, Clone)]
pub struct RefPayload<E = Entity> {
    pub data: Value,
    pub entities: Vec<E>,
    pub references: Vec<Reference>,
}

/// Payload whose entity names may still be deferred
pub type UnresolvedPayload = RefPayload<UnresolvedEntity>;

impl RefPayload<Entity> {
    pub fn entity_by_id(&self, id: &str) -> Option<&Entity> {
        self.entities.iter().find(|e| e.id == id)
    }

    pub fn entities_of_type<'a>(&'a self, entity_type: &'a EntityType) -> impl Iterator<Item = &'a Entity> {
        self.entities.iter().filter(move |e| &e.entity_type == entity_type)
    }

    /// References whose current value in `data` is `id`
    pub fn references_to<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a Reference> {
        self.references
            .iter()
            .filter(move |r| crate::path::get_str(&self.data, &r.path) == Some(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_on_delete_wire_names() {
        assert_eq!(serde_json::to_value(OnDelete::SetNull).unwrap(), json!("SET_NULL"));
        assert_eq!(serde_json::to_value(OnDelete::DeleteParent).unwrap(), json!("DELETE_PARENT"));
        assert_eq!(OnDelete::default(), OnDelete::Restrict);
    }

    #[test]
    fn test_name_resolver_rebases_paths() {
        let resolver = NameResolver::new(|names| format!("{} at {}", "Alice", names.one("company")))
            .depends_on("company", NameDependency::Path("companyRef".into()))
            .depends_on("fixed", NameDependency::Id("company:1".into()))
            .rebased(&"employees.0".into());
        assert_eq!(
            resolver.ids_to_resolve.get("company"),
            Some(&NameDependency::Path("employees.0.companyRef".into()))
        );
        assert_eq!(
            resolver.ids_to_resolve.get("fixed"),
            Some(&NameDependency::Id("company:1".into()))
        );

        let mut names = ResolvedNames::default();
        names.insert("company".into(), ResolvedName::One("Acme Corp".into()));
        assert_eq!(resolver.resolve_name(&names), "Alice at Acme Corp");
    }

    #[test]
    fn test_references_to() {
        let model = EntityType::new("model");
        let payload = RefPayload {
            data: json!({ "a": "model:1", "b": "model:2" }),
            entities: vec![],
            references: vec![
                Reference { entity_type: model.clone(), path: "a".into(), parent_path: None, on_delete: OnDelete::Restrict },
                Reference { entity_type: model, path: "b".into(), parent_path: None, on_delete: OnDelete::Restrict },
            ],
        };
        let paths: Vec<String> = payload.references_to("model:2").map(|r| r.path.to_string()).collect();
        assert_eq!(paths, vec!["b"]);
    }
}
