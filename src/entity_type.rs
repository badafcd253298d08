//! Entity types
//!
//! An entity type names a class of entities ("model", "field") and owns id
//! generation for them. Ids look like `<prefix>:<uid>`; the prefix is only a
//! debugging aid, uniqueness comes from the ulid suffix.

use serde::{Deserialize, Serialize};
use std::fmt;
use ulid::Ulid;

use crate::error::{RefError, Result};

/// Options for [`create_entity_type`]
#[derive(Debug, Clone, Default)]
pub struct EntityTypeOptions {
    /// Every entity of this type must point back at a parent of this type
    pub parent_type: Option<EntityType>,
    /// Id prefix (defaults to the type name)
    pub id_prefix: Option<String>,
}

/// A category of entities
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityType {
    name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id_prefix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    parent_type: Option<Box<EntityType>>,
}

/// Create an entity type
pub fn create_entity_type(name: impl Into<String>, options: EntityTypeOptions) -> EntityType {
    EntityType {
        name: name.into(),
        id_prefix: options.id_prefix,
        parent_type: options.parent_type.map(Box::new),
    }
}

impl EntityType {
    /// Create a top-level entity type with the default prefix
    pub fn new(name: impl Into<String>) -> Self {
        create_entity_type(name, EntityTypeOptions::default())
    }

    /// Create an entity type scoped under `parent`
    pub fn with_parent(name: impl Into<String>, parent: &EntityType) -> Self {
        create_entity_type(
            name,
            EntityTypeOptions {
                parent_type: Some(parent.clone()),
                id_prefix: None,
            },
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent_type(&self) -> Option<&EntityType> {
        self.parent_type.as_deref()
    }

    pub fn id_prefix(&self) -> &str {
        self.id_prefix.as_deref().unwrap_or(&self.name)
    }

    /// Generate an id, optionally from a caller-supplied uid
    pub fn generate_new_id(&self, uid: Option<&str>) -> String {
        match uid {
            Some(uid) => format!("{}:{}", self.id_prefix(), uid),
            None => format!(
                "{}:{}",
                self.id_prefix(),
                Ulid::new().to_string().to_lowercase()
            ),
        }
    }

    /// Strip the type prefix from an id
    pub fn get_uid_from_id<'a>(&self, id: &'a str) -> Result<&'a str> {
        id.strip_prefix(self.id_prefix())
            .and_then(|rest| rest.strip_prefix(':'))
            .filter(|uid| !uid.is_empty())
            .ok_or_else(|| RefError::InvalidId {
                id: id.to_string(),
                entity_type: self.name.clone(),
            })
    }

    /// Does this type require `other` as its parent?
    pub fn is_child_of(&self, other: &EntityType) -> bool {
        self.parent_type.as_deref() == Some(other)
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_ids_are_prefixed_and_unique() {
        let model = EntityType::new("model");
        let a = model.generate_new_id(None);
        let b = model.generate_new_id(None);
        assert!(a.starts_with("model:"));
        assert_ne!(a, b);
        assert_eq!(a, a.to_lowercase());
    }

    #[test]
    fn test_custom_prefix_and_uid() {
        let role = create_entity_type(
            "auth-role",
            EntityTypeOptions {
                id_prefix: Some("role".to_string()),
                ..Default::default()
            },
        );
        let id = role.generate_new_id(Some("admin"));
        assert_eq!(id, "role:admin");
        assert_eq!(role.get_uid_from_id(&id).unwrap(), "admin");
        assert!(role.get_uid_from_id("auth-role:admin").is_err());
        assert!(role.get_uid_from_id("role:").is_err());
    }

    #[test]
    fn test_parent_type() {
        let model = EntityType::new("model");
        let field = EntityType::with_parent("field", &model);
        assert!(field.is_child_of(&model));
        assert!(!model.is_child_of(&field));
        assert_eq!(field.parent_type().map(|p| p.name()), Some("model"));
    }
}
