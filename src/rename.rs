//! Rename Propagation
//!
//! Given the previous and the edited version of a document, rewrites every
//! reference that still uses an entity's old name. A rewritten reference can
//! itself be a name other references point at, so the pass repeats until no
//! entity name changes between two snapshots.
//!
//! Entities and references are located with [`PathPattern`]s, so this pass
//! works on raw documents without a schema.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};

use crate::config::RenameOptions;
use crate::entity_type::EntityType;
use crate::error::{RefError, Result};
use crate::path::{self, walk_path, PathPattern, ReferencePath};

// =============================================================================
// Patterns
// =============================================================================

/// Where instances of an entity type live
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityPattern {
    pub entity_type: EntityType,
    /// Matches each entity's owning node
    pub path: PathPattern,
    /// Id field, relative to the owning node
    #[serde(default = "default_id_field")]
    pub id_field: ReferencePath,
    /// Name field, relative to the owning node
    #[serde(default = "default_name_field")]
    pub name_field: ReferencePath,
}

fn default_id_field() -> ReferencePath {
    ReferencePath::parse("id")
}

fn default_name_field() -> ReferencePath {
    ReferencePath::parse("name")
}

impl EntityPattern {
    pub fn new(entity_type: &EntityType, path: PathPattern) -> Self {
        Self {
            entity_type: entity_type.clone(),
            path,
            id_field: default_id_field(),
            name_field: default_name_field(),
        }
    }

    pub fn id_field(mut self, field: impl Into<ReferencePath>) -> Self {
        self.id_field = field.into();
        self
    }

    pub fn name_field(mut self, field: impl Into<ReferencePath>) -> Self {
        self.name_field = field.into();
        self
    }
}

/// Where references to an entity type live
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferencePattern {
    /// Category name, matched against [`RenameOptions::ignored_references`]
    pub name: String,
    pub entity_type: EntityType,
    /// Matches each reference value
    pub path: PathPattern,
}

impl ReferencePattern {
    pub fn new(name: impl Into<String>, entity_type: &EntityType, path: PathPattern) -> Self {
        Self {
            name: name.into(),
            entity_type: entity_type.clone(),
            path,
        }
    }
}

/// An entity that kept its id but changed its name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRename {
    pub entity_type: EntityType,
    pub id: Value,
    pub from: String,
    pub to: String,
}

// =============================================================================
// Detection
// =============================================================================

/// id (as JSON text) -> (id, name) for every instance matched by `pattern`
fn entity_names(document: &Value, pattern: &EntityPattern) -> Result<BTreeMap<String, (Value, String)>> {
    let mut names = BTreeMap::new();
    for found in walk_path(document, &pattern.path)? {
        let id = match path::get(found.value, &pattern.id_field) {
            None | Some(Value::Null) => continue,
            Some(id) => id,
        };
        let Some(name) = path::get_str(found.value, &pattern.name_field) else {
            continue;
        };
        names.insert(id.to_string(), (id.clone(), name.to_string()));
    }
    Ok(names)
}

/// Entities present in both snapshots under the same id with a different name
pub fn find_entity_renames(
    old: &Value,
    new: &Value,
    entity_patterns: &[EntityPattern],
) -> Result<Vec<EntityRename>> {
    let mut renames = Vec::new();
    for pattern in entity_patterns {
        let before = entity_names(old, pattern)?;
        let after = entity_names(new, pattern)?;
        for (key, (id, to)) in after {
            match before.get(&key) {
                Some((_, from)) if from != &to => renames.push(EntityRename {
                    entity_type: pattern.entity_type.clone(),
                    id,
                    from: from.clone(),
                    to,
                }),
                _ => {}
            }
        }
    }
    Ok(renames)
}

// =============================================================================
// Propagation
// =============================================================================

/// Rewrite references in `document` for one batch of renames, all at once
fn apply_renames(
    document: &Value,
    renames: &[EntityRename],
    reference_patterns: &[ReferencePattern],
    options: &RenameOptions,
) -> Result<Value> {
    let mut by_type: HashMap<&EntityType, HashMap<&str, &str>> = HashMap::new();
    for rename in renames {
        by_type
            .entry(&rename.entity_type)
            .or_default()
            .entry(rename.from.as_str())
            .or_insert(rename.to.as_str());
    }

    let mut rewrites = Vec::new();
    for pattern in reference_patterns {
        if options.is_ignored(&pattern.name) {
            continue;
        }
        let Some(mapping) = by_type.get(&pattern.entity_type) else {
            continue;
        };
        for found in walk_path(document, &pattern.path)? {
            if let Some(to) = found.value.as_str().and_then(|from| mapping.get(from)) {
                rewrites.push((found.path, to.to_string()));
            }
        }
    }

    let mut next = document.clone();
    for (path, to) in rewrites {
        tracing::trace!(path = %path, to = %to, "rewriting reference");
        path::set(&mut next, &path, Value::String(to))?;
    }
    Ok(next)
}

/// Propagate entity renames between `old` and `new` into every reference of
/// `new`, to a fixed point.
///
/// Fails with [`RefError::RenameCycle`] when a rename is applied a second
/// time, and with [`RefError::ExceededMaxIterations`] when the cap is hit.
pub fn fix_reference_renames(
    old: &Value,
    new: &Value,
    entity_patterns: &[EntityPattern],
    reference_patterns: &[ReferencePattern],
    options: &RenameOptions,
) -> Result<Value> {
    let mut previous = old.clone();
    let mut current = new.clone();
    let mut applied: HashSet<(EntityType, String, String, String)> = HashSet::new();

    for iteration in 0..options.max_iterations {
        let renames = find_entity_renames(&previous, &current, entity_patterns)?;
        if renames.is_empty() {
            tracing::debug!(iterations = iteration, "reference renames reached a fixed point");
            return Ok(current);
        }
        tracing::debug!(iteration, renames = renames.len(), "propagating entity renames");

        for rename in &renames {
            let key = (
                rename.entity_type.clone(),
                rename.id.to_string(),
                rename.from.clone(),
                rename.to.clone(),
            );
            if !applied.insert(key) {
                return Err(RefError::RenameCycle {
                    entity_type: rename.entity_type.to_string(),
                    from: rename.from.clone(),
                    to: rename.to.clone(),
                });
            }
        }

        let next = apply_renames(&current, &renames, reference_patterns, options)?;
        previous = std::mem::replace(&mut current, next);
    }

    Err(RefError::ExceededMaxIterations {
        max: options.max_iterations,
    })
}
