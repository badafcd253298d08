//! Marker Collection / Extraction
//!
//! Flattens a [`MarkedValue`] into one entity list and one reference list.
//! Facts recorded by annotated nodes already carry absolute paths; inline
//! reference placeholders take the path they are found at.

use std::collections::HashSet;

use crate::error::{RefError, Result};
use crate::path::ReferencePath;
use crate::schema::MarkedValue;
use crate::types::{Reference, UnresolvedEntity, UnresolvedPayload};

/// Every entity and reference found in a parse result
#[derive(Debug, Clone, Default)]
pub struct CollectedRefs {
    pub entities: Vec<UnresolvedEntity>,
    pub references: Vec<Reference>,
}

struct Collector {
    seen_ids: HashSet<String>,
    out: CollectedRefs,
}

impl Collector {
    fn push_entity(&mut self, entity: UnresolvedEntity) -> Result<()> {
        if !self.seen_ids.insert(entity.id.clone()) {
            return Err(RefError::DuplicateId { id: entity.id });
        }
        self.out.entities.push(entity);
        Ok(())
    }

    fn walk(&mut self, node: &MarkedValue, path: &ReferencePath) -> Result<()> {
        match node {
            MarkedValue::Plain(_) => Ok(()),
            MarkedValue::Array(items) => {
                for (i, item) in items.iter().enumerate() {
                    self.walk(item, &path.index(i))?;
                }
                Ok(())
            }
            MarkedValue::Object(entries) => {
                for (key, value) in entries {
                    self.walk(value, &path.key(key))?;
                }
                Ok(())
            }
            MarkedValue::Annotated { value, facts } => {
                for entity in &facts.entities {
                    self.push_entity(entity.clone())?;
                }
                self.out.references.extend(facts.references.iter().cloned());
                self.walk(value, path)
            }
            MarkedValue::Reference { marker, .. } => {
                self.out.references.push(Reference {
                    entity_type: marker.entity_type.clone(),
                    path: path.clone(),
                    parent_path: marker.parent_path.clone(),
                    on_delete: marker.on_delete,
                });
                Ok(())
            }
        }
    }
}

/// Collect every entity and reference in `value`, depth first.
///
/// Fails with [`RefError::DuplicateId`] as soon as two entities share an id.
pub fn collect_refs(value: &MarkedValue) -> Result<CollectedRefs> {
    let mut collector = Collector {
        seen_ids: HashSet::new(),
        out: CollectedRefs::default(),
    };
    collector.walk(value, &ReferencePath::root())?;
    Ok(collector.out)
}

/// Split a parse result into plain data plus its (still unresolved) facts.
///
/// Reference placeholders are replaced by their raw string value.
pub fn extract_definition_refs(value: MarkedValue) -> Result<UnresolvedPayload> {
    let CollectedRefs {
        entities,
        references,
    } = collect_refs(&value)?;
    tracing::debug!(
        entities = entities.len(),
        references = references.len(),
        "extracted definition refs"
    );
    Ok(UnresolvedPayload {
        data: value.into_value(),
        entities,
        references,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{EntityInput, ReferenceInput};
    use crate::entity_type::EntityType;
    use crate::schema::{array, object, string, with_ent, with_ref};
    use crate::types::OnDelete;
    use serde_json::json;

    fn model_schema(model: &EntityType) -> crate::schema::Schema {
        object([
            (
                "models",
                array(with_ent(
                    object([("id", string().optional()), ("name", string())]),
                    EntityInput::new(model),
                )),
            ),
            (
                "refs",
                array(with_ref(
                    string(),
                    ReferenceInput::new(model).on_delete(OnDelete::SetNull),
                )),
            ),
        ])
    }

    #[test]
    fn test_collects_entities_and_placeholders_at_their_paths() {
        let model = EntityType::new("model");
        let parsed = model_schema(&model)
            .parse(&json!({
                "models": [{ "id": "model:1", "name": "User" }],
                "refs": ["User", "User"]
            }))
            .unwrap();
        let collected = collect_refs(&parsed).unwrap();

        assert_eq!(collected.entities.len(), 1);
        assert_eq!(collected.entities[0].path.to_string(), "models.0");
        let paths: Vec<String> = collected.references.iter().map(|r| r.path.to_string()).collect();
        assert_eq!(paths, vec!["refs.0", "refs.1"]);
        assert!(collected.references.iter().all(|r| r.on_delete == OnDelete::SetNull));
    }

    #[test]
    fn test_plain_document_contributes_nothing() {
        let collected = collect_refs(&MarkedValue::Plain(json!({ "a": [1, 2, {}] }))).unwrap();
        assert!(collected.entities.is_empty());
        assert!(collected.references.is_empty());
    }

    #[test]
    fn test_duplicate_id() {
        let model = EntityType::new("model");
        let parsed = model_schema(&model)
            .parse(&json!({
                "models": [{ "id": "model:1", "name": "User" }, { "id": "model:1", "name": "Post" }],
                "refs": []
            }))
            .unwrap();
        let err = collect_refs(&parsed).unwrap_err();
        assert_eq!(err, RefError::DuplicateId { id: "model:1".to_string() });
    }

    #[test]
    fn test_extract_strips_markers() {
        let model = EntityType::new("model");
        let parsed = model_schema(&model)
            .parse(&json!({ "models": [{ "id": "model:1", "name": "User" }], "refs": ["User"] }))
            .unwrap();
        let payload = extract_definition_refs(parsed).unwrap();
        assert_eq!(
            payload.data,
            json!({ "models": [{ "id": "model:1", "name": "User" }], "refs": ["User"] })
        );
        assert_eq!(payload.references.len(), 1);
    }
}
