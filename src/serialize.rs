//! Id to name serialization
//!
//! The inverse of deserialization: a document that stores ids in its
//! reference fields is turned back into the name-based form a human edits.

use serde_json::Value;

use crate::config::ResolveOptions;
use crate::error::{RefError, Result};
use crate::path;
use crate::resolve::parse_schema_with_transformed_references;
use crate::schema::Schema;

/// Replace every reference id in `data` with its target's name.
///
/// Entities flagged `strip_id_when_serializing` lose their id field.
pub fn serialize_schema_with_references(
    schema: &Schema,
    data: &Value,
    options: &ResolveOptions,
) -> Result<Value> {
    let options = ResolveOptions {
        skip_reference_name_resolution: true,
        ..options.clone()
    };
    let payload = parse_schema_with_transformed_references(schema, data, &options)?;

    let mut out = payload.data.clone();
    for reference in &payload.references {
        let Some(id) = path::get_str(&payload.data, &reference.path) else {
            continue;
        };
        match payload.entity_by_id(id) {
            Some(entity) => path::set(&mut out, &reference.path, Value::String(entity.name.clone()))?,
            None if options.allow_invalid_references => {
                tracing::warn!(id, path = %reference.path, "serializing dangling reference as is");
            }
            None => return Err(RefError::UnresolvedEntityName { id: id.to_string() }),
        }
    }

    for entity in payload.entities.iter().filter(|e| e.strip_id_when_serializing) {
        path::remove(&mut out, &entity.id_path);
    }

    tracing::debug!(references = payload.references.len(), "serialized references to names");
    Ok(out)
}
