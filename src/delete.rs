//! Delete planning
//!
//! Works out what each reference's `on_delete` policy asks for when a set of
//! entities disappears from a resolved payload. Carrying the plan out is left
//! to the caller.

use serde::Serialize;
use std::collections::HashSet;

use crate::error::{RefError, Result};
use crate::path::{self, PathSegment, ReferencePath};
use crate::types::{Entity, OnDelete, RefPayload, Reference};

/// What must happen to one referencing location
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeleteAction {
    /// Write `null` into the reference field
    SetNull,
    /// Remove the reference field
    SetUndefined,
    /// Remove the node holding the reference
    DeleteReferencingNode,
    /// Remove the array element enclosing the node holding the reference
    DeleteParent,
}

/// One step of a deletion plan
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlannedAction {
    pub reference: Reference,
    /// Deleted entity the reference points at
    pub target_id: String,
    pub action: DeleteAction,
    /// Location the action applies to
    pub path: ReferencePath,
}

/// Entities removed by a delete and what their referrers must do
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DeletionPlan {
    /// Requested entities plus every entity nested inside them
    pub deleted: Vec<Entity>,
    pub actions: Vec<PlannedAction>,
}

impl DeletionPlan {
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

/// Node owning the reference field: the element itself for arrays of
/// references, otherwise the object holding the field
fn owning_node(reference_path: &ReferencePath) -> ReferencePath {
    match reference_path.last() {
        Some(PathSegment::Index(_)) => reference_path.clone(),
        _ => reference_path.parent().unwrap_or_default(),
    }
}

/// Nearest array element strictly above `node`, else `node`'s parent
fn enclosing_element(node: &ReferencePath) -> ReferencePath {
    let mut current = node.parent();
    while let Some(candidate) = current {
        if matches!(candidate.last(), Some(PathSegment::Index(_))) {
            return candidate;
        }
        current = candidate.parent();
    }
    node.parent().unwrap_or_default()
}

/// Plan the deletion of `ids` from `payload`.
///
/// References living inside a deleted subtree go away with it and need no
/// action. The first `RESTRICT` reference to a deleted entity aborts the plan.
pub fn plan_deletion(payload: &RefPayload, ids: &[&str]) -> Result<DeletionPlan> {
    let roots: Vec<&Entity> = ids
        .iter()
        .map(|id| {
            payload
                .entity_by_id(id)
                .ok_or_else(|| RefError::UnresolvedEntityName { id: id.to_string() })
        })
        .collect::<Result<_>>()?;

    let deleted: Vec<Entity> = payload
        .entities
        .iter()
        .filter(|entity| roots.iter().any(|root| entity.path.starts_with(&root.path)))
        .cloned()
        .collect();
    let deleted_ids: HashSet<&str> = deleted.iter().map(|e| e.id.as_str()).collect();

    let mut actions = Vec::new();
    for reference in &payload.references {
        if roots.iter().any(|root| reference.path.starts_with(&root.path)) {
            continue;
        }
        let Some(target_id) = path::get_str(&payload.data, &reference.path) else {
            continue;
        };
        if !deleted_ids.contains(target_id) {
            continue;
        }

        let (action, path) = match reference.on_delete {
            OnDelete::Restrict => {
                return Err(RefError::RestrictedDelete {
                    id: target_id.to_string(),
                    path: reference.path.to_string(),
                })
            }
            OnDelete::SetNull => (DeleteAction::SetNull, reference.path.clone()),
            OnDelete::SetUndefined => (DeleteAction::SetUndefined, reference.path.clone()),
            OnDelete::Delete => (DeleteAction::DeleteReferencingNode, owning_node(&reference.path)),
            OnDelete::DeleteParent => (
                DeleteAction::DeleteParent,
                enclosing_element(&owning_node(&reference.path)),
            ),
        };
        actions.push(PlannedAction {
            reference: reference.clone(),
            target_id: target_id.to_string(),
            action,
            path,
        });
    }

    tracing::debug!(
        deleted = deleted.len(),
        actions = actions.len(),
        "planned deletion"
    );
    Ok(DeletionPlan { deleted, actions })
}
