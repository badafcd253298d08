//! Error types for reference resolution

use thiserror::Error;

/// Result type for reference operations
pub type Result<T> = std::result::Result<T, RefError>;

/// Reference engine errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RefError {
    // Schema / shape errors
    #[error("Invalid path pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("Path pattern mismatch at '{path}': expected {expected}")]
    PatternMismatch { path: String, expected: &'static str },

    #[error("Validation failed at '{path}': {message}")]
    Validation { path: String, message: String },

    #[error("Path not found: '{path}'")]
    PathNotFound { path: String },

    // Resolution errors
    #[error("Could not resolve parent path from context slot '{slot}' (scope: '{path}')")]
    UnresolvedContextSlot { slot: String, path: String },

    #[error("Context slot '{slot}' holds a {actual} but {expected} was required (scope: '{path}')")]
    ContextSlotTypeMismatch {
        slot: String,
        expected: String,
        actual: String,
        path: String,
    },

    #[error("Context slot '{slot}' is not declared by an enclosing ref context (scope: '{path}')")]
    ContextSlotNotDeclared { slot: String, path: String },

    #[error("Context slot '{slot}' already provided in this scope (scope: '{path}')")]
    ContextSlotAlreadyProvided { slot: String, path: String },

    #[error("Entity type {entity_type} requires a parent path (path: '{path}')")]
    MissingParentPath { entity_type: String, path: String },

    #[error("Entity type {entity_type} has no parent type but a parent path was given (path: '{path}')")]
    UnexpectedParentPath { entity_type: String, path: String },

    #[error("Parent of {entity_type} must be a {expected}, got {actual} (path: '{path}')")]
    ParentTypeMismatch {
        entity_type: String,
        expected: String,
        actual: String,
        path: String,
    },

    #[error("Entity at '{path}' mixes a direct name with a name derived from references")]
    ConflictingNameSources { path: String },

    #[error("Entity at '{path}' has no name")]
    MissingEntityName { path: String },

    #[error("Unable to resolve reference {name} (type: {entity_type}, path: '{path}')")]
    UnresolvedReference {
        name: String,
        entity_type: String,
        path: String,
    },

    #[error("Ambiguous reference {name} (type: {entity_type}, path: '{path}') matches ids {candidates:?}")]
    AmbiguousReference {
        name: String,
        entity_type: String,
        path: String,
        candidates: Vec<String>,
    },

    #[error("Could not resolve entity name for id: {id}")]
    UnresolvedEntityName { id: String },

    #[error("Entity {id} derives its name from '{path}' but no value is present there")]
    MissingNameRef { id: String, path: String },

    #[error("Cyclic name dependency between {members:?}")]
    NameCycle { members: Vec<String> },

    #[error("Invalid id '{id}' for entity type {entity_type}")]
    InvalidId { id: String, entity_type: String },

    // Integrity errors
    #[error("Duplicate id found: {id}")]
    DuplicateId { id: String },

    // Non-termination guard
    #[error("Exceeded max iterations ({max}) while fixing reference renames")]
    ExceededMaxIterations { max: usize },

    #[error("Reference renames do not converge: {entity_type} {from} -> {to} was applied twice")]
    RenameCycle {
        entity_type: String,
        from: String,
        to: String,
    },

    // Delete planning
    #[error("Cannot delete {id}: referenced from '{path}' with RESTRICT")]
    RestrictedDelete { id: String, path: String },
}

impl RefError {
    pub(crate) fn validation(path: impl ToString, message: impl Into<String>) -> Self {
        RefError::Validation {
            path: path.to_string(),
            message: message.into(),
        }
    }

    /// Errors a caller may tolerate in preview scenarios via
    /// `allow_invalid_references` / `allow_missing_name_refs`.
    pub fn is_resolution_error(&self) -> bool {
        matches!(
            self,
            RefError::UnresolvedContextSlot { .. }
                | RefError::ContextSlotTypeMismatch { .. }
                | RefError::UnresolvedReference { .. }
                | RefError::AmbiguousReference { .. }
                | RefError::UnresolvedEntityName { .. }
                | RefError::MissingNameRef { .. }
                | RefError::NameCycle { .. }
        )
    }

    /// Rename propagation failed to reach a fixed point.
    pub fn is_non_termination(&self) -> bool {
        matches!(
            self,
            RefError::ExceededMaxIterations { .. } | RefError::RenameCycle { .. }
        )
    }
}
