//! Engine options
//!
//! The engine reads no files and no environment variables. Callers build these
//! option structs directly or deserialize them from whatever configuration
//! format their application already uses.
//!
//! ## Example (JSON):
//! ```json
//! {
//!   "resolve": { "allow_invalid_references": true },
//!   "rename": { "ignored_references": ["model-primary-key"], "max_iterations": 50 }
//! }
//! ```

use serde::{Deserialize, Serialize};

/// Default cap for the rename fixed-point loop
pub const DEFAULT_MAX_RENAME_ITERATIONS: usize = 100;

/// Aggregated options for every pass of the engine
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Name/reference resolution settings
    #[serde(default)]
    pub resolve: ResolveOptions,

    /// Rename propagation settings
    #[serde(default)]
    pub rename: RenameOptions,
}

/// Options for resolving a parsed payload
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolveOptions {
    /// Leave reference fields untouched (the document already stores ids)
    #[serde(default)]
    pub skip_reference_name_resolution: bool,

    /// Keep going when a reference or a name dependency has no target
    #[serde(default)]
    pub allow_invalid_references: bool,

    /// Tolerate entities whose derived name has no source value
    #[serde(default)]
    pub allow_missing_name_refs: bool,
}

impl ResolveOptions {
    /// Options for reading a document whose references already hold ids
    pub fn skip_names() -> Self {
        Self {
            skip_reference_name_resolution: true,
            ..Self::default()
        }
    }

    /// Options for previewing a document with dangling references
    pub fn preview() -> Self {
        Self {
            allow_invalid_references: true,
            allow_missing_name_refs: true,
            ..Self::default()
        }
    }
}

/// Options for rename propagation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenameOptions {
    /// Reference pattern names never rewritten (e.g. a primary-key declaration)
    #[serde(default)]
    pub ignored_references: Vec<String>,

    /// Fixed-point iteration cap
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
}

fn default_max_iterations() -> usize {
    DEFAULT_MAX_RENAME_ITERATIONS
}

impl Default for RenameOptions {
    fn default() -> Self {
        Self {
            ignored_references: Vec::new(),
            max_iterations: default_max_iterations(),
        }
    }
}

impl RenameOptions {
    pub fn ignoring<I, S>(ignored: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            ignored_references: ignored.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub(crate) fn is_ignored(&self, reference_name: &str) -> bool {
        self.ignored_references.iter().any(|r| r == reference_name)
    }
}
