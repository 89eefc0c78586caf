//! Error types for the domainlens core library.

use serde::{Deserialize, Serialize};

/// A reference to an entity id that the owning file analysis does not define.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DanglingRef {
    pub file_path: String,
    /// Which input carried the reference: "relationship", "tags", "workflow" or "score".
    pub source: String,
    pub entity: String,
}

impl std::fmt::Display for DanglingRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {} references unknown entity {}", self.file_path, self.source, self.entity)
    }
}

/// Top-level error enum for the domainlens core library.
#[derive(Debug, thiserror::Error)]
pub enum SemanticError {
    #[error("File too large: {path} is {size} bytes (limit {limit})")]
    TooLarge {
        path: String,
        size: usize,
        limit: usize,
    },

    #[error("Index build failed: {} dangling reference(s): {}", .dangling.len(), join_dangling(.dangling))]
    BuildInvariant { dangling: Vec<DanglingRef> },

    #[error("Index build failed: file {0} was supplied more than once")]
    DuplicateFile(String),

    #[error("Query error: {0}")]
    QueryInput(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

fn join_dangling(dangling: &[DanglingRef]) -> String {
    dangling
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

pub type SemanticResult<T> = Result<T, SemanticError>;
