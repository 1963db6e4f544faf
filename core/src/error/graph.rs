use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading or validating a stage graph.
#[derive(Error, Debug)]
pub enum GraphError {
    #[error("Duplicate stage ID: {id} ({first} and {second})")]
    DuplicateStageId {
        id: String,
        first: String,
        second: String,
    },

    #[error("Next stage not found: stage '{stage_id}' references '{missing}'")]
    NextStageNotFound { stage_id: String, missing: String },

    #[error("stage '{stage_id}' lists several query files named '{stem}'")]
    DuplicateQueryFileStem { stage_id: String, stem: String },

    #[error("Circular dependency detected: {0}")]
    CircularDependency(String),

    #[error("failed to read stage file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse stage file {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}
