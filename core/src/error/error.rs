use std::path::PathBuf;

use thiserror::Error;

use super::{ClientError, GraphError};

#[derive(Error, Debug)]
pub enum CliError {
    #[error("run failed: {0}")]
    Run(#[from] RunError),
    #[error("stage graph error: {0}")]
    Graph(#[from] GraphError),
    #[error("client error: {0}")]
    Client(#[from] ClientError),
    #[error("config error: {0}")]
    Config(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("anyhow error: {0}")]
    Anyhow(#[from] anyhow::Error),
}

/// Failures that prevent a graph run from starting at all.
#[derive(Error, Debug)]
pub enum RunError {
    #[error("unknown root stage: {0}")]
    UnknownStage(String),
    #[error("failed to create output directory {}: {source}", .path.display())]
    OutputDir {
        path: PathBuf,
        source: std::io::Error,
    },
}
