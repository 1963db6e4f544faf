#[allow(clippy::module_inception)]
pub mod error;
pub mod graph;
pub mod query;

pub use error::{CliError, RunError};
pub use graph::GraphError;
pub use query::{ClientError, QueryError, StageError};
