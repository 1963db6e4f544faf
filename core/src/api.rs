//! Stable re-exports for consumers (`cli`, `plugins`, and external crates).
//!
//! Prefer importing from `pbench_core::api` instead of reaching into internal modules.

pub use crate::client::{ClientFactory, QueryClient, QueryHandle, Row, Session};
pub use crate::config::{
    apply_env_overrides, load_default, load_file, AppConfig, ClientConfig, LoggingConfig,
    RunConfig,
};
pub use crate::error::{ClientError, CliError, GraphError, QueryError, RunError, StageError};
pub use crate::query::{query_source, split_queries, QueryResult};
pub use crate::stage::{
    load_stage_graph, LoadedGraph, QueryCompletionFn, RunOptions, RunReport, Stage, StageFlags,
    StageGraph, StageGraphBuilder, StageRunner,
};
pub use crate::summary::{Summary, SummaryRow, SUMMARY_FILE};
