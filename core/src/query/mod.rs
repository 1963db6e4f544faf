mod execute;
mod output;
mod result;
mod split;

pub(crate) use execute::panic_message;
pub use execute::QueryContext;
pub use output::{output_path, OutputWriter};
pub use result::{query_source, QueryResult};
pub use split::split_queries;
