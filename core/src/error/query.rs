use thiserror::Error;

/// Errors reported by a query client implementation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("http status {status} from {url}: {body}")]
    Status {
        status: u16,
        url: String,
        body: String,
    },

    #[error("query {query_id} failed: {name}: {message}")]
    Server {
        query_id: String,
        name: String,
        message: String,
    },

    #[error("decode error: {0}")]
    Decode(String),
}

/// Terminal error of one executed query, stored on its `QueryResult`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    #[error("query cancelled: {cause}")]
    Cancelled { cause: String },

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error("query execution panicked: {0}")]
    Panicked(String),

    #[error("failed to read query file {path}: {message}")]
    QueryFile { path: String, message: String },
}

impl QueryError {
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

/// Why a stage did not finish successfully.
#[derive(Error, Debug, Clone)]
pub enum StageError {
    #[error("stage {stage_id} cancelled: {cause}")]
    Cancelled { stage_id: String, cause: String },

    #[error("stage {stage_id} aborted after a failed query: {source}")]
    QueryFailed { stage_id: String, source: QueryError },

    #[error("stage {stage_id} could not create a client: {source}")]
    Client {
        stage_id: String,
        source: ClientError,
    },
}

impl StageError {
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}
