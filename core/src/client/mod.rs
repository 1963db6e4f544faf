//! Query client seam.
//!
//! The scheduler never speaks a wire protocol itself; it submits queries and
//! drains their rows through these traits. `pbench-plugins` provides the HTTP
//! implementation, tests provide scripted in-memory ones.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::value::RawValue;

use crate::error::ClientError;

/// One result row, exactly as the server encoded it.
pub type Row = Box<RawValue>;

/// Catalog, schema and session parameters a client submits queries with.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Session {
    pub catalog: Option<String>,
    pub schema: Option<String>,
    pub params: BTreeMap<String, serde_json::Value>,
}

impl Session {
    /// Returns `self` overlaid with `child`: fields set on the child win and
    /// session parameters merge key by key.
    pub fn overlay(&self, child: &Session) -> Session {
        let mut params = self.params.clone();
        params.extend(
            child
                .params
                .iter()
                .map(|(key, value)| (key.clone(), value.clone())),
        );
        Session {
            catalog: child.catalog.clone().or_else(|| self.catalog.clone()),
            schema: child.schema.clone().or_else(|| self.schema.clone()),
            params,
        }
    }

    /// Session parameters rendered as `key=value` pairs, in key order.
    pub fn param_pairs(&self) -> Vec<String> {
        self.params
            .iter()
            .map(|(key, value)| match value {
                serde_json::Value::String(s) => format!("{key}={s}"),
                other => format!("{key}={other}"),
            })
            .collect()
    }
}

/// A submitted query whose rows can be drained page by page.
#[async_trait]
pub trait QueryHandle: Send {
    fn id(&self) -> &str;

    fn info_uri(&self) -> &str;

    /// Next batch of rows, or `None` once the stream is exhausted. A query
    /// failure reported by the server surfaces here as an error.
    async fn next_batch(&mut self) -> Result<Option<Vec<Row>>, ClientError>;
}

#[async_trait]
pub trait QueryClient: Send + Sync {
    fn session(&self) -> &Session;

    /// A client sharing this one's transport and identity but submitting
    /// queries with `session`.
    fn with_session(&self, session: Session) -> Arc<dyn QueryClient>;

    /// Submits `text`, tagged with `source` for server-side tracing.
    async fn query(&self, text: &str, source: &str) -> Result<Box<dyn QueryHandle>, ClientError>;

    /// Raw metadata document of a submitted query.
    async fn query_info(&self, query_id: &str) -> Result<Bytes, ClientError>;
}

pub trait ClientFactory: Send + Sync {
    fn new_client(&self) -> Result<Arc<dyn QueryClient>, ClientError>;
}
