use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::Arc;

use futures::FutureExt;

use crate::client::QueryClient;
use crate::error::QueryError;
use crate::stage::{ExitGate, ResolvedFlags, RunCancellation};

use super::output::{output_path, OutputWriter};
use super::result::QueryResult;

/// Everything one stage needs to execute its queries.
pub struct QueryContext<'a> {
    pub stage_id: &'a str,
    pub client: &'a Arc<dyn QueryClient>,
    pub flags: ResolvedFlags,
    pub output_dir: &'a Path,
    pub cancel: &'a RunCancellation,
    pub exit: &'a ExitGate,
}

impl QueryContext<'_> {
    /// Submits one query and drains its rows. Always yields a concluded
    /// result; failures, cancellation and panics end up in `result.error`.
    pub async fn run_query(&self, index: usize, query: &str, file: Option<&Path>) -> QueryResult {
        let mut result = QueryResult::new(self.stage_id, query, file, index);

        let outcome = AssertUnwindSafe(self.submit_and_drain(&mut result))
            .catch_unwind()
            .await;
        result.error = match outcome {
            Ok(Ok(())) => None,
            Ok(Err(err)) => Some(err),
            Err(panic) => {
                let message = panic_message(&*panic);
                tracing::error!(
                    stage_id = %self.stage_id,
                    query_index = index,
                    panic = %message,
                    "recovered from panic"
                );
                Some(QueryError::Panicked(message))
            }
        };
        result.conclude();
        result
    }

    async fn submit_and_drain(&self, result: &mut QueryResult) -> Result<(), QueryError> {
        self.check_cancelled()?;

        let source = result.source_id();
        let mut handle = self.client.query(&result.query, &source).await?;
        result.query_id = Some(handle.id().to_string());
        result.info_url = Some(handle.info_uri().to_string());

        let session = self.client.session();
        tracing::debug!(
            stage_id = %self.stage_id,
            query_index = result.query_index,
            query_file = ?result.query_file,
            query_id = %handle.id(),
            catalog = session.catalog.as_deref().unwrap_or_default(),
            schema = session.schema.as_deref().unwrap_or_default(),
            save_output = self.flags.save_output,
            "submitted query"
        );

        let writer = if self.flags.save_output {
            match OutputWriter::create(output_path(self.output_dir, &source), self.exit).await {
                Ok(writer) => Some(writer),
                Err(err) => {
                    tracing::warn!(source = %source, error = %err, "failed to create query output file");
                    None
                }
            }
        } else {
            None
        };

        loop {
            self.check_cancelled()?;
            let Some(rows) = handle.next_batch().await? else {
                break;
            };
            result.row_count += rows.len();
            if let Some(writer) = &writer {
                writer.write(rows);
            }
        }
        Ok(())
    }

    /// Writes `<source>.json` with the query's raw metadata when `save_json`
    /// is set or the query failed.
    pub async fn save_query_json(&self, result: &QueryResult) {
        if !self.flags.save_json && result.succeeded() {
            return;
        }
        let Some(query_id) = result.query_id.as_deref() else {
            return;
        };

        let path = self.output_dir.join(format!("{}.json", result.source_id()));
        let saved = match self.client.query_info(query_id).await {
            Ok(body) => tokio::fs::write(&path, &body)
                .await
                .map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };
        if let Err(err) = saved {
            tracing::warn!(
                stage_id = %self.stage_id,
                query_index = result.query_index,
                query_id = %query_id,
                error = %err,
                "failed to write query json"
            );
        }
    }

    fn check_cancelled(&self) -> Result<(), QueryError> {
        if self.cancel.is_cancelled() {
            return Err(QueryError::Cancelled {
                cause: self.cancel.cause(),
            });
        }
        Ok(())
    }
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
