use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Local};

use crate::error::QueryError;

/// Outcome of one executed query, inline or from a query file.
#[derive(Debug, Clone)]
pub struct QueryResult {
    pub stage_id: String,
    pub query: String,
    pub query_file: Option<PathBuf>,
    /// Zero-based position within its batch (inline list or one file).
    pub query_index: usize,
    pub query_id: Option<String>,
    pub info_url: Option<String>,
    pub start_time: DateTime<Local>,
    pub end_time: DateTime<Local>,
    pub duration: Duration,
    pub row_count: usize,
    pub error: Option<QueryError>,
}

impl QueryResult {
    pub fn new(
        stage_id: impl Into<String>,
        query: impl Into<String>,
        query_file: Option<&Path>,
        query_index: usize,
    ) -> Self {
        let now = Local::now();
        Self {
            stage_id: stage_id.into(),
            query: query.into(),
            query_file: query_file.map(Path::to_path_buf),
            query_index,
            query_id: None,
            info_url: None,
            start_time: now,
            end_time: now,
            duration: Duration::ZERO,
            row_count: 0,
            error: None,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }

    /// Deterministic tag used for server-side tracing and local file names.
    pub fn source_id(&self) -> String {
        query_source(&self.stage_id, self.query_file.as_deref(), self.query_index)
    }

    /// Stamps end time and duration.
    pub fn conclude(&mut self) {
        self.end_time = Local::now();
        self.duration = (self.end_time - self.start_time)
            .to_std()
            .unwrap_or_default();
    }
}

pub fn query_source(stage_id: &str, query_file: Option<&Path>, index: usize) -> String {
    match query_file.and_then(Path::file_stem) {
        Some(stem) => format!("{}_{}_{}", stage_id, stem.to_string_lossy(), index),
        None => format!("{}_{}", stage_id, index),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_id_includes_file_stem() {
        let inline = QueryResult::new("warmup", "select 1", None, 3);
        let from_file = QueryResult::new("warmup", "select 1", Some(Path::new("sql/q07.sql")), 0);

        assert_eq!(inline.source_id(), "warmup_3");
        assert_eq!(from_file.source_id(), "warmup_q07_0");
    }

    #[test]
    fn conclude_sets_end_time_and_duration() {
        let mut result = QueryResult::new("s", "select 1", None, 0);
        std::thread::sleep(Duration::from_millis(5));
        result.conclude();

        assert!(result.end_time >= result.start_time);
        assert!(result.duration >= Duration::from_millis(5));
        assert!(result.succeeded());
    }
}
