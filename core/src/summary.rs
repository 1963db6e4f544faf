//! Tabular summary of a run, one row per query result.

use std::io::Write;
use std::path::Path;

use chrono::SecondsFormat;
use serde::Serialize;

use crate::query::QueryResult;

pub const SUMMARY_FILE: &str = "summary.csv";

pub const SUMMARY_HEADER: [&str; 9] = [
    "stage_id",
    "query_file",
    "query_index",
    "info_url",
    "succeeded",
    "row_count",
    "start_time",
    "end_time",
    "duration_in_seconds",
];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryRow {
    pub stage_id: String,
    pub query_file: String,
    pub query_index: usize,
    pub info_url: String,
    pub succeeded: bool,
    pub row_count: usize,
    pub start_time: String,
    pub end_time: String,
    pub duration_in_seconds: String,
}

impl From<&QueryResult> for SummaryRow {
    fn from(result: &QueryResult) -> Self {
        Self {
            stage_id: result.stage_id.clone(),
            query_file: result
                .query_file
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "inline".to_string()),
            query_index: result.query_index,
            info_url: result.info_url.clone().unwrap_or_default(),
            succeeded: result.succeeded(),
            row_count: result.row_count,
            start_time: result.start_time.to_rfc3339_opts(SecondsFormat::Secs, false),
            end_time: result.end_time.to_rfc3339_opts(SecondsFormat::Secs, false),
            duration_in_seconds: format!("{:.6}", result.duration.as_secs_f64()),
        }
    }
}

/// Rows accumulated while the run drains its results.
#[derive(Debug, Default)]
pub struct Summary {
    rows: Vec<SummaryRow>,
}

impl Summary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, result: &QueryResult) {
        self.rows.push(SummaryRow::from(result));
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[SummaryRow] {
        &self.rows
    }

    pub fn write_to<W: Write>(&self, out: W) -> csv::Result<()> {
        let mut writer = csv::Writer::from_writer(out);
        if self.rows.is_empty() {
            // serialize() only emits the header along with the first record.
            writer.write_record(SUMMARY_HEADER)?;
        }
        for row in &self.rows {
            writer.serialize(row)?;
        }
        writer.flush()?;
        Ok(())
    }

    pub fn write_file(&self, path: &Path) -> csv::Result<()> {
        let file = std::fs::File::create(path)?;
        self.write_to(std::io::BufWriter::new(file))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ClientError, QueryError};
    use std::path::PathBuf;
    use std::time::Duration;

    fn render(summary: &Summary) -> String {
        let mut out = Vec::new();
        summary.write_to(&mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn empty_summary_still_has_header() {
        assert_eq!(
            render(&Summary::new()),
            "stage_id,query_file,query_index,info_url,succeeded,row_count,start_time,end_time,duration_in_seconds\n"
        );
    }

    #[test]
    fn rows_follow_the_header_columns() {
        let mut ok = QueryResult::new("warmup", "select 1", None, 0);
        ok.info_url = Some("http://coordinator/ui/query.html?q1".into());
        ok.row_count = 3;
        ok.duration = Duration::from_millis(1500);

        let mut failed =
            QueryResult::new("tpch", "select 2", Some(&PathBuf::from("sql/q2.sql")), 1);
        failed.error = Some(QueryError::Client(ClientError::Transport("reset".into())));

        let mut summary = Summary::new();
        summary.push(&ok);
        summary.push(&failed);

        let text = render(&summary);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], SUMMARY_HEADER.join(","));
        assert!(lines[1].starts_with("warmup,inline,0,http://coordinator/ui/query.html?q1,true,3,"));
        assert!(lines[1].ends_with(",1.500000"));
        assert!(lines[2].starts_with("tpch,sql/q2.sql,1,,false,0,"));
    }
}
