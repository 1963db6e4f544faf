//! Wire types of the coordinator's statement protocol.

use serde::Deserialize;
use serde_json::value::RawValue;

pub const USER_HEADER: &str = "X-Presto-User";
pub const SOURCE_HEADER: &str = "X-Presto-Source";
pub const CATALOG_HEADER: &str = "X-Presto-Catalog";
pub const SCHEMA_HEADER: &str = "X-Presto-Schema";
pub const SESSION_HEADER: &str = "X-Presto-Session";
pub const CLIENT_TAGS_HEADER: &str = "X-Presto-Client-Tags";

pub const STATEMENT_PATH: &str = "/v1/statement";
pub const QUERY_INFO_PATH: &str = "/v1/query";

/// One page of a running statement.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResults {
    pub id: String,
    #[serde(default)]
    pub info_uri: String,
    #[serde(default)]
    pub next_uri: Option<String>,
    /// Rows are kept exactly as encoded by the server.
    #[serde(default)]
    pub data: Option<Vec<Box<RawValue>>>,
    #[serde(default)]
    pub stats: Option<StatementStats>,
    #[serde(default)]
    pub error: Option<QueryErrorInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatementStats {
    #[serde(default)]
    pub state: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryErrorInfo {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub error_name: String,
    #[serde(default)]
    pub error_code: i64,
    #[serde(default)]
    pub error_type: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_failed_page() {
        let page: QueryResults = serde_json::from_str(
            r#"{
                "id": "20240101_000000_00001_abcde",
                "infoUri": "http://coordinator/ui/query.html?20240101_000000_00001_abcde",
                "stats": {"state": "FAILED"},
                "error": {
                    "message": "line 1:8: Column 'x' cannot be resolved",
                    "errorCode": 47,
                    "errorName": "COLUMN_NOT_FOUND",
                    "errorType": "USER_ERROR"
                }
            }"#,
        )
        .unwrap();

        assert!(page.next_uri.is_none());
        assert!(page.data.is_none());
        assert_eq!(page.stats.unwrap().state, "FAILED");
        let error = page.error.unwrap();
        assert_eq!(error.error_name, "COLUMN_NOT_FOUND");
        assert_eq!(error.error_code, 47);
    }

    #[test]
    fn keeps_rows_raw() {
        let page: QueryResults = serde_json::from_str(
            r#"{"id": "q", "data": [[1, "a", null], [2.50, "b", {"k": 1}]]}"#,
        )
        .unwrap();

        let rows: Vec<&str> = page.data.as_deref().unwrap().iter().map(|r| r.get()).collect();
        assert_eq!(rows, vec![r#"[1, "a", null]"#, r#"[2.50, "b", {"k": 1}]"#]);
    }
}
