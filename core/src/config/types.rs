use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub client: ClientConfig,

    #[serde(default)]
    pub run: RunConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_enabled")]
    pub enabled: bool,

    /// If true, log to the console.
    #[serde(default = "default_logging_console")]
    pub console: bool,

    /// If true, the CLI also keeps a process log under `directory`.
    #[serde(default = "default_logging_file")]
    pub file: bool,

    /// EnvFilter string, e.g. "info" or "pbench_core=debug".
    #[serde(default = "default_logging_level")]
    pub level: String,

    /// Optional directory for the process log. If empty or unset, uses OS temp dir.
    #[serde(default)]
    pub directory: Option<String>,
}

fn default_logging_enabled() -> bool {
    true
}

fn default_logging_console() -> bool {
    true
}

fn default_logging_file() -> bool {
    false
}

fn default_logging_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: default_logging_enabled(),
            console: default_logging_console(),
            file: default_logging_file(),
            level: default_logging_level(),
            directory: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default = "default_server_url")]
    pub server_url: String,

    #[serde(default = "default_user")]
    pub user: String,

    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Sent with every query so runs can be told apart on the server.
    #[serde(default)]
    pub client_tags: Vec<String>,
}

fn default_server_url() -> String {
    "http://127.0.0.1:8080".to_string()
}

fn default_user() -> String {
    "pbench".to_string()
}

fn default_request_timeout_ms() -> u64 {
    60_000
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: default_server_url(),
            user: default_user(),
            request_timeout_ms: default_request_timeout_ms(),
            client_tags: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Overrides the root stage's `output_path` when set.
    #[serde(default)]
    pub output_root: Option<String>,

    /// How long the run keeps draining results after an interrupt.
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,

    /// Whole-run deadline; unset means no deadline.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

fn default_shutdown_grace_ms() -> u64 {
    10_000
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            output_root: None,
            shutdown_grace_ms: default_shutdown_grace_ms(),
            timeout_ms: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_toml_keeps_defaults() {
        let cfg: AppConfig = toml::from_str(
            r#"
            [client]
            server_url = "http://coordinator:8080"

            [run]
            timeout_ms = 5000
            "#,
        )
        .unwrap();

        assert_eq!(cfg.client.server_url, "http://coordinator:8080");
        assert_eq!(cfg.client.user, "pbench");
        assert_eq!(cfg.run.timeout_ms, Some(5000));
        assert_eq!(cfg.run.shutdown_grace_ms, 10_000);
        assert!(cfg.logging.console);
    }
}
