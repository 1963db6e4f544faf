//! Per-run log routing.
//!
//! Each run gets its own `tracing::Dispatch` writing to stdout and to
//! `<output_dir>/<stage_id>.log`. The dispatch is attached to the run future
//! and to every task spawned for the run, so concurrent runs in one process
//! never share or replace each other's sinks.

use std::path::{Path, PathBuf};

use tracing::Dispatch;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

pub struct RunLogger {
    dispatch: Dispatch,
    log_path: Option<PathBuf>,
    // Flushes the file writer when the logger is dropped.
    _guard: Option<WorkerGuard>,
}

impl RunLogger {
    pub fn open(cfg: &LoggingConfig, output_dir: &Path, stage_id: &str) -> Self {
        if !cfg.enabled {
            return Self {
                dispatch: Dispatch::none(),
                log_path: None,
                _guard: None,
            };
        }

        let log_path = output_dir.join(format!("{stage_id}.log"));
        let (file_layer, guard, open_error) = match std::fs::File::create(&log_path) {
            Ok(file) => {
                let (writer, guard) = tracing_appender::non_blocking(file);
                let layer = tracing_subscriber::fmt::layer()
                    .with_writer(writer)
                    .with_ansi(false);
                (Some(layer), Some(guard), None)
            }
            Err(err) => (None, None, Some(err)),
        };

        let console_layer = cfg
            .console
            .then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stdout));

        let subscriber = tracing_subscriber::registry()
            .with(env_filter(&cfg.level))
            .with(console_layer)
            .with(file_layer);
        let dispatch = Dispatch::new(subscriber);

        if let Some(err) = &open_error {
            tracing::dispatcher::with_default(&dispatch, || {
                tracing::warn!(
                    log_path = %log_path.display(),
                    error = %err,
                    "failed to create log file, logging to stdout only"
                );
            });
        }

        Self {
            dispatch,
            log_path: open_error.is_none().then_some(log_path),
            _guard: guard,
        }
    }

    pub fn dispatch(&self) -> &Dispatch {
        &self.dispatch
    }

    pub fn log_path(&self) -> Option<&Path> {
        self.log_path.as_deref()
    }
}

fn env_filter(level: &str) -> EnvFilter {
    match std::env::var("RUST_LOG") {
        Ok(v) if !v.trim().is_empty() => EnvFilter::from_default_env(),
        _ => EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info")),
    }
}
