//! Entry point of a graph run: output directory, per-run logging, result
//! collection and the summary file.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, SecondsFormat};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::instrument::WithSubscriber;

use crate::client::ClientFactory;
use crate::config::{AppConfig, LoggingConfig};
use crate::error::RunError;
use crate::logging::RunLogger;
use crate::query::QueryResult;
use crate::summary::{Summary, SUMMARY_FILE};

use super::cancel::RunCancellation;
use super::exit::ExitGate;
use super::graph::{StageGraph, StageIndex};
use super::runner::{QueryCompletionFn, RunState, RunStateParts, StagePanic};

#[derive(Clone)]
pub struct RunOptions {
    /// Overrides the root stage's `output_path`.
    pub output_root: Option<PathBuf>,
    /// How long results are still collected after a shutdown signal.
    pub shutdown_grace: Duration,
    pub timeout: Option<Duration>,
    pub logging: LoggingConfig,
    pub on_query_completion: Option<QueryCompletionFn>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            output_root: None,
            shutdown_grace: Duration::from_secs(10),
            timeout: None,
            logging: LoggingConfig::default(),
            on_query_completion: None,
        }
    }
}

impl RunOptions {
    pub fn from_config(cfg: &AppConfig) -> Self {
        Self {
            output_root: cfg.run.output_root.as_ref().map(PathBuf::from),
            shutdown_grace: Duration::from_millis(cfg.run.shutdown_grace_ms),
            timeout: cfg.run.timeout_ms.map(Duration::from_millis),
            logging: cfg.logging.clone(),
            on_query_completion: None,
        }
    }

    pub fn with_query_completion<F>(mut self, callback: F) -> Self
    where
        F: Fn(&QueryResult) + Send + Sync + 'static,
    {
        self.on_query_completion = Some(Arc::new(callback));
        self
    }
}

impl std::fmt::Debug for RunOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunOptions")
            .field("output_root", &self.output_root)
            .field("shutdown_grace", &self.shutdown_grace)
            .field("timeout", &self.timeout)
            .field("logging", &self.logging)
            .field("on_query_completion", &self.on_query_completion.is_some())
            .finish()
    }
}

/// What a finished run produced.
#[derive(Debug)]
pub struct RunReport {
    pub output_dir: PathBuf,
    /// Results in the order the collector received them.
    pub results: Vec<QueryResult>,
    /// Cause of the run-wide cancellation, if it fired.
    pub cancellation: Option<String>,
}

impl RunReport {
    pub fn failed_queries(&self) -> usize {
        self.results.iter().filter(|r| !r.succeeded()).count()
    }

    pub fn was_cancelled(&self) -> bool {
        self.cancellation.is_some()
    }
}

pub struct StageRunner {
    graph: Arc<StageGraph>,
    factory: Arc<dyn ClientFactory>,
    options: RunOptions,
}

impl StageRunner {
    pub fn new(graph: Arc<StageGraph>, factory: Arc<dyn ClientFactory>) -> Self {
        Self {
            graph,
            factory,
            options: RunOptions::default(),
        }
    }

    pub fn with_options(mut self, options: RunOptions) -> Self {
        self.options = options;
        self
    }

    pub fn graph(&self) -> &StageGraph {
        &self.graph
    }

    /// Runs the graph starting at `root` and returns once every stage task
    /// and background writer finished, or the shutdown grace period ran out.
    ///
    /// `shutdown` resolves with a signal name when the process is asked to
    /// stop; the run then cancels itself and still writes its summary.
    /// Cancelling `parent` cancels the run as well.
    ///
    /// A panic in stage code outside a query cancels the run and is resumed
    /// from here once the summary is written.
    pub async fn run<S>(
        &self,
        root: &str,
        parent: &CancellationToken,
        shutdown: S,
    ) -> Result<RunReport, RunError>
    where
        S: Future<Output = String>,
    {
        let root_index = self
            .graph
            .index_of(root)
            .ok_or_else(|| RunError::UnknownStage(root.to_string()))?;
        let root_stage = self.graph.stage(root_index);

        let base = self
            .options
            .output_root
            .clone()
            .or_else(|| root_stage.output_path.clone())
            .unwrap_or_else(|| PathBuf::from("."));
        let output_dir = create_run_dir(&base, &root_stage.id)?;

        let logger = RunLogger::open(&self.options.logging, &output_dir, &root_stage.id);
        let panic = Arc::new(StagePanic::default());
        let report = self
            .collect(root_index, output_dir, parent, shutdown, &panic)
            .with_subscriber(logger.dispatch().clone())
            .await;
        // Flushes the run's log file.
        drop(logger);
        if let Some(payload) = panic.take() {
            std::panic::resume_unwind(payload);
        }
        Ok(report)
    }

    async fn collect<S>(
        &self,
        root: StageIndex,
        output_dir: PathBuf,
        parent: &CancellationToken,
        shutdown: S,
        panic: &Arc<StagePanic>,
    ) -> RunReport
    where
        S: Future<Output = String>,
    {
        let run_id = uuid::Uuid::new_v4();
        let root_id = &self.graph.stage(root).id;
        tracing::info!(
            run_id = %run_id,
            stage_id = %root_id,
            output_path = %output_dir.display(),
            "output will be saved in this path"
        );
        tracing::debug!(layers = ?self.layer_ids(root), "stage layers");

        // Closest tokio gets to an unbuffered handoff: at most one result
        // waits for the collector.
        let (tx, mut rx) = mpsc::channel::<QueryResult>(1);
        let cancel = RunCancellation::new(parent);
        let exit = ExitGate::new();

        let timer = self.options.timeout.map(|timeout| {
            let cancel = cancel.clone();
            tokio::spawn(
                async move {
                    tokio::time::sleep(timeout).await;
                    cancel.cancel(format!("run timed out after {timeout:?}"));
                }
                .with_current_subscriber(),
            )
        });

        let state = RunState::new(RunStateParts {
            graph: Arc::clone(&self.graph),
            root,
            cancel: cancel.clone(),
            exit: exit.clone(),
            results: tx,
            factory: Arc::clone(&self.factory),
            output_dir: output_dir.clone(),
            on_query_completion: self.options.on_query_completion.clone(),
            panic: Arc::clone(panic),
        });
        state.trigger(root);
        drop(state);
        exit.release_root();

        let mut summary = Summary::new();
        let mut results = Vec::new();
        let mut grace_deadline: Option<Instant> = None;
        let finished = exit.wait();
        tokio::pin!(finished);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                biased;
                Some(result) = rx.recv() => {
                    summary.push(&result);
                    results.push(result);
                }
                _ = &mut finished => break,
                signal = &mut shutdown, if grace_deadline.is_none() => {
                    tracing::warn!(signal = %signal, "received shutdown signal, cancelling the run");
                    cancel.cancel(format!("received signal: {signal}"));
                    grace_deadline = Some(Instant::now() + self.options.shutdown_grace);
                }
                _ = sleep_until_deadline(grace_deadline) => {
                    tracing::warn!(
                        outstanding = exit.outstanding(),
                        "shutdown grace period elapsed, writing partial summary"
                    );
                    break;
                }
            }
        }
        // Results sent right before the exit gate closed.
        while let Ok(result) = rx.try_recv() {
            summary.push(&result);
            results.push(result);
        }
        if let Some(timer) = timer {
            timer.abort();
        }

        let summary_path = output_dir.join(SUMMARY_FILE);
        match summary.write_file(&summary_path) {
            Ok(()) => tracing::info!(
                path = %summary_path.display(),
                rows = summary.len(),
                "summary written"
            ),
            Err(err) => tracing::warn!(
                path = %summary_path.display(),
                error = %err,
                "failed to write summary"
            ),
        }

        let cancellation = cancel.is_cancelled().then(|| cancel.cause());
        if let Some(cause) = &cancellation {
            tracing::warn!(run_id = %run_id, cause = %cause, "run was cancelled");
        }
        RunReport {
            output_dir,
            results,
            cancellation,
        }
    }

    fn layer_ids(&self, root: StageIndex) -> Vec<Vec<&str>> {
        self.graph
            .layers(root)
            .into_iter()
            .map(|layer| {
                layer
                    .into_iter()
                    .map(|index| self.graph.stage(index).id.as_str())
                    .collect()
            })
            .collect()
    }
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Creates `<base>/<stage_id>-<timestamp>`, adding a numeric suffix when a
/// previous run already used the name.
fn create_run_dir(base: &Path, stage_id: &str) -> Result<PathBuf, RunError> {
    std::fs::create_dir_all(base).map_err(|source| RunError::OutputDir {
        path: base.to_path_buf(),
        source,
    })?;

    let name = format!(
        "{}-{}",
        stage_id,
        Local::now().to_rfc3339_opts(SecondsFormat::Millis, false)
    );
    let mut attempt = 0usize;
    loop {
        let candidate = match attempt {
            0 => base.join(&name),
            n => base.join(format!("{name}-{n}")),
        };
        match std::fs::create_dir(&candidate) {
            Ok(()) => return Ok(candidate),
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => attempt += 1,
            Err(source) => {
                return Err(RunError::OutputDir {
                    path: candidate,
                    source,
                })
            }
        }
    }
}
