//! Lifecycle of a single stage inside a graph run.
//!
//! Every trigger of a stage is one task on the run's exit gate. The first
//! trigger wins the `started` flag and drives the stage through gate wait,
//! preparation and its queries; later triggers retire immediately.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::mpsc;
use tracing::Instrument;

use crate::client::ClientFactory;
use crate::error::{QueryError, StageError};
use crate::query::{panic_message, split_queries, QueryContext, QueryResult};

use super::cancel::RunCancellation;
use super::exit::ExitGate;
use super::gate::PrerequisiteGate;
use super::graph::{StageGraph, StageIndex};
use super::types::EffectiveStage;

/// Invoked for every query result once the collector has received it.
pub type QueryCompletionFn = Arc<dyn Fn(&QueryResult) + Send + Sync>;

/// First panic raised by stage code outside a query. The run re-raises it
/// after writing its summary.
#[derive(Default)]
pub(crate) struct StagePanic(Mutex<Option<Box<dyn Any + Send>>>);

impl StagePanic {
    fn store(&self, payload: Box<dyn Any + Send>) {
        let mut slot = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_none() {
            *slot = Some(payload);
        }
    }

    pub(crate) fn take(&self) -> Option<Box<dyn Any + Send>> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).take()
    }
}

struct StageSlot {
    started: AtomicBool,
    gate: PrerequisiteGate,
    effective: OnceLock<EffectiveStage>,
    /// Prerequisites taking part in this run, in declaration order.
    prerequisites: Vec<StageIndex>,
}

/// State shared by every stage task of one run.
pub(crate) struct RunState {
    graph: Arc<StageGraph>,
    slots: Vec<StageSlot>,
    root: StageIndex,
    cancel: RunCancellation,
    exit: ExitGate,
    results: mpsc::Sender<QueryResult>,
    factory: Arc<dyn ClientFactory>,
    output_dir: PathBuf,
    on_query_completion: Option<QueryCompletionFn>,
    panic: Arc<StagePanic>,
}

pub(crate) struct RunStateParts {
    pub graph: Arc<StageGraph>,
    pub root: StageIndex,
    pub cancel: RunCancellation,
    pub exit: ExitGate,
    pub results: mpsc::Sender<QueryResult>,
    pub factory: Arc<dyn ClientFactory>,
    pub output_dir: PathBuf,
    pub on_query_completion: Option<QueryCompletionFn>,
    pub panic: Arc<StagePanic>,
}

impl RunState {
    pub(crate) fn new(parts: RunStateParts) -> Arc<Self> {
        let RunStateParts {
            graph,
            root,
            cancel,
            exit,
            results,
            factory,
            output_dir,
            on_query_completion,
            panic,
        } = parts;

        let reachable = graph.reachable_from(root);
        let slots = (0..graph.len())
            .map(|index| {
                let prerequisites: Vec<StageIndex> = graph
                    .prerequisites(index)
                    .iter()
                    .copied()
                    .filter(|&p| reachable[p])
                    .collect();
                StageSlot {
                    started: AtomicBool::new(false),
                    gate: PrerequisiteGate::new(prerequisites.len()),
                    effective: OnceLock::new(),
                    prerequisites,
                }
            })
            .collect();

        Arc::new(Self {
            graph,
            slots,
            root,
            cancel,
            exit,
            results,
            factory,
            output_dir,
            on_query_completion,
            panic,
        })
    }

    /// Spawns one attempt to run the stage at `index`.
    pub(crate) fn trigger(self: &Arc<Self>, index: StageIndex) {
        let state = Arc::clone(self);
        let span = tracing::info_span!("stage", stage_id = %self.graph.stage(index).id);
        self.exit.spawn(state.run_stage(index).instrument(span));
    }

    // Boxed: the stage future spawns further stage futures.
    fn run_stage(self: Arc<Self>, index: StageIndex) -> BoxFuture<'static, ()> {
        async move { self.drive_stage(index).await }.boxed()
    }

    async fn drive_stage(self: &Arc<Self>, index: StageIndex) {
        let slot = &self.slots[index];
        if slot
            .started
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::trace!("stage already triggered by another prerequisite");
            return;
        }

        let outcome = match AssertUnwindSafe(self.execute(index)).catch_unwind().await {
            Ok(outcome) => outcome,
            Err(payload) => {
                let message = panic_message(&*payload);
                tracing::error!(panic = %message, "stage panicked outside a query");
                self.cancel.cancel(format!(
                    "stage {} panicked: {message}",
                    self.graph.stage(index).id
                ));
                self.panic.store(payload);
                self.count_down_next(index);
                return;
            }
        };
        if let Err(err) = &outcome {
            if err.is_cancellation() {
                tracing::warn!(error = %err, "stage cancelled");
            } else {
                tracing::error!(error = %err, "stage failed, cancelling the run");
                self.cancel.cancel(err.to_string());
            }
        }

        // Cancellation above is recorded first, so a released descendant
        // observes it.
        self.count_down_next(index);
        if outcome.is_ok() {
            for &dependent in self.graph.next(index) {
                self.trigger(dependent);
            }
        }
    }

    /// Descendants count every prerequisite exactly once, whatever its
    /// outcome.
    fn count_down_next(&self, index: StageIndex) {
        for &dependent in self.graph.next(index) {
            self.slots[dependent].gate.count_down();
        }
    }

    async fn execute(&self, index: StageIndex) -> Result<(), StageError> {
        let stage = self.graph.stage(index);
        let slot = &self.slots[index];

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                return Err(StageError::Cancelled {
                    stage_id: stage.id.clone(),
                    cause: self.cancel.cause(),
                });
            }
            _ = slot.gate.wait() => {
                tracing::debug!(prerequisites = slot.prerequisites.len(), "all prerequisites finished");
            }
        }

        let effective = self.prepare(index).await?;
        let ctx = QueryContext {
            stage_id: &stage.id,
            client: &effective.client,
            flags: effective.flags,
            output_dir: &self.output_dir,
            cancel: &self.cancel,
            exit: &self.exit,
        };

        self.run_queries(&ctx, &stage.queries, None).await?;
        for file in &stage.query_files {
            match tokio::fs::read_to_string(file).await {
                Ok(text) => {
                    let queries = split_queries(&text);
                    self.run_queries(&ctx, &queries, Some(file.as_path())).await?;
                }
                Err(err) => {
                    let mut result = QueryResult::new(&stage.id, "", Some(file.as_path()), 0);
                    result.error = Some(QueryError::QueryFile {
                        path: file.display().to_string(),
                        message: err.to_string(),
                    });
                    result.conclude();
                    self.finish_query(&ctx, result).await?;
                }
            }
        }
        Ok(())
    }

    /// Resolves the configuration the stage runs with and records it for
    /// its descendants.
    async fn prepare(&self, index: StageIndex) -> Result<EffectiveStage, StageError> {
        let stage = self.graph.stage(index);
        let slot = &self.slots[index];

        // First declared prerequisite that resolved a configuration.
        let parent = slot
            .prerequisites
            .iter()
            .find_map(|&p| self.slots[p].effective.get());

        let (client, parent_flags) = match parent {
            Some(parent) if !stage.start_on_new_client => {
                let session = parent.client.session().overlay(&stage.session);
                (parent.client.with_session(session), parent.flags)
            }
            _ => {
                let fresh = self
                    .factory
                    .new_client()
                    .map_err(|source| StageError::Client {
                        stage_id: stage.id.clone(),
                        source,
                    })?;
                let session = fresh.session().overlay(&stage.session);
                let flags = parent.map(|p| p.flags).unwrap_or_default();
                (fresh.with_session(session), flags)
            }
        };

        let effective = EffectiveStage {
            client,
            flags: stage.flags.resolve(parent_flags),
        };
        let _ = slot.effective.set(effective.clone());

        if let Err(err) = tokio::fs::create_dir_all(&self.output_dir).await {
            tracing::warn!(output_path = %self.output_dir.display(), error = %err, "failed to create output directory");
        }

        tracing::debug!(
            root = index == self.root,
            new_client = stage.start_on_new_client || parent.is_none(),
            abort_on_error = effective.flags.abort_on_error,
            save_output = effective.flags.save_output,
            save_json = effective.flags.save_json,
            "stage prepared"
        );
        Ok(effective)
    }

    async fn run_queries(
        &self,
        ctx: &QueryContext<'_>,
        queries: &[String],
        file: Option<&Path>,
    ) -> Result<(), StageError> {
        for (index, query) in queries.iter().enumerate() {
            let result = ctx.run_query(index, query, file).await;
            self.finish_query(ctx, result).await?;
        }
        Ok(())
    }

    /// Reports one concluded query and decides whether the stage goes on.
    async fn finish_query(
        &self,
        ctx: &QueryContext<'_>,
        result: QueryResult,
    ) -> Result<(), StageError> {
        ctx.save_query_json(&result).await;

        match &result.error {
            None => tracing::info!(
                query_index = result.query_index,
                query_file = ?result.query_file,
                query_id = result.query_id.as_deref().unwrap_or_default(),
                info_url = result.info_url.as_deref().unwrap_or_default(),
                row_count = result.row_count,
                duration_ms = result.duration.as_millis() as u64,
                "query finished"
            ),
            Some(err) if err.is_cancellation() => {}
            Some(err) => tracing::error!(
                query_index = result.query_index,
                query_file = ?result.query_file,
                query_id = result.query_id.as_deref().unwrap_or_default(),
                info_url = result.info_url.as_deref().unwrap_or_default(),
                error = %err,
                "query failed"
            ),
        }

        let error = result.error.clone();
        let completion = self
            .on_query_completion
            .as_ref()
            .map(|callback| (callback, result.clone()));
        if self.results.send(result).await.is_err() {
            // The collector is gone; nothing this stage does is recorded anymore.
            return Err(StageError::Cancelled {
                stage_id: ctx.stage_id.to_string(),
                cause: "result collector closed".to_string(),
            });
        }
        if let Some((callback, result)) = completion {
            callback(&result);
        }

        match error {
            None => Ok(()),
            Some(QueryError::Cancelled { cause }) => Err(StageError::Cancelled {
                stage_id: ctx.stage_id.to_string(),
                cause,
            }),
            Some(source) if ctx.flags.abort_on_error => Err(StageError::QueryFailed {
                stage_id: ctx.stage_id.to_string(),
                source,
            }),
            Some(_) => Ok(()),
        }
    }
}
