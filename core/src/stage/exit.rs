use std::future::Future;

use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;
use tracing::instrument::WithSubscriber;

/// Tracks every piece of background work of one run so the run loop does not
/// return while any of it is still in flight.
///
/// The gate starts held by the root run itself. Stage tasks and output
/// writers are spawned through it and release their count when they end,
/// including by panic. Once the root released its own count and the last
/// tracked task finished, [`ExitGate::wait`] resolves.
#[derive(Debug, Clone, Default)]
pub struct ExitGate {
    tracker: TaskTracker,
}

impl ExitGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawns `future` as tracked work. The task logs through the dispatcher
    /// current at the call site.
    pub fn spawn<F>(&self, future: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.tracker.spawn(future.with_current_subscriber())
    }

    /// Releases the root's own count.
    pub fn release_root(&self) {
        self.tracker.close();
    }

    pub fn outstanding(&self) -> usize {
        self.tracker.len()
    }

    pub async fn wait(&self) {
        self.tracker.wait().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn held_until_root_releases() {
        let gate = ExitGate::new();
        let waited = tokio::time::timeout(Duration::from_millis(50), gate.wait()).await;
        assert!(waited.is_err(), "gate must stay closed while the root holds it");

        gate.release_root();
        tokio::time::timeout(Duration::from_secs(1), gate.wait())
            .await
            .expect("gate opens once the root released it");
    }

    #[tokio::test]
    async fn waits_for_work_spawned_after_root_release() {
        let gate = ExitGate::new();
        let (tx, rx) = oneshot::channel::<()>();
        gate.release_root();

        let inner = gate.clone();
        gate.spawn(async move {
            inner.spawn(async move {
                let _ = rx.await;
            });
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(gate.outstanding(), 1);

        tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(1), gate.wait())
            .await
            .expect("gate opens after nested work finished");
    }

    #[tokio::test]
    async fn panicking_work_still_releases() {
        let gate = ExitGate::new();
        let handle = gate.spawn(async { panic!("writer blew up") });
        gate.release_root();

        assert!(handle.await.unwrap_err().is_panic());
        tokio::time::timeout(Duration::from_secs(1), gate.wait())
            .await
            .expect("panicked task must not hold the gate");
    }
}
