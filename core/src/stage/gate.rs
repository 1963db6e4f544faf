use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::Notify;

/// Countdown latch holding a stage back until every prerequisite reported.
///
/// A prerequisite counts down once when it finishes, whether it succeeded or
/// not; deciding what happens next is up to the stage itself.
#[derive(Debug)]
pub struct PrerequisiteGate {
    remaining: AtomicUsize,
    released: Notify,
}

impl PrerequisiteGate {
    pub fn new(prerequisites: usize) -> Self {
        Self {
            remaining: AtomicUsize::new(prerequisites),
            released: Notify::new(),
        }
    }

    pub fn remaining(&self) -> usize {
        self.remaining.load(Ordering::Acquire)
    }

    /// Reports one prerequisite as finished.
    pub fn count_down(&self) {
        let previous = self
            .remaining
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
        match previous {
            Ok(1) => self.released.notify_waiters(),
            Ok(_) => {}
            Err(_) => tracing::warn!("prerequisite gate counted down past zero"),
        }
    }

    /// Resolves once the count reached zero. A gate with no prerequisites is
    /// open from the start.
    pub async fn wait(&self) {
        loop {
            let notified = self.released.notified();
            tokio::pin!(notified);
            // Register before checking so a release in between is not missed.
            notified.as_mut().enable();
            if self.remaining() == 0 {
                return;
            }
            notified.await;
        }
    }
}
