use std::sync::{Arc, OnceLock};

use tokio_util::sync::CancellationToken;

/// Shared cancellation of one graph run, with the cause that triggered it.
///
/// Derived from the caller's token: cancelling the caller cancels the run,
/// never the other way round. The first recorded cause wins.
#[derive(Debug, Clone)]
pub struct RunCancellation {
    token: CancellationToken,
    cause: Arc<OnceLock<String>>,
}

impl RunCancellation {
    pub fn new(parent: &CancellationToken) -> Self {
        Self {
            token: parent.child_token(),
            cause: Arc::new(OnceLock::new()),
        }
    }

    pub fn cancel(&self, cause: impl Into<String>) {
        let _ = self.cause.set(cause.into());
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }

    /// The recorded cause. A run cancelled through its parent token has none
    /// of its own.
    pub fn cause(&self) -> String {
        self.cause
            .get()
            .cloned()
            .unwrap_or_else(|| "run cancelled by caller".to_string())
    }
}
