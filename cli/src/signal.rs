//! Process signals that end a run early.

/// Resolves with the name of the first interrupt or termination signal
/// received. If a handler cannot be installed, that signal is never reported.
pub async fn shutdown_signal() -> String {
    tokio::select! {
        _ = ctrl_c() => "interrupt".to_string(),
        _ = wait_for_sigterm() => "terminated".to_string(),
    }
}

async fn ctrl_c() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %err, "failed to install Ctrl+C handler");
        std::future::pending::<()>().await
    }
}

#[cfg(unix)]
async fn wait_for_sigterm() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
        }
        Err(err) => {
            tracing::warn!(error = %err, "failed to install SIGTERM handler");
            std::future::pending::<()>().await
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_sigterm() {
    std::future::pending::<()>().await
}
