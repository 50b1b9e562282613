//! OS signal handling.
//!
//! # Responsibilities
//! - Wait for SIGINT (Ctrl+C) or SIGTERM
//! - Report which one arrived so the binary can log it before stopping
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - The server threads are not Tokio tasks; only the binary's main awaits here

/// Resolve once a shutdown signal arrives, returning its name.
#[cfg(unix)]
pub async fn wait_for_shutdown_signal() -> &'static str {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut terminate) => {
            tokio::select! {
                _ = ctrl_c() => "SIGINT",
                _ = terminate.recv() => "SIGTERM",
            }
        }
        Err(e) => {
            tracing::warn!(error = %e, "SIGTERM handler unavailable, waiting for Ctrl+C only");
            ctrl_c().await
        }
    }
}

/// Resolve once Ctrl+C arrives.
#[cfg(not(unix))]
pub async fn wait_for_shutdown_signal() -> &'static str {
    ctrl_c().await
}

/// Never resolves if the handler cannot be installed.
async fn ctrl_c() -> &'static str {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
    "SIGINT"
}
