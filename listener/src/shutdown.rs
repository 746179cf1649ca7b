//! Shutdown signal handling.
//!
//! The process stays alive only to keep the consume loop running, so the
//! main task has nothing to do but wait here until the operator says
//! stop.

use tracing::info;

/// Wait for SIGTERM or Ctrl+C.
pub async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(sigterm) => sigterm,
            Err(error) => {
                // Without a SIGTERM handler the process still stops on
                // Ctrl+C; log and fall back to that.
                tracing::warn!(%error, "Failed to register SIGTERM handler");
                if let Err(error) = tokio::signal::ctrl_c().await {
                    tracing::error!(%error, "Failed to wait for Ctrl+C");
                }
                info!("Received Ctrl+C");
                return;
            }
        };

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C");
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(error) = tokio::signal::ctrl_c().await {
            tracing::error!(%error, "Failed to wait for Ctrl+C");
        }
        info!("Received Ctrl+C");
    }
}
