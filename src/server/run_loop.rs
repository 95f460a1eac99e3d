// src/server/run_loop.rs

//! The main wait loop: watches the background tasks and handles graceful
//! shutdown on SIGINT/SIGTERM.

use super::spawner::RunningContext;
use std::time::Duration;
use tracing::{error, info, warn};

// Platform-specific signal handling imports
#[cfg(windows)]
use tokio::signal;
#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// How long shutdown waits for background tasks to drain.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Waits for a shutdown signal based on the operating system.
/// On Unix it listens for SIGINT and SIGTERM; on Windows for Ctrl+C.
async fn await_shutdown_signal() {
    #[cfg(unix)]
    let mut sigint = signal(SignalKind::interrupt()).expect("Failed to create SIGINT stream");
    #[cfg(unix)]
    let mut sigterm = signal(SignalKind::terminate()).expect("Failed to create SIGTERM stream");

    #[cfg(windows)]
    let mut ctrl_c = signal::ctrl_c().expect("Failed to create Ctrl+C stream");

    tokio::select! {
        _ = async { #[cfg(unix)] { sigint.recv().await; info!("SIGINT received, initiating graceful shutdown."); } } => {},
        _ = async { #[cfg(unix)] { sigterm.recv().await; info!("SIGTERM received, initiating graceful shutdown."); } } => {},
        _ = async { #[cfg(windows)] { ctrl_c.await; info!("Ctrl-C received, initiating graceful shutdown."); } } => {},
    }
}

/// Runs until a shutdown signal arrives, then drains the background tasks.
pub async fn run(mut ctx: RunningContext) {
    loop {
        tokio::select! {
            biased; // Prioritize shutdown signals over other events.

            _ = await_shutdown_signal() => {
                break;
            },

            // A supervisor that tears its pair down ends here; that alone is
            // not fatal for the rest of the service.
            Some(result) = ctx.background_tasks.join_next() => {
                match result {
                    Ok(()) => info!("A background task has completed."),
                    Err(join_error) => {
                        error!("Background task panicked: {join_error:?}.");
                    }
                }
                if ctx.background_tasks.is_empty() {
                    warn!("All background tasks have completed; shutting down.");
                    break;
                }
            },
        }
    }

    let _ = ctx.shutdown_tx.send(());
    let drain = async {
        while ctx.background_tasks.join_next().await.is_some() {}
    };
    if tokio::time::timeout(SHUTDOWN_GRACE, drain).await.is_err() {
        warn!("Background tasks did not drain in time; aborting the rest.");
        ctx.background_tasks.abort_all();
    }
    info!("Shutdown complete.");
}
