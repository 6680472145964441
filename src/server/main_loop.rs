// src/server/main_loop.rs

//! Waits for a shutdown trigger, then stops every task and flushes the write queue.

use super::context::ServerContext;
use anyhow::{Context, Result};
use std::time::Duration;
use tokio::signal::unix::{SignalKind, signal};
use tracing::{error, info, warn};

/// Runs until SIGINT, SIGTERM or a background task failure.
pub async fn run(mut ctx: ServerContext) -> Result<()> {
    let mut sigint = signal(SignalKind::interrupt()).context("Failed to register SIGINT handler")?;
    let mut sigterm =
        signal(SignalKind::terminate()).context("Failed to register SIGTERM handler")?;

    loop {
        tokio::select! {
            biased;

            _ = sigint.recv() => {
                info!("SIGINT received, initiating graceful shutdown.");
                break;
            }
            _ = sigterm.recv() => {
                info!("SIGTERM received, initiating graceful shutdown.");
                break;
            }

            Some(res) = ctx.background_tasks.join_next() => {
                match res {
                    Ok(Ok(())) => warn!("A background task finished unexpectedly without an error."),
                    Ok(Err(e)) => { error!("CRITICAL: Background task failed: {}. Shutting down.", e); break; }
                    Err(e) => { error!("CRITICAL: Background task panicked: {e:?}. Shutting down."); break; }
                }
            },
        }
    }

    info!("Shutting down. Sending signal to all tasks.");
    if ctx.shutdown_tx.send(()).is_err() {
        warn!("No task was listening for the shutdown signal.");
    }

    let drain_timeout = ctx.config.engine.shutdown_drain_timeout;
    let pending = ctx.engine.pending_jobs();
    if ctx.engine.is_draining() {
        info!(
            "Waiting up to {:?} for {} queued jobs to reach the remote store...",
            drain_timeout, pending
        );
    }
    if ctx.engine.flush(drain_timeout).await {
        info!("Write queue drained.");
    } else {
        warn!(
            "Write queue did not drain within {:?}. Abandoning {} queued jobs.",
            drain_timeout,
            ctx.engine.pending_jobs()
        );
    }

    info!("Waiting for background tasks to finish...");
    if tokio::time::timeout(Duration::from_secs(10), async {
        while ctx.background_tasks.join_next().await.is_some() {}
    })
    .await
    .is_err()
    {
        warn!("Timed out waiting for background tasks to finish cleanly.");
    };
    info!("Server shutdown complete.");
    Ok(())
}
