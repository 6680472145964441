// src/server/spawner.rs

//! Spawns all of the server's long-running background tasks.

use super::context::ServerContext;
use super::{api, metrics_server};
use crate::core::tasks::sync_scheduler::SyncScheduler;
use anyhow::{Result, anyhow};
use tracing::info;

/// Spawns all critical background tasks into the provided JoinSet.
pub async fn spawn_all(ctx: &mut ServerContext) -> Result<()> {
    let config = ctx.config.clone();
    let shutdown_tx = &ctx.shutdown_tx;
    let background_tasks = &mut ctx.background_tasks;

    // --- Metrics Server ---
    if config.metrics.enabled {
        let engine = ctx.engine.clone();
        let port = config.metrics.port;
        let shutdown_rx_metrics = shutdown_tx.subscribe();
        background_tasks.spawn(async move {
            metrics_server::run_metrics_server(engine, port, shutdown_rx_metrics).await
        });
    } else {
        info!("Prometheus metrics server is disabled in the configuration.");
    }

    // --- Periodic Sync ---
    let scheduler = SyncScheduler::new(ctx.engine.clone(), config.engine.sync_interval);
    let shutdown_rx_sync = shutdown_tx.subscribe();
    background_tasks.spawn(async move {
        scheduler.run(shutdown_rx_sync).await;
        Ok(())
    });

    // --- API Server ---
    let listener = ctx
        .listener
        .take()
        .ok_or_else(|| anyhow!("API listener was already taken"))?;
    let app = api::router(ctx.engine.clone(), config.engine.ready_timeout);
    let mut shutdown_rx_api = shutdown_tx.subscribe();
    background_tasks.spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                shutdown_rx_api.recv().await.ok();
                info!("API server shutting down.");
            })
            .await?;
        Ok(())
    });

    info!("All background tasks have been spawned.");
    Ok(())
}
