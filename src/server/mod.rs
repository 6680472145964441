// src/server/mod.rs

use crate::config::Config;
use anyhow::Result;

pub mod api;
mod context;
pub mod initialization;
mod main_loop;
mod metrics_server;
mod spawner;

/// The main server startup function, orchestrating all setup phases.
pub async fn run(config: Config) -> Result<()> {
    // 1. Build the engine and bind the API listener.
    let mut server_context = initialization::setup(config).await?;

    // 2. Spawn the sync scheduler, the API server and the metrics server.
    spawner::spawn_all(&mut server_context).await?;

    // 3. Block until shutdown, then drain the write queue.
    main_loop::run(server_context).await
}
