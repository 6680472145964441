// src/server/initialization.rs

//! Builds the engine and binds the API listener before any task is spawned.

use super::context::ServerContext;
use crate::config::{Config, RemoteConfig};
use crate::core::Engine;
use crate::core::model::CollectionSchema;
use crate::core::remote::{MemoryBackend, SheetBackend, SheetsBackend};
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tracing::{info, warn};

/// Initializes all server components before starting the main loop.
pub async fn setup(config: Config) -> Result<ServerContext> {
    log_startup_info(&config);
    let (shutdown_tx, _) = broadcast::channel(1);

    let backend = build_backend(&config.remote, &config.collections)?;
    let engine = Engine::new(&config.engine, config.collections.clone(), backend);
    info!(
        "Engine initialized with {} collections.",
        engine.schemas().len()
    );

    let listener = TcpListener::bind((config.host.as_str(), config.port))
        .await
        .with_context(|| format!("Failed to bind {}:{}", config.host, config.port))?;
    info!("mirrorsync listening on {}:{}", config.host, config.port);

    Ok(ServerContext {
        config: Arc::new(config),
        engine,
        listener: Some(listener),
        shutdown_tx,
        background_tasks: JoinSet::new(),
    })
}

/// Creates the remote backend selected by the configuration.
///
/// The in-memory backend starts with a header-only sheet per declared
/// collection, so the first bulk read has something to read.
pub fn build_backend(
    remote: &RemoteConfig,
    collections: &[CollectionSchema],
) -> Result<Arc<dyn SheetBackend>> {
    match remote {
        RemoteConfig::Memory => {
            warn!("Using the in-memory remote backend. Writes will not leave this process.");
            let backend = MemoryBackend::new();
            for schema in collections {
                backend.seed(&schema.name, vec![schema.headers.clone()]);
            }
            Ok(Arc::new(backend))
        }
        RemoteConfig::Sheets {
            spreadsheet_id,
            base_url,
            access_token_env,
            request_timeout,
        } => {
            let token = remote.resolve_access_token();
            if token.is_none() {
                warn!(
                    "No access token found in ${}. Requests will be sent unauthenticated.",
                    access_token_env
                );
            }
            let backend = SheetsBackend::new(base_url, spreadsheet_id, token, *request_timeout)
                .context("Failed to build the HTTP client for the remote store")?;
            info!("Remote store: spreadsheet {} at {}", spreadsheet_id, base_url);
            Ok(Arc::new(backend))
        }
    }
}

/// Logs key configuration parameters at startup.
fn log_startup_info(config: &Config) {
    let engine = &config.engine;
    info!(
        "Write-behind job delay {:?}, sync interval {:?}.",
        engine.job_delay, engine.sync_interval
    );
    info!(
        "Readiness policy: {:?}. Absent-key writes: {:?}.",
        engine.readiness, engine.absent_key_writes
    );
}
