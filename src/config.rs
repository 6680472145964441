// src/config.rs

//! Manages process configuration: loading, resolving secrets, and validation.

use crate::core::model::CollectionSchema;
use crate::core::readiness::ReadinessPolicy;
use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::time::Duration;
use tracing::warn;

/// Whether update/delete requests whose key is absent in memory still queue a remote job.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum AbsentKeyWrites {
    #[default]
    Enqueue,
    Skip,
}

/// Operational parameters of the engine.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct EngineConfig {
    /// Pause after every replayed job.
    #[serde(with = "humantime_serde", default = "default_job_delay")]
    pub job_delay: Duration,
    /// Period of the bulk sync.
    #[serde(with = "humantime_serde", default = "default_sync_interval")]
    pub sync_interval: Duration,
    /// Delay before the single retry of a failed remote metadata load.
    #[serde(with = "humantime_serde", default = "default_metadata_retry_delay")]
    pub metadata_retry_delay: Duration,
    #[serde(default)]
    pub readiness: ReadinessPolicy,
    #[serde(default)]
    pub absent_key_writes: AbsentKeyWrites,
    /// How long API reads wait for readiness before giving up.
    #[serde(with = "humantime_serde", default = "default_ready_timeout")]
    pub ready_timeout: Duration,
    /// How long shutdown waits for queued jobs to reach the remote store.
    #[serde(with = "humantime_serde", default = "default_shutdown_drain_timeout")]
    pub shutdown_drain_timeout: Duration,
}

fn default_job_delay() -> Duration {
    Duration::from_millis(300)
}
fn default_sync_interval() -> Duration {
    Duration::from_secs(30)
}
fn default_metadata_retry_delay() -> Duration {
    Duration::from_secs(1)
}
fn default_ready_timeout() -> Duration {
    Duration::from_secs(10)
}
fn default_shutdown_drain_timeout() -> Duration {
    Duration::from_secs(30)
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            job_delay: default_job_delay(),
            sync_interval: default_sync_interval(),
            metadata_retry_delay: default_metadata_retry_delay(),
            readiness: ReadinessPolicy::default(),
            absent_key_writes: AbsentKeyWrites::default(),
            ready_timeout: default_ready_timeout(),
            shutdown_drain_timeout: default_shutdown_drain_timeout(),
        }
    }
}

/// Which remote store backs the engine.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum RemoteConfig {
    /// In-process grids. Nothing leaves the process.
    Memory,
    /// A spreadsheet reached over its REST API.
    Sheets {
        spreadsheet_id: String,
        #[serde(default = "default_base_url")]
        base_url: String,
        /// Name of the environment variable holding the bearer token.
        #[serde(default = "default_access_token_env")]
        access_token_env: String,
        #[serde(with = "humantime_serde", default = "default_request_timeout")]
        request_timeout: Duration,
    },
}

fn default_base_url() -> String {
    "https://sheets.googleapis.com".to_string()
}
fn default_access_token_env() -> String {
    "MIRRORSYNC_ACCESS_TOKEN".to_string()
}
fn default_request_timeout() -> Duration {
    Duration::from_secs(60)
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self::Memory
    }
}

impl RemoteConfig {
    /// Reads the bearer token from the configured environment variable, if set.
    pub fn resolve_access_token(&self) -> Option<String> {
        match self {
            RemoteConfig::Memory => None,
            RemoteConfig::Sheets {
                access_token_env, ..
            } => std::env::var(access_token_env)
                .ok()
                .filter(|t| !t.trim().is_empty()),
        }
    }
}

/// Configuration for the Prometheus metrics exporter.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct MetricsConfig {
    /// If true, an HTTP server will be started to expose Prometheus metrics.
    #[serde(default)]
    pub enabled: bool,
    /// The port for the Prometheus metrics server.
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

fn default_metrics_port() -> u16 {
    8878
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: default_metrics_port(),
        }
    }
}

/// A raw representation of the config file before validation.
#[derive(Deserialize)]
struct RawConfig {
    #[serde(default = "default_host")]
    host: String,
    #[serde(default = "default_port")]
    port: u16,
    #[serde(default = "default_log_level")]
    log_level: String,
    #[serde(default)]
    engine: EngineConfig,
    #[serde(default)]
    remote: RemoteConfig,
    #[serde(default = "default_collections")]
    collections: Vec<CollectionSchema>,
    #[serde(default)]
    metrics: MetricsConfig,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    5000
}
fn default_log_level() -> String {
    "info".to_string()
}

/// The four collections of the task-assignment deployment this engine was built for.
pub fn default_collections() -> Vec<CollectionSchema> {
    vec![
        CollectionSchema::new(
            "Users",
            "UserID",
            &[
                "UserID",
                "Name",
                "Role",
                "Subdivision",
                "Station",
                "Email",
                "AuthKey",
            ],
        ),
        CollectionSchema::new("Stations", "Subdivision", &["Subdivision", "Stations"]),
        CollectionSchema::new(
            "Tasks",
            "TaskID",
            &[
                "TaskID",
                "SheetLink",
                "SheetType",
                "AssignedTo",
                "Status",
                "Date",
                "TaskName",
                "DueDate",
                "AllowNil",
                "IsNil",
                "GroupName",
                "CompletedDate",
            ],
        ),
        CollectionSchema::new(
            "Groups",
            "GroupID",
            &["GroupID", "GroupName", "CreatedBy", "UserIDs"],
        ),
    ]
}

/// Represents the final, validated configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub engine: EngineConfig,
    pub remote: RemoteConfig,
    pub collections: Vec<CollectionSchema>,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            log_level: default_log_level(),
            engine: EngineConfig::default(),
            remote: RemoteConfig::default(),
            collections: default_collections(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Config {
    /// Creates a new `Config` instance by reading and parsing a TOML file.
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file at '{path}'"))?;
        Self::from_toml_str(&contents).with_context(|| format!("Invalid config in '{path}'"))
    }

    /// Parses and validates configuration from TOML text.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let raw_config: RawConfig =
            toml::from_str(contents).context("Failed to parse TOML configuration")?;

        let config = Config {
            host: raw_config.host,
            port: raw_config.port,
            log_level: raw_config.log_level,
            engine: raw_config.engine,
            remote: raw_config.remote,
            collections: raw_config.collections,
            metrics: raw_config.metrics,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration to ensure logical consistency.
    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            return Err(anyhow!("port cannot be 0"));
        }
        if self.host.trim().is_empty() {
            return Err(anyhow!("host cannot be empty"));
        }
        if self.engine.sync_interval.is_zero() {
            return Err(anyhow!("engine.sync_interval must be greater than 0"));
        }
        if self.engine.job_delay.is_zero() {
            warn!(
                "engine.job_delay is 0. Jobs will be replayed back to back, which may trip remote rate limits."
            );
        }

        self.validate_collections()?;

        if let RemoteConfig::Sheets {
            spreadsheet_id,
            base_url,
            ..
        } = &self.remote
        {
            if spreadsheet_id.trim().is_empty() {
                return Err(anyhow!("remote.spreadsheet_id cannot be empty"));
            }
            let parsed = url::Url::parse(base_url)
                .with_context(|| format!("remote.base_url '{base_url}' is not a valid URL"))?;
            if parsed.scheme() != "http" && parsed.scheme() != "https" {
                return Err(anyhow!(
                    "remote.base_url must use http or https, got '{}'",
                    parsed.scheme()
                ));
            }
        }

        if self.metrics.enabled {
            if self.metrics.port == 0 {
                return Err(anyhow!("metrics.port cannot be 0"));
            }
            if self.metrics.port == self.port {
                return Err(anyhow!(
                    "metrics.port cannot be the same as the main server port"
                ));
            }
        }
        Ok(())
    }

    fn validate_collections(&self) -> Result<()> {
        if self.collections.is_empty() {
            return Err(anyhow!("at least one collection must be declared"));
        }

        // Remote lookup is case-insensitive, so names must be unique that way too.
        let mut seen_names = HashSet::new();
        for (i, schema) in self.collections.iter().enumerate() {
            let name = schema.name.trim();
            if name.is_empty() {
                return Err(anyhow!("collection #{} has an empty name", i + 1));
            }
            if !seen_names.insert(name.to_lowercase()) {
                return Err(anyhow!("collection '{}' is declared more than once", name));
            }
            if schema.headers.is_empty() {
                return Err(anyhow!("collection '{}' declares no headers", name));
            }
            let mut seen_headers = HashSet::new();
            for header in &schema.headers {
                if header.trim().is_empty() {
                    return Err(anyhow!("collection '{}' has an empty header", name));
                }
                if !seen_headers.insert(header.as_str()) {
                    return Err(anyhow!(
                        "collection '{}' declares header '{}' more than once",
                        name,
                        header
                    ));
                }
            }
            if !schema.headers.contains(&schema.key_field) {
                return Err(anyhow!(
                    "collection '{}': key_field '{}' is not one of its headers",
                    name,
                    schema.key_field
                ));
            }
        }
        Ok(())
    }
}
