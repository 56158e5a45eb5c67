use std::path::PathBuf;

use serde::Deserialize;
use tracing::trace;

use crate::actors::manager::{DEFAULT_MIN_INTERVAL_SECS, MonitorUpsert, NotificationUpsert};

/// Storage backend configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StorageConfig {
    /// In-memory storage (no persistence)
    #[serde(rename = "none")]
    None,

    /// SQLite database (default for most deployments)
    Sqlite {
        /// Path to the SQLite database file
        #[serde(default = "default_sqlite_path")]
        path: PathBuf,

        /// Retention period in days (samples older than this are deleted)
        #[serde(default = "default_retention_days")]
        retention_days: u32,
    },
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig::Sqlite {
            path: default_sqlite_path(),
            retention_days: default_retention_days(),
        }
    }
}

fn default_sqlite_path() -> PathBuf {
    PathBuf::from("./uptime.db")
}

fn default_retention_days() -> u32 {
    30
}

#[derive(Debug, Clone, Deserialize)]
pub struct RunnerConfig {
    /// Hard upper bound for a single probe, on top of the probe's own timeout
    #[serde(default = "default_probe_deadline")]
    pub probe_deadline_secs: u64,

    /// Smallest accepted monitor interval
    #[serde(default = "default_min_interval")]
    pub min_interval_secs: u64,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            probe_deadline_secs: default_probe_deadline(),
            min_interval_secs: default_min_interval(),
        }
    }
}

fn default_probe_deadline() -> u64 {
    60
}

fn default_min_interval() -> u64 {
    DEFAULT_MIN_INTERVAL_SECS
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventBusConfig {
    #[serde(default = "default_bus_capacity")]
    pub capacity: usize,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            capacity: default_bus_capacity(),
        }
    }
}

fn default_bus_capacity() -> usize {
    crate::event_bus::DEFAULT_CAPACITY
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Storage configuration (defaults to SQLite)
    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub runner: RunnerConfig,

    #[serde(default)]
    pub event_bus: EventBusConfig,

    /// Notifications created or updated at startup
    #[serde(default)]
    pub notifications: Vec<NotificationUpsert>,

    /// Monitors created or updated at startup
    #[serde(default)]
    pub monitors: Vec<MonitorUpsert>,
}

pub fn parse_config(content: &str) -> anyhow::Result<Config> {
    serde_json::from_str(content)
        .map_err(|e| anyhow::anyhow!("Invalid configuration file provided: {e}"))
        .inspect(|config| trace!("loaded config: {config:?}"))
}

pub fn read_config_file(path: &str) -> anyhow::Result<Config> {
    let file_content = std::fs::read_to_string(path)?;
    parse_config(&file_content)
}
