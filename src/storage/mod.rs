//! Storage backends for monitor configuration, samples and events
//!
//! ## Design
//!
//! - **Trait-based**: `StorageBackend` trait allows swapping implementations
//! - **Async**: All operations are async so runner tasks can share one store
//! - **Append-only history**: samples and events are never updated
//!
//! ## Backends
//!
//! - **SQLite** (default): Embedded database
//! - **In-Memory**: No persistence, for testing or ephemeral runs
//!
//! ## Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use uptime_monitor::storage::{StorageBackend, sqlite::SqliteBackend};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let backend: Arc<dyn StorageBackend> = Arc::new(SqliteBackend::new("./uptime.db").await?);
//!     let monitors = backend.list_active_monitors().await?;
//!     println!("{} active monitors", monitors.len());
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod error;
pub mod memory;
pub mod retention;
pub mod schema;
#[cfg(feature = "storage-sqlite")]
pub mod sqlite;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

pub use backend::{HealthStatus, QueryRange, StorageBackend};
pub use error::{StorageError, StorageResult};
pub use schema::{EventRow, MonitorRecord, MonitorStatus, NotificationRecord, SampleRow, UptimeStats};

/// Dashboard aggregates for one monitor
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonitorSummary {
    /// Mean sample value over the last day, `-1.0` without samples
    pub recent_average: f64,
    pub recent_online: u64,
    pub recent_offline: u64,
    pub total_online: u64,
    pub total_offline: u64,
}

impl MonitorSummary {
    /// Aggregate the last day and the last 30 days of samples
    pub async fn collect(store: &dyn StorageBackend, monitor_id: &str, now: DateTime<Utc>) -> StorageResult<Self> {
        let day = store.calculate_uptime(monitor_id, now - Duration::days(1)).await?;
        let month = store.calculate_uptime(monitor_id, now - Duration::days(30)).await?;

        Ok(Self {
            recent_average: day.average_value,
            recent_online: day.up_count,
            recent_offline: day.down_count,
            total_online: month.up_count,
            total_offline: month.down_count,
        })
    }
}
