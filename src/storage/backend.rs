//! Storage backend trait definition
//!
//! This module defines the core `StorageBackend` trait that all
//! storage implementations must implement.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::error::StorageResult;
use super::schema::{EventRow, MonitorRecord, NotificationRecord, SampleRow, UptimeStats};

/// Query parameters for fetching samples within a time range
#[derive(Debug, Clone)]
pub struct QueryRange {
    /// Monitor to query
    pub monitor_id: String,

    /// Start of time range (inclusive)
    pub start: DateTime<Utc>,

    /// End of time range (inclusive)
    pub end: DateTime<Utc>,

    /// Maximum number of results to return (for pagination)
    pub limit: Option<usize>,
}

/// Health status of the storage backend
#[derive(Debug, Clone)]
pub struct HealthStatus {
    /// Is the backend operational?
    pub healthy: bool,

    /// Human-readable status message
    pub message: String,

    /// Additional backend-specific metadata
    pub metadata: HashMap<String, String>,
}

/// Trait for persistent storage backends
///
/// The engine treats storage as an external collaborator reachable by
/// primary key and range query. Every method is async so backends can do
/// real I/O, and implementations must be `Send + Sync` because every runner
/// task holds a shared reference.
///
/// ## Concurrency
///
/// Runners append samples and events for different monitors concurrently.
/// Backends must support that without cross-monitor locking on the caller's
/// side.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    // ========================================================================
    // Monitor configuration
    // ========================================================================

    /// Create or replace a monitor, including its attached notification ids
    async fn upsert_monitor(&self, monitor: &MonitorRecord) -> StorageResult<()>;

    async fn get_monitor(&self, id: &str) -> StorageResult<Option<MonitorRecord>>;

    /// List monitors, optionally restricted to one workspace
    async fn list_monitors(&self, workspace_id: Option<&str>) -> StorageResult<Vec<MonitorRecord>>;

    /// List every monitor flagged active (used at bootstrap)
    async fn list_active_monitors(&self) -> StorageResult<Vec<MonitorRecord>>;

    /// Delete a monitor together with its samples and events.
    ///
    /// Returns `false` if the monitor did not exist.
    async fn delete_monitor(&self, id: &str) -> StorageResult<bool>;

    // ========================================================================
    // Notification configuration
    // ========================================================================

    async fn upsert_notification(&self, notification: &NotificationRecord) -> StorageResult<()>;

    async fn get_notification(&self, id: &str) -> StorageResult<Option<NotificationRecord>>;

    async fn list_notifications(&self) -> StorageResult<Vec<NotificationRecord>>;

    /// Delete a notification and detach it from every monitor.
    ///
    /// Returns `false` if the notification did not exist.
    async fn delete_notification(&self, id: &str) -> StorageResult<bool>;

    // ========================================================================
    // Samples
    // ========================================================================

    /// Append one sample
    async fn insert_sample(&self, sample: &SampleRow) -> StorageResult<()>;

    /// Samples for a monitor between start and end, oldest first
    async fn query_samples(&self, query: QueryRange) -> StorageResult<Vec<SampleRow>>;

    /// The `limit` most recent samples for a monitor, oldest first
    async fn query_latest_samples(&self, monitor_id: &str, limit: usize) -> StorageResult<Vec<SampleRow>>;

    /// Aggregate the samples of a monitor created at or after `since`
    async fn calculate_uptime(&self, monitor_id: &str, since: DateTime<Utc>) -> StorageResult<UptimeStats>;

    /// Delete samples older than the specified timestamp.
    ///
    /// Returns the number of samples deleted.
    async fn cleanup_old_samples(&self, before: DateTime<Utc>) -> StorageResult<usize>;

    // ========================================================================
    // Events
    // ========================================================================

    /// Append one state transition
    async fn insert_event(&self, event: &EventRow) -> StorageResult<()>;

    /// Most recent events, newest first. `None` spans all monitors.
    async fn query_recent_events(&self, monitor_id: Option<&str>, limit: usize) -> StorageResult<Vec<EventRow>>;

    /// The last event recorded for a monitor
    async fn latest_event(&self, monitor_id: &str) -> StorageResult<Option<EventRow>>;

    // ========================================================================
    // Maintenance
    // ========================================================================

    /// Check backend health
    async fn health_check(&self) -> StorageResult<HealthStatus>;

    /// Close the backend and release resources
    async fn close(&self) -> StorageResult<()>;
}
