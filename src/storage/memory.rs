//! In-memory storage backend (no persistence)
//!
//! This backend keeps everything in process memory.
//! It's useful for:
//! - Testing without database dependencies
//! - Ephemeral deployments (`"backend": "none"`)
//!
//! ## Limitations
//!
//! - **No persistence**: All data lost on restart
//! - **Bounded samples**: Each monitor keeps at most `MAX_SAMPLES_PER_MONITOR`
//!   samples; the oldest are evicted first

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::debug;

use super::backend::{HealthStatus, QueryRange, StorageBackend};
use super::error::StorageResult;
use super::schema::{EventRow, MonitorRecord, NotificationRecord, SampleRow, UptimeStats};

/// Maximum samples to keep in memory per monitor
const MAX_SAMPLES_PER_MONITOR: usize = 50_000;

#[derive(Default)]
struct Inner {
    monitors: HashMap<String, MonitorRecord>,
    notifications: HashMap<String, NotificationRecord>,
    samples: HashMap<String, VecDeque<SampleRow>>,
    events: Vec<EventRow>,
}

/// In-memory storage backend
#[derive(Default)]
pub struct MemoryBackend {
    inner: RwLock<Inner>,
}

impl MemoryBackend {
    /// Create a new in-memory backend
    pub fn new() -> Self {
        Self::default()
    }
}

fn sorted_monitors<'a>(monitors: impl Iterator<Item = &'a MonitorRecord>) -> Vec<MonitorRecord> {
    let mut list: Vec<MonitorRecord> = monitors.cloned().collect();
    list.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
    list
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn upsert_monitor(&self, monitor: &MonitorRecord) -> StorageResult<()> {
        let mut inner = self.inner.write().await;
        inner.monitors.insert(monitor.id.clone(), monitor.clone());
        Ok(())
    }

    async fn get_monitor(&self, id: &str) -> StorageResult<Option<MonitorRecord>> {
        Ok(self.inner.read().await.monitors.get(id).cloned())
    }

    async fn list_monitors(&self, workspace_id: Option<&str>) -> StorageResult<Vec<MonitorRecord>> {
        let inner = self.inner.read().await;
        Ok(sorted_monitors(
            inner
                .monitors
                .values()
                .filter(|m| workspace_id.is_none_or(|ws| m.workspace_id == ws)),
        ))
    }

    async fn list_active_monitors(&self) -> StorageResult<Vec<MonitorRecord>> {
        let inner = self.inner.read().await;
        Ok(sorted_monitors(inner.monitors.values().filter(|m| m.active)))
    }

    async fn delete_monitor(&self, id: &str) -> StorageResult<bool> {
        let mut inner = self.inner.write().await;
        let existed = inner.monitors.remove(id).is_some();
        inner.samples.remove(id);
        inner.events.retain(|e| e.monitor_id != id);
        Ok(existed)
    }

    async fn upsert_notification(&self, notification: &NotificationRecord) -> StorageResult<()> {
        let mut inner = self.inner.write().await;
        inner
            .notifications
            .insert(notification.id.clone(), notification.clone());
        Ok(())
    }

    async fn get_notification(&self, id: &str) -> StorageResult<Option<NotificationRecord>> {
        Ok(self.inner.read().await.notifications.get(id).cloned())
    }

    async fn list_notifications(&self) -> StorageResult<Vec<NotificationRecord>> {
        let inner = self.inner.read().await;
        let mut list: Vec<NotificationRecord> = inner.notifications.values().cloned().collect();
        list.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        Ok(list)
    }

    async fn delete_notification(&self, id: &str) -> StorageResult<bool> {
        let mut inner = self.inner.write().await;
        let existed = inner.notifications.remove(id).is_some();
        for monitor in inner.monitors.values_mut() {
            monitor.notification_ids.retain(|n| n != id);
        }
        Ok(existed)
    }

    async fn insert_sample(&self, sample: &SampleRow) -> StorageResult<()> {
        let mut inner = self.inner.write().await;
        let deque = inner.samples.entry(sample.monitor_id.clone()).or_default();
        if deque.len() >= MAX_SAMPLES_PER_MONITOR {
            deque.pop_front();
        }
        deque.push_back(sample.clone());
        Ok(())
    }

    async fn query_samples(&self, query: QueryRange) -> StorageResult<Vec<SampleRow>> {
        debug!("querying in-memory samples for {}", query.monitor_id);

        let inner = self.inner.read().await;
        let samples: Vec<SampleRow> = inner
            .samples
            .get(&query.monitor_id)
            .map(|deque| {
                deque
                    .iter()
                    .filter(|s| s.created_at >= query.start && s.created_at <= query.end)
                    .take(query.limit.unwrap_or(usize::MAX))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        Ok(samples)
    }

    async fn query_latest_samples(&self, monitor_id: &str, limit: usize) -> StorageResult<Vec<SampleRow>> {
        let inner = self.inner.read().await;
        let mut samples: Vec<SampleRow> = inner
            .samples
            .get(monitor_id)
            .map(|deque| deque.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default();
        samples.reverse();
        Ok(samples)
    }

    async fn calculate_uptime(&self, monitor_id: &str, since: DateTime<Utc>) -> StorageResult<UptimeStats> {
        let inner = self.inner.read().await;
        let stats = inner
            .samples
            .get(monitor_id)
            .map(|deque| {
                UptimeStats::from_values(
                    deque
                        .iter()
                        .filter(|s| s.created_at >= since)
                        .map(|s| s.value),
                )
            })
            .unwrap_or_else(UptimeStats::empty);
        Ok(stats)
    }

    async fn cleanup_old_samples(&self, before: DateTime<Utc>) -> StorageResult<usize> {
        let mut inner = self.inner.write().await;
        let mut deleted = 0;
        for deque in inner.samples.values_mut() {
            let len = deque.len();
            deque.retain(|s| s.created_at >= before);
            deleted += len - deque.len();
        }
        Ok(deleted)
    }

    async fn insert_event(&self, event: &EventRow) -> StorageResult<()> {
        self.inner.write().await.events.push(event.clone());
        Ok(())
    }

    async fn query_recent_events(&self, monitor_id: Option<&str>, limit: usize) -> StorageResult<Vec<EventRow>> {
        let inner = self.inner.read().await;
        Ok(inner
            .events
            .iter()
            .rev()
            .filter(|e| monitor_id.is_none_or(|id| e.monitor_id == id))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn latest_event(&self, monitor_id: &str) -> StorageResult<Option<EventRow>> {
        let inner = self.inner.read().await;
        Ok(inner
            .events
            .iter()
            .rev()
            .find(|e| e.monitor_id == monitor_id)
            .cloned())
    }

    async fn health_check(&self) -> StorageResult<HealthStatus> {
        let inner = self.inner.read().await;
        let sample_count: usize = inner.samples.values().map(VecDeque::len).sum();
        Ok(HealthStatus {
            healthy: true,
            message: "In-memory storage operational".to_string(),
            metadata: HashMap::from([
                ("backend".to_string(), "memory".to_string()),
                ("monitors".to_string(), inner.monitors.len().to_string()),
                ("samples".to_string(), sample_count.to_string()),
            ]),
        })
    }

    async fn close(&self) -> StorageResult<()> {
        debug!("closing in-memory backend (no-op)");
        Ok(())
    }
}
