//! Helper types and functions for integration tests

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::json;
use uptime_monitor::notifications::{ChannelProvider, ChannelRegistry, NotificationDispatcher, NotificationMessage, SenderError};
use uptime_monitor::probes::{Probe, ProbeError, ProbeRegistry};
use uptime_monitor::storage::memory::MemoryBackend;
use uptime_monitor::storage::{
    EventRow, HealthStatus, MonitorRecord, NotificationRecord, QueryRange, SampleRow, StorageBackend, StorageError,
    StorageResult, UptimeStats,
};
use uptime_monitor::{EventBus, MonitorManager, MonitorUpsert, NotificationUpsert, RunnerContext};

pub const WORKSPACE: &str = "ws1";

/// One scripted probe invocation
#[derive(Debug, Clone, Copy)]
pub enum Step {
    Value(i64),
    Fail,
    Panic,
    Hang,
}

/// Probe that plays back a script, then keeps returning `fallback`
pub struct ScriptedProbe {
    steps: Mutex<VecDeque<Step>>,
    fallback: i64,
    calls: AtomicUsize,
}

impl ScriptedProbe {
    pub fn new(steps: impl IntoIterator<Item = Step>, fallback: i64) -> Self {
        Self {
            steps: Mutex::new(steps.into_iter().collect()),
            fallback,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Probe for ScriptedProbe {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn validate(&self, payload: &serde_json::Value) -> Result<(), ProbeError> {
        if payload.get("invalid").is_some() {
            return Err(ProbeError::Config("scripted payload rejected".to_string()));
        }
        Ok(())
    }

    async fn run(&self, _monitor: &MonitorRecord) -> Result<i64, ProbeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let step = self.steps.lock().unwrap().pop_front();

        match step {
            Some(Step::Value(value)) => Ok(value),
            Some(Step::Fail) => Err(ProbeError::Network("connection refused".to_string())),
            Some(Step::Panic) => panic!("scripted probe panicked"),
            Some(Step::Hang) => {
                std::future::pending::<()>().await;
                unreachable!()
            }
            None => Ok(self.fallback),
        }
    }
}

/// Channel that records every attempt and fails when asked to
#[derive(Default)]
pub struct RecordingChannel {
    attempts: Mutex<Vec<String>>,
    delivered: Mutex<Vec<(String, String)>>,
}

impl RecordingChannel {
    pub fn attempts(&self) -> Vec<String> {
        let mut attempts = self.attempts.lock().unwrap().clone();
        attempts.sort();
        attempts
    }

    /// (notification id, title) pairs, sorted by id
    pub fn delivered(&self) -> Vec<(String, String)> {
        let mut delivered = self.delivered.lock().unwrap().clone();
        delivered.sort();
        delivered
    }
}

#[async_trait]
impl ChannelProvider for RecordingChannel {
    fn name(&self) -> &'static str {
        "recording"
    }

    fn validate(&self, payload: &serde_json::Value) -> Result<(), SenderError> {
        if !payload.is_object() {
            return Err(SenderError::InvalidConfiguration("payload must be an object".to_string()));
        }
        Ok(())
    }

    async fn send(&self, notification: &NotificationRecord, message: &NotificationMessage) -> Result<(), SenderError> {
        self.attempts.lock().unwrap().push(notification.id.clone());
        if notification.payload.get("fail").is_some() {
            return Err(SenderError::SendFailed("channel offline".to_string()));
        }
        self.delivered
            .lock()
            .unwrap()
            .push((notification.id.clone(), message.title.clone()));
        Ok(())
    }
}

/// In-memory store whose event writes can be made to fail
#[derive(Default)]
pub struct FlakyStore {
    inner: MemoryBackend,
    fail_events: AtomicBool,
}

impl FlakyStore {
    pub fn fail_events(&self, fail: bool) {
        self.fail_events.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl StorageBackend for FlakyStore {
    async fn upsert_monitor(&self, monitor: &MonitorRecord) -> StorageResult<()> {
        self.inner.upsert_monitor(monitor).await
    }

    async fn get_monitor(&self, id: &str) -> StorageResult<Option<MonitorRecord>> {
        self.inner.get_monitor(id).await
    }

    async fn list_monitors(&self, workspace_id: Option<&str>) -> StorageResult<Vec<MonitorRecord>> {
        self.inner.list_monitors(workspace_id).await
    }

    async fn list_active_monitors(&self) -> StorageResult<Vec<MonitorRecord>> {
        self.inner.list_active_monitors().await
    }

    async fn delete_monitor(&self, id: &str) -> StorageResult<bool> {
        self.inner.delete_monitor(id).await
    }

    async fn upsert_notification(&self, notification: &NotificationRecord) -> StorageResult<()> {
        self.inner.upsert_notification(notification).await
    }

    async fn get_notification(&self, id: &str) -> StorageResult<Option<NotificationRecord>> {
        self.inner.get_notification(id).await
    }

    async fn list_notifications(&self) -> StorageResult<Vec<NotificationRecord>> {
        self.inner.list_notifications().await
    }

    async fn delete_notification(&self, id: &str) -> StorageResult<bool> {
        self.inner.delete_notification(id).await
    }

    async fn insert_sample(&self, sample: &SampleRow) -> StorageResult<()> {
        self.inner.insert_sample(sample).await
    }

    async fn query_samples(&self, query: QueryRange) -> StorageResult<Vec<SampleRow>> {
        self.inner.query_samples(query).await
    }

    async fn query_latest_samples(&self, monitor_id: &str, limit: usize) -> StorageResult<Vec<SampleRow>> {
        self.inner.query_latest_samples(monitor_id, limit).await
    }

    async fn calculate_uptime(&self, monitor_id: &str, since: DateTime<Utc>) -> StorageResult<UptimeStats> {
        self.inner.calculate_uptime(monitor_id, since).await
    }

    async fn cleanup_old_samples(&self, before: DateTime<Utc>) -> StorageResult<usize> {
        self.inner.cleanup_old_samples(before).await
    }

    async fn insert_event(&self, event: &EventRow) -> StorageResult<()> {
        if self.fail_events.load(Ordering::SeqCst) {
            return Err(StorageError::QueryFailed("event table unavailable".to_string()));
        }
        self.inner.insert_event(event).await
    }

    async fn query_recent_events(&self, monitor_id: Option<&str>, limit: usize) -> StorageResult<Vec<EventRow>> {
        self.inner.query_recent_events(monitor_id, limit).await
    }

    async fn latest_event(&self, monitor_id: &str) -> StorageResult<Option<EventRow>> {
        self.inner.latest_event(monitor_id).await
    }

    async fn health_check(&self) -> StorageResult<HealthStatus> {
        self.inner.health_check().await
    }

    async fn close(&self) -> StorageResult<()> {
        self.inner.close().await
    }
}

/// A manager wired to a scripted probe and a recording channel
pub struct Harness {
    pub store: Arc<FlakyStore>,
    pub probe: Arc<ScriptedProbe>,
    pub channel: Arc<RecordingChannel>,
    pub bus: EventBus,
    pub manager: MonitorManager,
}

impl Harness {
    pub fn new(steps: impl IntoIterator<Item = Step>, fallback: i64) -> Self {
        Self::with_store(Arc::new(FlakyStore::default()), steps, fallback)
    }

    pub fn with_store(store: Arc<FlakyStore>, steps: impl IntoIterator<Item = Step>, fallback: i64) -> Self {
        let probe = Arc::new(ScriptedProbe::new(steps, fallback));
        let channel = Arc::new(RecordingChannel::default());

        let mut probes = ProbeRegistry::with_defaults();
        probes.register(probe.clone());

        let mut channels = ChannelRegistry::with_defaults();
        channels.register(channel.clone());

        let bus = EventBus::default();
        let ctx = RunnerContext::new(
            store.clone(),
            NotificationDispatcher::new(Arc::new(channels)),
            bus.clone(),
        )
        .with_probe_deadline(Duration::from_secs(10));

        Self {
            store,
            probe,
            channel,
            bus,
            manager: MonitorManager::new(ctx, Arc::new(probes)),
        }
    }

    pub async fn sample_values(&self, monitor_id: &str) -> Vec<i64> {
        self.store
            .query_latest_samples(monitor_id, 1000)
            .await
            .unwrap()
            .into_iter()
            .map(|sample| sample.value)
            .collect()
    }

    /// Event kinds oldest first, as `UP`/`DOWN` strings
    pub async fn event_kinds(&self, monitor_id: &str) -> Vec<String> {
        let mut events = self.store.query_recent_events(Some(monitor_id), 1000).await.unwrap();
        events.reverse();
        events.into_iter().map(|event| event.kind.to_string()).collect()
    }
}

pub fn scripted_monitor(id: &str, name: &str, interval_secs: u64) -> MonitorUpsert {
    let mut request = MonitorUpsert::new(WORKSPACE, name, "scripted", json!({}));
    request.id = Some(id.to_string());
    request.interval_secs = interval_secs;
    request
}

pub fn recording_notification(id: &str, fail: bool) -> NotificationUpsert {
    let payload = if fail { json!({ "fail": true }) } else { json!({}) };
    NotificationUpsert {
        id: Some(id.to_string()),
        name: format!("channel {id}"),
        channel_type: "recording".to_string(),
        payload,
    }
}

/// Let the paused clock run forward
pub async fn advance(secs: u64) {
    tokio::time::sleep(Duration::from_secs(secs)).await;
}
