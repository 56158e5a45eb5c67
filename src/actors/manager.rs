//! MonitorManager - Owns every runner in the process
//!
//! The manager is the only place runners are created or stopped. Its registry
//! maps monitor id to a slot holding the [`MonitorRunner`]. The map lock is
//! only held to look a slot up; every mutation of a monitor then goes through
//! that monitor's own slot lock, so stopping a slow runner never blocks
//! operations on other monitors.
//!
//! Configuration errors (unknown probe or channel type, bad interval, missing
//! notification) are returned to the caller before anything is written.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};

use super::runner::{MonitorRunner, RunnerContext};
use super::status::Outcome;
use crate::event_bus::EventBus;
use crate::notifications::SenderError;
use crate::probes::{ProbeError, ProbeRegistry};
use crate::storage::{MonitorRecord, MonitorStatus, NotificationRecord, StorageBackend, StorageError};

/// Default interval for new monitors
pub const DEFAULT_INTERVAL_SECS: u64 = 20;

/// Default lower bound for monitor intervals
pub const DEFAULT_MIN_INTERVAL_SECS: u64 = 1;

/// Upper bound for monitor intervals, one day
pub const MAX_INTERVAL_SECS: u64 = 24 * 60 * 60;

#[derive(Debug, Error)]
pub enum ManagerError {
    #[error("invalid monitor configuration: {0}")]
    InvalidConfig(String),

    #[error("unknown probe type: {0}")]
    UnknownProbeType(String),

    #[error("invalid probe payload: {0}")]
    InvalidProbePayload(#[from] ProbeError),

    #[error("unknown notification: {0}")]
    UnknownNotification(String),

    #[error("unknown channel type: {0}")]
    UnknownChannelType(String),

    #[error("invalid notification payload: {0}")]
    InvalidNotificationPayload(#[from] SenderError),

    #[error("monitor not found: {0}")]
    NotFound(String),

    #[error("monitor {0} is not running")]
    NotRunning(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

pub type ManagerResult<T> = Result<T, ManagerError>;

fn default_true() -> bool {
    true
}

fn default_interval() -> u64 {
    DEFAULT_INTERVAL_SECS
}

fn empty_payload() -> serde_json::Value {
    serde_json::json!({})
}

/// Create-or-update request for a monitor
#[derive(Debug, Clone, Deserialize)]
pub struct MonitorUpsert {
    /// Existing id to update; a new UUID is generated when absent
    pub id: Option<String>,
    pub workspace_id: String,
    pub name: String,
    pub probe_type: String,

    #[serde(default = "default_true")]
    pub active: bool,

    #[serde(default = "default_interval")]
    pub interval_secs: u64,

    #[serde(default)]
    pub notification_ids: Vec<String>,

    #[serde(default = "empty_payload")]
    pub payload: serde_json::Value,
}

impl MonitorUpsert {
    /// Request with the default interval, active, no notifications
    pub fn new(
        workspace_id: impl Into<String>,
        name: impl Into<String>,
        probe_type: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            id: None,
            workspace_id: workspace_id.into(),
            name: name.into(),
            probe_type: probe_type.into(),
            active: true,
            interval_secs: DEFAULT_INTERVAL_SECS,
            notification_ids: Vec::new(),
            payload,
        }
    }
}

/// Create-or-update request for a notification
#[derive(Debug, Clone, Deserialize)]
pub struct NotificationUpsert {
    pub id: Option<String>,
    pub name: String,
    pub channel_type: String,

    #[serde(default = "empty_payload")]
    pub payload: serde_json::Value,
}

/// Registry entry for one monitor id
///
/// The slot lock is held across stop/start, so two concurrent upserts of the
/// same monitor can never leave two loops behind. Other ids are unaffected.
type RunnerSlot = Arc<Mutex<Option<MonitorRunner>>>;

pub struct MonitorManager {
    ctx: RunnerContext,
    probes: Arc<ProbeRegistry>,
    min_interval_secs: u64,
    runners: Mutex<HashMap<String, RunnerSlot>>,
}

impl MonitorManager {
    pub fn new(ctx: RunnerContext, probes: Arc<ProbeRegistry>) -> Self {
        Self {
            ctx,
            probes,
            min_interval_secs: DEFAULT_MIN_INTERVAL_SECS,
            runners: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_min_interval(mut self, min_interval_secs: u64) -> Self {
        self.min_interval_secs = min_interval_secs.clamp(1, MAX_INTERVAL_SECS);
        self
    }

    pub fn store(&self) -> &Arc<dyn StorageBackend> {
        &self.ctx.store
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.ctx.event_bus
    }

    /// Start a runner for every monitor flagged active.
    ///
    /// A monitor that fails to start is logged and skipped. Returns the
    /// number of runners started.
    #[instrument(skip(self))]
    pub async fn bootstrap(&self) -> ManagerResult<usize> {
        let monitors = self.ctx.store.list_active_monitors().await?;
        info!("bootstrapping {} active monitors", monitors.len());

        let mut started = 0;

        for monitor in monitors {
            let id = monitor.id.clone();
            let slot = self.slot(&id).await;
            let mut current = slot.lock().await;

            if current.as_ref().is_some_and(MonitorRunner::is_running) {
                debug!("monitor {} already running", id);
                continue;
            }

            match self.create_runner(monitor).await {
                Ok(mut runner) => {
                    runner.start();
                    *current = Some(runner);
                    started += 1;
                }
                Err(e) => {
                    error!("failed to start monitor {}: {}", id, e);
                    drop(current);
                    self.release_slot(&id, &slot).await;
                }
            }
        }

        Ok(started)
    }

    /// Validate, persist and (re)start a monitor
    #[instrument(skip(self, request), fields(monitor = %request.name))]
    pub async fn upsert_monitor(&self, request: MonitorUpsert) -> ManagerResult<MonitorRecord> {
        self.validate_monitor(&request)?;

        let id = request
            .id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let slot = self.slot(&id).await;
        let mut current = slot.lock().await;
        let result = self.apply_monitor(&mut current, id.clone(), request).await;
        drop(current);

        self.release_slot(&id, &slot).await;
        result
    }

    /// Persist the monitor and bring its runner in line, with the slot locked
    async fn apply_monitor(
        &self,
        current: &mut Option<MonitorRunner>,
        id: String,
        request: MonitorUpsert,
    ) -> ManagerResult<MonitorRecord> {
        let notifications = self.load_notifications(&request.notification_ids).await?;

        let now = Utc::now();
        let created_at = match self.ctx.store.get_monitor(&id).await? {
            Some(existing) => existing.created_at,
            None => now,
        };

        let record = MonitorRecord {
            id: id.clone(),
            workspace_id: request.workspace_id,
            name: request.name.trim().to_string(),
            probe_type: request.probe_type,
            active: request.active,
            interval_secs: request.interval_secs,
            payload: request.payload,
            notification_ids: request.notification_ids,
            created_at,
            updated_at: now,
        };

        self.ctx.store.upsert_monitor(&record).await?;

        if !record.active {
            if let Some(mut runner) = current.take() {
                runner.stop().await;
            }
            info!("monitor {} saved inactive", id);
            return Ok(record);
        }

        match current.as_mut() {
            Some(runner) => {
                runner
                    .reconfigure(record.clone(), notifications, &self.probes)
                    .await?;
                runner.start();
                info!("restarted monitor {}", id);
            }
            None => {
                let mut runner = self.create_runner_with(record.clone(), notifications).await?;
                runner.start();
                *current = Some(runner);
            }
        }

        Ok(record)
    }

    /// Stop the runner and delete the monitor with its history
    #[instrument(skip(self))]
    pub async fn delete_monitor(&self, id: &str) -> ManagerResult<bool> {
        let slot = self.slot(id).await;
        let mut current = slot.lock().await;

        if let Some(mut runner) = current.take() {
            runner.stop().await;
        }
        let deleted = self.ctx.store.delete_monitor(id).await;
        drop(current);

        self.release_slot(id, &slot).await;
        Ok(deleted?)
    }

    /// Stop the runner and persist the monitor as inactive
    #[instrument(skip(self))]
    pub async fn deactivate_monitor(&self, id: &str) -> ManagerResult<MonitorRecord> {
        let slot = self.slot(id).await;
        let mut current = slot.lock().await;
        let result = self.deactivate_locked(&mut current, id).await;
        drop(current);

        self.release_slot(id, &slot).await;
        result
    }

    async fn deactivate_locked(&self, current: &mut Option<MonitorRunner>, id: &str) -> ManagerResult<MonitorRecord> {
        let mut record = self
            .ctx
            .store
            .get_monitor(id)
            .await?
            .ok_or_else(|| ManagerError::NotFound(id.to_string()))?;

        if let Some(mut runner) = current.take() {
            runner.stop().await;
        }

        record.active = false;
        record.updated_at = Utc::now();
        self.ctx.store.upsert_monitor(&record).await?;
        Ok(record)
    }

    /// Stop every runner
    #[instrument(skip(self))]
    pub async fn shutdown(&self) {
        let slots = self.slots().await;

        let stopped = join_all(slots.iter().map(|(_, slot)| async move {
            let mut current = slot.lock().await;
            match current.take() {
                Some(mut runner) => {
                    runner.stop().await;
                    true
                }
                None => false,
            }
        }))
        .await;
        drop(slots);

        // Keep slots another operation is still using
        let mut runners = self.runners.lock().await;
        runners.retain(|_, slot| Arc::strong_count(slot) > 1 || slot.try_lock().map_or(true, |s| s.is_some()));

        info!("stopped {} monitors", stopped.into_iter().filter(|s| *s).count());
    }

    /// Waits only on an operation in flight for this same id
    pub async fn is_running(&self, id: &str) -> bool {
        let Some(slot) = self.existing_slot(id).await else {
            return false;
        };
        let current = slot.lock().await;
        current.as_ref().is_some_and(MonitorRunner::is_running)
    }

    pub async fn running_ids(&self) -> Vec<String> {
        let mut ids = Vec::new();
        for (id, slot) in self.slots().await {
            if slot.lock().await.as_ref().is_some_and(MonitorRunner::is_running) {
                ids.push(id);
            }
        }
        ids.sort();
        ids
    }

    /// Live status of a running monitor
    pub async fn status(&self, id: &str) -> Option<MonitorStatus> {
        let slot = self.existing_slot(id).await?;
        let (control, last) = {
            let current = slot.lock().await;
            let runner = current.as_ref()?;
            (runner.control(), runner.last_status())
        };

        match control {
            Some(control) => Some(control.status().await.unwrap_or(last)),
            None => Some(last),
        }
    }

    /// Run a check cycle now and return its outcome
    pub async fn check_now(&self, id: &str) -> ManagerResult<Outcome> {
        // Released before the check so other operations are not blocked on the probe
        let control = match self.existing_slot(id).await {
            Some(slot) => {
                let current = slot.lock().await;
                current.as_ref().and_then(MonitorRunner::control)
            }
            None => None,
        };

        let control = control.ok_or_else(|| ManagerError::NotRunning(id.to_string()))?;
        control
            .check_now()
            .await
            .map_err(|_| ManagerError::NotRunning(id.to_string()))
    }

    pub async fn get_monitor(&self, id: &str) -> ManagerResult<Option<MonitorRecord>> {
        Ok(self.ctx.store.get_monitor(id).await?)
    }

    pub async fn list_monitors(&self, workspace_id: Option<&str>) -> ManagerResult<Vec<MonitorRecord>> {
        Ok(self.ctx.store.list_monitors(workspace_id).await?)
    }

    /// Validate and persist a notification, refreshing runners that use it
    #[instrument(skip(self, request), fields(notification = %request.name))]
    pub async fn upsert_notification(&self, request: NotificationUpsert) -> ManagerResult<NotificationRecord> {
        if request.name.trim().is_empty() {
            return Err(ManagerError::InvalidConfig("notification name must not be empty".to_string()));
        }

        let channel = self
            .ctx
            .dispatcher
            .channels()
            .get(&request.channel_type)
            .ok_or_else(|| ManagerError::UnknownChannelType(request.channel_type.clone()))?;
        channel.validate(&request.payload)?;

        let record = NotificationRecord {
            id: request.id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            name: request.name.trim().to_string(),
            channel_type: request.channel_type,
            payload: request.payload,
        };

        self.ctx.store.upsert_notification(&record).await?;
        self.refresh_runners_using(&record.id).await;

        Ok(record)
    }

    /// Delete a notification, detaching it from every monitor
    #[instrument(skip(self))]
    pub async fn delete_notification(&self, id: &str) -> ManagerResult<bool> {
        let existed = self.ctx.store.delete_notification(id).await?;
        self.refresh_runners_using(id).await;
        Ok(existed)
    }

    /// Reload and restart every runner attached to `notification_id`
    async fn refresh_runners_using(&self, notification_id: &str) {
        for (monitor_id, slot) in self.slots().await {
            let mut current = slot.lock().await;
            let Some(runner) = current.as_mut() else {
                continue;
            };
            if !runner.monitor().notification_ids.iter().any(|n| n == notification_id) {
                continue;
            }

            let refreshed = match self.ctx.store.get_monitor(&monitor_id).await {
                Ok(Some(record)) => record,
                Ok(None) => continue,
                Err(e) => {
                    error!("failed to reload monitor {}: {}", monitor_id, e);
                    continue;
                }
            };

            let notifications = match self.load_notifications(&refreshed.notification_ids).await {
                Ok(notifications) => notifications,
                Err(e) => {
                    error!("failed to reload notifications of monitor {}: {}", monitor_id, e);
                    continue;
                }
            };

            if let Err(e) = runner.reconfigure(refreshed, notifications, &self.probes).await {
                error!("failed to restart monitor {}: {}", monitor_id, e);
            }
        }
    }

    /// Slot for `id`, created empty when absent
    async fn slot(&self, id: &str) -> RunnerSlot {
        self.runners
            .lock()
            .await
            .entry(id.to_string())
            .or_default()
            .clone()
    }

    async fn existing_slot(&self, id: &str) -> Option<RunnerSlot> {
        self.runners.lock().await.get(id).cloned()
    }

    /// Snapshot of the registry; the map lock is not held afterwards
    async fn slots(&self) -> Vec<(String, RunnerSlot)> {
        self.runners
            .lock()
            .await
            .iter()
            .map(|(id, slot)| (id.clone(), slot.clone()))
            .collect()
    }

    /// Drop an empty slot once nobody else holds or waits on it
    async fn release_slot(&self, id: &str, slot: &RunnerSlot) {
        let mut runners = self.runners.lock().await;
        let ours = runners.get(id).is_some_and(|s| Arc::ptr_eq(s, slot));
        // The map and the caller hold the only two references
        if ours && Arc::strong_count(slot) == 2 && slot.try_lock().is_ok_and(|s| s.is_none()) {
            runners.remove(id);
        }
    }

    fn validate_monitor(&self, request: &MonitorUpsert) -> ManagerResult<()> {
        if request.name.trim().is_empty() {
            return Err(ManagerError::InvalidConfig("name must not be empty".to_string()));
        }
        if request.workspace_id.trim().is_empty() {
            return Err(ManagerError::InvalidConfig("workspace_id must not be empty".to_string()));
        }
        if request.interval_secs < self.min_interval_secs {
            return Err(ManagerError::InvalidConfig(format!(
                "interval must be at least {} seconds",
                self.min_interval_secs
            )));
        }
        if request.interval_secs > MAX_INTERVAL_SECS {
            return Err(ManagerError::InvalidConfig(format!(
                "interval must be at most {MAX_INTERVAL_SECS} seconds"
            )));
        }

        let probe = self
            .probes
            .get(&request.probe_type)
            .ok_or_else(|| ManagerError::UnknownProbeType(request.probe_type.clone()))?;
        probe.validate(&request.payload)?;

        Ok(())
    }

    /// Fetch notifications in the given order; a missing id is an error
    async fn load_notifications(&self, ids: &[String]) -> ManagerResult<Vec<NotificationRecord>> {
        let mut notifications = Vec::with_capacity(ids.len());
        for id in ids {
            let notification = self
                .ctx
                .store
                .get_notification(id)
                .await?
                .ok_or_else(|| ManagerError::UnknownNotification(id.clone()))?;
            notifications.push(notification);
        }
        Ok(notifications)
    }

    async fn create_runner(&self, monitor: MonitorRecord) -> ManagerResult<MonitorRunner> {
        let notifications = self.load_notifications(&monitor.notification_ids).await?;
        self.create_runner_with(monitor, notifications).await
    }

    /// New stopped runner, seeded with the last persisted status
    async fn create_runner_with(
        &self,
        monitor: MonitorRecord,
        notifications: Vec<NotificationRecord>,
    ) -> ManagerResult<MonitorRunner> {
        let initial_status = match self.ctx.store.latest_event(&monitor.id).await {
            Ok(event) => event.map_or(MonitorStatus::Up, |e| e.kind),
            Err(e) => {
                warn!("could not load last event of {}: {}", monitor.id, e);
                MonitorStatus::Up
            }
        };

        MonitorRunner::new(monitor, notifications, &self.probes, self.ctx.clone(), initial_status)
    }
}
