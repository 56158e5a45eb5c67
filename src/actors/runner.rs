//! MonitorRunnerActor - Drives the check loop of one monitor
//!
//! Each active monitor gets its own runner actor. The actor checks the target
//! immediately on start, then again `interval` after each cycle *finishes*,
//! so a slow probe delays the next check instead of overlapping it.
//!
//! ## Cycle
//!
//! ```text
//! probe (own task, bounded by deadline) → classify → [transition: event → bus → notify]
//!     → sample → bus → sleep(interval)
//!     ↑
//!     └─── Commands (CheckNow, GetStatus, Shutdown)
//! ```
//!
//! Nothing inside a cycle can end the loop: probe errors, panics and timeouts
//! become a `-1` sample, and storage or notification failures are logged.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tracing::{debug, error, info, instrument, trace, warn};

use super::manager::ManagerError;
use super::messages::RunnerCommand;
use super::status::{Outcome, StatusTracker};
use crate::event_bus::EventBus;
use crate::notifications::{NotificationDispatcher, status_message};
use crate::probes::{FAILURE_VALUE, Probe, ProbeRegistry};
use crate::storage::{EventRow, MonitorRecord, MonitorStatus, NotificationRecord, SampleRow, StorageBackend};

/// Default upper bound for a single probe invocation
pub const DEFAULT_PROBE_DEADLINE: Duration = Duration::from_secs(60);

/// Collaborators shared by every runner
#[derive(Clone)]
pub struct RunnerContext {
    pub store: Arc<dyn StorageBackend>,
    pub dispatcher: NotificationDispatcher,
    pub event_bus: EventBus,
    pub probe_deadline: Duration,
}

impl RunnerContext {
    pub fn new(store: Arc<dyn StorageBackend>, dispatcher: NotificationDispatcher, event_bus: EventBus) -> Self {
        Self {
            store,
            dispatcher,
            event_bus,
            probe_deadline: DEFAULT_PROBE_DEADLINE,
        }
    }

    pub fn with_probe_deadline(mut self, probe_deadline: Duration) -> Self {
        self.probe_deadline = probe_deadline;
        self
    }
}

/// Fallback wait when `now + interval` is not representable
const FAR_FUTURE: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Actor that checks a single monitor
pub struct MonitorRunnerActor {
    monitor: Arc<MonitorRecord>,

    /// Provider resolved when the runner was created
    probe: Arc<dyn Probe>,

    /// Snapshot of the attached notification configs
    notifications: Vec<NotificationRecord>,

    ctx: RunnerContext,

    tracker: StatusTracker,

    command_rx: mpsc::Receiver<RunnerCommand>,

    interval: Duration,
}

impl MonitorRunnerActor {
    pub fn new(
        monitor: Arc<MonitorRecord>,
        probe: Arc<dyn Probe>,
        notifications: Vec<NotificationRecord>,
        ctx: RunnerContext,
        initial_status: MonitorStatus,
        command_rx: mpsc::Receiver<RunnerCommand>,
    ) -> Self {
        let interval = Duration::from_secs(monitor.interval_secs.max(1));

        Self {
            monitor,
            probe,
            notifications,
            ctx,
            tracker: StatusTracker::new(initial_status),
            command_rx,
            interval,
        }
    }

    /// Run the actor's main loop
    ///
    /// Runs until a Shutdown command is received or the command channel is
    /// closed, and returns the last known status.
    #[instrument(skip(self), fields(monitor_id = %self.monitor.id, monitor = %self.monitor.name))]
    pub async fn run(mut self) -> MonitorStatus {
        debug!("starting monitor runner (interval {:?})", self.interval);

        // First check runs immediately
        let mut next_check = Instant::now();

        loop {
            tokio::select! {
                // Commands win over a due timer so a pending shutdown is never
                // followed by another cycle
                biased;

                cmd = self.command_rx.recv() => {
                    match cmd {
                        Some(RunnerCommand::CheckNow { respond_to }) => {
                            debug!("received CheckNow command");
                            let outcome = self.perform_check().await;
                            next_check = self.next_deadline();
                            let _ = respond_to.send(outcome);
                        }

                        Some(RunnerCommand::GetStatus { respond_to }) => {
                            let _ = respond_to.send(self.tracker.current());
                        }

                        Some(RunnerCommand::Shutdown) => {
                            debug!("received shutdown command");
                            break;
                        }

                        None => {
                            warn!("command channel closed, shutting down");
                            break;
                        }
                    }
                }

                _ = time::sleep_until(next_check) => {
                    self.perform_check().await;
                    next_check = self.next_deadline();
                }
            }
        }

        debug!("monitor runner stopped");
        self.tracker.current()
    }

    /// When the next cycle is due, counted from now
    fn next_deadline(&self) -> Instant {
        let now = Instant::now();
        now.checked_add(self.interval)
            .unwrap_or_else(|| now + FAR_FUTURE)
    }

    /// One full check cycle
    #[instrument(skip(self), fields(monitor_id = %self.monitor.id))]
    async fn perform_check(&mut self) -> Outcome {
        let value = self.run_probe().await;
        let outcome = Outcome::from_value(value);
        trace!("probe returned {} ({:?})", value, outcome);

        if let Some(status) = self.tracker.observe(outcome) {
            self.record_transition(status).await;
        }

        let sample = SampleRow::new(self.monitor.id.clone(), value);
        if let Err(e) = self.ctx.store.insert_sample(&sample).await {
            error!("failed to persist sample: {}", e);
        }
        self.ctx.event_bus.publish_sample(&self.monitor.workspace_id, sample);

        outcome
    }

    /// Run the probe in its own task so a panic or hang cannot take the loop down
    async fn run_probe(&self) -> i64 {
        let probe = self.probe.clone();
        let monitor = self.monitor.clone();
        let mut task = tokio::spawn(async move { probe.run(&monitor).await });

        match time::timeout(self.ctx.probe_deadline, &mut task).await {
            Ok(Ok(Ok(value))) => value,
            Ok(Ok(Err(e))) => {
                warn!("probe failed: {}", e);
                FAILURE_VALUE
            }
            Ok(Err(e)) => {
                warn!("probe task aborted: {}", e);
                FAILURE_VALUE
            }
            Err(_) => {
                task.abort();
                warn!("probe exceeded deadline of {:?}", self.ctx.probe_deadline);
                FAILURE_VALUE
            }
        }
    }

    async fn record_transition(&self, status: MonitorStatus) {
        info!("monitor is now {}", status);

        let description = match status {
            MonitorStatus::Down => format!("Monitor [{}] has been down", self.monitor.name),
            MonitorStatus::Up => format!("Monitor [{}] has been up", self.monitor.name),
        };
        let event = EventRow::new(self.monitor.id.clone(), status, description);

        if let Err(e) = self.ctx.store.insert_event(&event).await {
            error!(
                monitor_id = %self.monitor.id,
                kind = %status,
                "state transition not persisted: {}",
                e
            );
        }
        self.ctx.event_bus.publish_status(&self.monitor.workspace_id, event);

        let message = status_message(&self.monitor.name, status, Utc::now());
        let report = self.ctx.dispatcher.notify(&self.notifications, &message).await;
        if !report.all_delivered() {
            warn!(
                "{} of {} notifications failed",
                report.failed.len(),
                report.failed.len() + report.delivered.len()
            );
        }
    }
}

/// Cloneable command sender for a running actor
#[derive(Clone)]
pub struct RunnerControl {
    sender: mpsc::Sender<RunnerCommand>,
}

impl RunnerControl {
    /// Trigger an immediate check and wait for its outcome
    pub async fn check_now(&self) -> Result<Outcome> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(RunnerCommand::CheckNow { respond_to: tx })
            .await
            .context("runner is not running")?;

        rx.await.context("runner stopped before completing the check")
    }

    pub async fn status(&self) -> Result<MonitorStatus> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(RunnerCommand::GetStatus { respond_to: tx })
            .await
            .context("runner is not running")?;

        rx.await.context("runner stopped before answering")
    }
}

/// Owning handle for a MonitorRunnerActor
pub struct RunnerHandle {
    control: RunnerControl,
    task: JoinHandle<MonitorStatus>,
}

impl RunnerHandle {
    /// Spawn a new runner actor
    pub fn spawn(
        monitor: Arc<MonitorRecord>,
        probe: Arc<dyn Probe>,
        notifications: Vec<NotificationRecord>,
        ctx: RunnerContext,
        initial_status: MonitorStatus,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(32);
        let actor = MonitorRunnerActor::new(monitor, probe, notifications, ctx, initial_status, cmd_rx);
        let task = tokio::spawn(actor.run());

        Self {
            control: RunnerControl { sender: cmd_tx },
            task,
        }
    }

    pub fn control(&self) -> RunnerControl {
        self.control.clone()
    }

    /// Stop the actor and wait until it has exited.
    ///
    /// Returns the final status, or `None` if the task was lost.
    pub async fn shutdown(self) -> Option<MonitorStatus> {
        let _ = self.control.sender.send(RunnerCommand::Shutdown).await;
        match self.task.await {
            Ok(status) => Some(status),
            Err(e) => {
                error!("runner task failed: {}", e);
                None
            }
        }
    }
}

/// A monitor together with its (possibly stopped) runner
///
/// The status survives stop/start, so a restart does not replay a
/// transition that was already recorded.
pub struct MonitorRunner {
    monitor: Arc<MonitorRecord>,
    probe: Arc<dyn Probe>,
    notifications: Vec<NotificationRecord>,
    ctx: RunnerContext,
    status: MonitorStatus,
    handle: Option<RunnerHandle>,
}

impl MonitorRunner {
    /// Resolve the monitor's probe; an unknown type is a configuration error
    pub fn new(
        monitor: MonitorRecord,
        notifications: Vec<NotificationRecord>,
        probes: &ProbeRegistry,
        ctx: RunnerContext,
        initial_status: MonitorStatus,
    ) -> Result<Self, ManagerError> {
        let probe = probes
            .get(&monitor.probe_type)
            .ok_or_else(|| ManagerError::UnknownProbeType(monitor.probe_type.clone()))?;

        Ok(Self {
            monitor: Arc::new(monitor),
            probe,
            notifications,
            ctx,
            status: initial_status,
            handle: None,
        })
    }

    pub fn monitor(&self) -> &MonitorRecord {
        &self.monitor
    }

    pub fn notifications(&self) -> &[NotificationRecord] {
        &self.notifications
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    /// Start the loop; no-op if it is already running
    pub fn start(&mut self) {
        if self.handle.is_some() {
            trace!("runner for {} already running", self.monitor.id);
            return;
        }

        self.handle = Some(RunnerHandle::spawn(
            self.monitor.clone(),
            self.probe.clone(),
            self.notifications.clone(),
            self.ctx.clone(),
            self.status,
        ));
        info!("started monitor {} ({})", self.monitor.name, self.monitor.id);
    }

    /// Stop the loop and wait for it to exit; idempotent
    pub async fn stop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };

        if let Some(status) = handle.shutdown().await {
            self.status = status;
        }
        info!("stopped monitor {} ({})", self.monitor.name, self.monitor.id);
    }

    pub async fn restart(&mut self) {
        self.stop().await;
        self.start();
    }

    /// Swap in a refreshed configuration and restart if it was running
    pub async fn reconfigure(
        &mut self,
        monitor: MonitorRecord,
        notifications: Vec<NotificationRecord>,
        probes: &ProbeRegistry,
    ) -> Result<(), ManagerError> {
        let probe = probes
            .get(&monitor.probe_type)
            .ok_or_else(|| ManagerError::UnknownProbeType(monitor.probe_type.clone()))?;

        let was_running = self.is_running();
        self.stop().await;

        self.monitor = Arc::new(monitor);
        self.probe = probe;
        self.notifications = notifications;

        if was_running {
            self.start();
        }
        Ok(())
    }

    /// Command sender of the live loop, if running
    pub fn control(&self) -> Option<RunnerControl> {
        self.handle.as_ref().map(RunnerHandle::control)
    }

    /// Last status recorded when the loop stopped
    pub fn last_status(&self) -> MonitorStatus {
        self.status
    }

    /// Current status, asking the live loop when running
    pub async fn status(&self) -> MonitorStatus {
        match &self.handle {
            Some(handle) => handle.control.status().await.unwrap_or(self.status),
            None => self.status,
        }
    }

    pub async fn check_now(&self) -> Result<Outcome> {
        match &self.handle {
            Some(handle) => handle.control.check_now().await,
            None => anyhow::bail!("monitor {} is not running", self.monitor.id),
        }
    }
}
