//! In-process event bus for live dashboard updates
//!
//! Runners publish new samples and status changes; subscribers register for
//! one workspace and only see that workspace's events.
//!
//! ## Delivery
//!
//! Built on a `broadcast` channel: publishing never blocks, delivery is
//! at-most-once and there is no replay. A subscriber that falls behind by more
//! than the channel capacity skips the missed events and keeps going.

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{trace, warn};

use crate::storage::{EventRow, SampleRow};

/// Default channel capacity
pub const DEFAULT_CAPACITY: usize = 1024;

/// An update pushed to live subscribers
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BusEvent {
    NewSample { workspace_id: String, sample: SampleRow },
    StatusChanged { workspace_id: String, event: EventRow },
}

impl BusEvent {
    pub fn workspace_id(&self) -> &str {
        match self {
            BusEvent::NewSample { workspace_id, .. } | BusEvent::StatusChanged { workspace_id, .. } => workspace_id,
        }
    }

    pub fn monitor_id(&self) -> &str {
        match self {
            BusEvent::NewSample { sample, .. } => &sample.monitor_id,
            BusEvent::StatusChanged { event, .. } => &event.monitor_id,
        }
    }
}

/// Process-wide fan-out of [`BusEvent`]s
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<BusEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish an event, returning how many subscribers were reached.
    ///
    /// Having no subscribers is not an error.
    pub fn publish(&self, event: BusEvent) -> usize {
        match self.sender.send(event) {
            Ok(receivers) => receivers,
            Err(_) => {
                trace!("no live subscribers for bus event");
                0
            }
        }
    }

    pub fn publish_sample(&self, workspace_id: &str, sample: SampleRow) -> usize {
        self.publish(BusEvent::NewSample {
            workspace_id: workspace_id.to_string(),
            sample,
        })
    }

    pub fn publish_status(&self, workspace_id: &str, event: EventRow) -> usize {
        self.publish(BusEvent::StatusChanged {
            workspace_id: workspace_id.to_string(),
            event,
        })
    }

    /// Subscribe to the events of one workspace
    pub fn subscribe(&self, workspace_id: impl Into<String>) -> WorkspaceSubscription {
        WorkspaceSubscription {
            workspace_id: workspace_id.into(),
            receiver: self.sender.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// A subscription scoped to one workspace
pub struct WorkspaceSubscription {
    workspace_id: String,
    receiver: broadcast::Receiver<BusEvent>,
}

impl WorkspaceSubscription {
    pub fn workspace_id(&self) -> &str {
        &self.workspace_id
    }

    /// Wait for the next event of this workspace.
    ///
    /// Returns `None` once the bus is gone.
    pub async fn recv(&mut self) -> Option<BusEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if event.workspace_id() == self.workspace_id => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("subscriber for workspace {} lagged, skipped {} events", self.workspace_id, skipped);
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Next already-published event of this workspace, without waiting
    pub fn try_recv(&mut self) -> Option<BusEvent> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) if event.workspace_id() == self.workspace_id => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    warn!("subscriber for workspace {} lagged, skipped {} events", self.workspace_id, skipped);
                    continue;
                }
                Err(_) => return None,
            }
        }
    }
}
