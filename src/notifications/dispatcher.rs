//! Notification dispatcher
//!
//! Fans one message out to every notification attached to a monitor. Each
//! channel runs concurrently; a failing channel is logged and counted but
//! never delays or aborts the others, and nothing propagates to the caller.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use tracing::{debug, instrument, warn};

use super::token::{ContentToken, NotificationMessage};
use super::{ChannelRegistry, SenderError};
use crate::storage::{MonitorStatus, NotificationRecord};

/// Upper bound for a single channel delivery
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(30);

/// Outcome of one dispatch call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Notification ids delivered successfully
    pub delivered: Vec<String>,

    /// Notification ids that failed, with the reason
    pub failed: Vec<(String, String)>,
}

impl DispatchReport {
    pub fn all_delivered(&self) -> bool {
        self.failed.is_empty()
    }
}

#[derive(Clone)]
pub struct NotificationDispatcher {
    channels: Arc<ChannelRegistry>,
    send_timeout: Duration,
}

impl NotificationDispatcher {
    pub fn new(channels: Arc<ChannelRegistry>) -> Self {
        Self {
            channels,
            send_timeout: DEFAULT_SEND_TIMEOUT,
        }
    }

    pub fn with_send_timeout(mut self, send_timeout: Duration) -> Self {
        self.send_timeout = send_timeout;
        self
    }

    pub fn channels(&self) -> &ChannelRegistry {
        &self.channels
    }

    /// Deliver `message` to every notification concurrently
    #[instrument(skip_all, fields(title = %message.title, channels = notifications.len()))]
    pub async fn notify(&self, notifications: &[NotificationRecord], message: &NotificationMessage) -> DispatchReport {
        let sends = notifications.iter().map(|notification| async move {
            let result = self.send_one(notification, message).await;
            (notification, result)
        });

        let mut report = DispatchReport::default();
        for (notification, result) in join_all(sends).await {
            match result {
                Ok(()) => {
                    debug!("delivered notification via {}", notification.name);
                    report.delivered.push(notification.id.clone());
                }
                Err(e) => {
                    warn!(
                        "notification '{}' ({}) failed: {}",
                        notification.name, notification.channel_type, e
                    );
                    report.failed.push((notification.id.clone(), e.to_string()));
                }
            }
        }

        report
    }

    async fn send_one(&self, notification: &NotificationRecord, message: &NotificationMessage) -> Result<(), SenderError> {
        let provider = self
            .channels
            .get(&notification.channel_type)
            .ok_or_else(|| SenderError::UnknownChannel(notification.channel_type.clone()))?;

        tokio::time::timeout(self.send_timeout, provider.send(notification, message))
            .await
            .map_err(|_| SenderError::SendFailed(format!("timed out after {:?}", self.send_timeout)))?
    }
}

/// Compose the message sent when a monitor changes status
pub fn status_message(monitor_name: &str, status: MonitorStatus, at: DateTime<Utc>) -> NotificationMessage {
    let title = match status {
        MonitorStatus::Down => format!("[{monitor_name}] 🔴 Down"),
        MonitorStatus::Up => format!("[{monitor_name}] ✅ Up"),
    };

    let tokens = vec![
        ContentToken::text(title.clone()),
        ContentToken::Newline,
        ContentToken::text(format!("Time: {}", at.format("%Y-%m-%d %H:%M:%S (%Z)"))),
    ];

    NotificationMessage::new(title, tokens).with_status(status)
}
