//! Notification channels and dispatch
//!
//! A [`ChannelProvider`] delivers a [`NotificationMessage`] through one
//! external channel. Providers are registered in a [`ChannelRegistry`] by
//! channel type tag; the [`NotificationDispatcher`] resolves a monitor's
//! attached notifications against it and fans the message out.

pub mod discord;
pub mod dispatcher;
pub mod smtp;
pub mod telegram;
pub mod token;
pub mod webhook;

pub use discord::DiscordChannel;
pub use dispatcher::{DispatchReport, NotificationDispatcher, status_message};
pub use smtp::SmtpChannel;
pub use telegram::TelegramChannel;
pub use token::{ContentToken, NotificationMessage};
pub use webhook::WebhookChannel;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::storage::NotificationRecord;

#[derive(Error, Debug)]
pub enum SenderError {
    #[error("failed to send notification: {0}")]
    SendFailed(String),
    #[error("invalid configuration for sender: {0}")]
    InvalidConfiguration(String),
    #[error("unknown channel type: {0}")]
    UnknownChannel(String),
    #[error("network error: {0}")]
    NetworkError(#[from] reqwest::Error),
}

/// A sender for one channel type
#[async_trait]
pub trait ChannelProvider: Send + Sync {
    /// Channel type tag this provider is registered under
    fn name(&self) -> &'static str;

    /// Reject payloads this channel cannot deliver with
    fn validate(&self, payload: &serde_json::Value) -> Result<(), SenderError>;

    /// Deliver `message` using the notification's configuration
    async fn send(&self, notification: &NotificationRecord, message: &NotificationMessage) -> Result<(), SenderError>;
}

pub(crate) fn parse_payload<T: DeserializeOwned>(payload: &serde_json::Value) -> Result<T, SenderError> {
    serde_json::from_value(payload.clone()).map_err(|e| SenderError::InvalidConfiguration(e.to_string()))
}

/// Turn a non-success response into a `SendFailed`
pub(crate) async fn ensure_success(channel: &str, response: reqwest::Response) -> Result<(), SenderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }

    let error_body = response
        .text()
        .await
        .unwrap_or_else(|_| "failed to read error body".to_string());
    Err(SenderError::SendFailed(format!(
        "{channel} returned non-success status: {status}. Body: {error_body}"
    )))
}

/// Mapping from channel type tag to provider
#[derive(Clone, Default)]
pub struct ChannelRegistry {
    providers: HashMap<String, Arc<dyn ChannelProvider>>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the `telegram`, `discord`, `webhook` and `smtp` channels
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(TelegramChannel::new()));
        registry.register(Arc::new(DiscordChannel::new()));
        registry.register(Arc::new(WebhookChannel::new()));
        registry.register(Arc::new(SmtpChannel::new()));
        registry
    }

    pub fn register(&mut self, provider: Arc<dyn ChannelProvider>) {
        self.providers.insert(provider.name().to_string(), provider);
    }

    pub fn get(&self, channel_type: &str) -> Option<Arc<dyn ChannelProvider>> {
        self.providers.get(channel_type).cloned()
    }

    pub fn contains(&self, channel_type: &str) -> bool {
        self.providers.contains_key(channel_type)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.providers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
