use chrono::Utc;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use async_trait::async_trait;
use tracing::{info, instrument};

use super::token::{NotificationMessage, render_discord};
use super::{ChannelProvider, SenderError, ensure_success, parse_payload};
use crate::storage::{MonitorStatus, NotificationRecord};

const COLOR_RED: u32 = 15158332;
const COLOR_GREEN: u32 = 3066993;
const COLOR_LIGHT_BLUE: u32 = 5793266;

/// Payload of a `discord` notification
#[derive(Debug, Clone, Deserialize)]
pub struct DiscordConfig {
    /// Incoming webhook URL of the channel
    pub url: String,

    /// User to mention alongside the embed
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Message {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub embeds: Vec<Embed>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Embed {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

#[derive(Default)]
pub struct MessageBuilder {
    content: Option<String>,
    embeds: Vec<Embed>,
}

impl MessageBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn content(mut self, content: impl ToString) -> Self {
        self.content = Some(content.to_string());
        self
    }

    pub fn add_embed(mut self, embed: Embed) -> Self {
        self.embeds.push(embed);
        self
    }

    pub fn build(self) -> Message {
        Message {
            content: self.content,
            embeds: self.embeds,
        }
    }
}

/// Sends messages to a Discord channel through its webhook
pub struct DiscordChannel {
    client: Client,
}

impl Default for DiscordChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl DiscordChannel {
    pub fn new() -> Self {
        Self { client: Client::new() }
    }

    pub fn build_embed(message: &NotificationMessage) -> Embed {
        let color = match message.status {
            Some(MonitorStatus::Down) => COLOR_RED,
            Some(MonitorStatus::Up) => COLOR_GREEN,
            None => COLOR_LIGHT_BLUE,
        };

        Embed {
            title: Some(message.title.clone()),
            description: Some(render_discord(&message.tokens)),
            color: Some(color),
            timestamp: Some(Utc::now().to_rfc3339()),
        }
    }

    pub fn build_message(config: &DiscordConfig, message: &NotificationMessage) -> Message {
        let mut builder = MessageBuilder::new().add_embed(Self::build_embed(message));
        if let Some(user_id) = &config.user_id {
            builder = builder.content(format!("{} <@{user_id}>", message.title));
        }
        builder.build()
    }
}

#[async_trait]
impl ChannelProvider for DiscordChannel {
    fn name(&self) -> &'static str {
        "discord"
    }

    fn validate(&self, payload: &serde_json::Value) -> Result<(), SenderError> {
        let config: DiscordConfig = parse_payload(payload)?;
        reqwest::Url::parse(&config.url)
            .map_err(|e| SenderError::InvalidConfiguration(format!("invalid webhook url: {e}")))?;
        Ok(())
    }

    #[instrument(skip_all, fields(channel = %notification.name))]
    async fn send(&self, notification: &NotificationRecord, message: &NotificationMessage) -> Result<(), SenderError> {
        let config: DiscordConfig = parse_payload(&notification.payload)?;
        let body = Self::build_message(&config, message);

        let response = self.client.post(&config.url).json(&body).send().await?;
        ensure_success("Discord webhook", response).await?;

        info!("successfully sent Discord message");
        Ok(())
    }
}
