use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use super::token::{NotificationMessage, escape_markdown_v2, render_telegram};
use super::{ChannelProvider, SenderError, ensure_success, parse_payload};
use crate::storage::NotificationRecord;

const DEFAULT_API_BASE: &str = "https://api.telegram.org";

/// Payload of a `telegram` notification
#[derive(Debug, Clone, Deserialize)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub chat_id: String,

    /// Bot API base, overridable for self-hosted API servers
    #[serde(default = "default_api_base")]
    pub api_base: String,
}

fn default_api_base() -> String {
    DEFAULT_API_BASE.to_string()
}

#[derive(Serialize)]
struct TelegramMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'a str,
}

/// A sender for pushing notifications via the Telegram Bot API.
pub struct TelegramChannel {
    client: Client,
}

impl Default for TelegramChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl TelegramChannel {
    pub fn new() -> Self {
        Self { client: Client::new() }
    }

    /// Bold title, blank line, then the rendered body
    pub fn format(message: &NotificationMessage) -> String {
        format!(
            "*{}*\n\n{}",
            escape_markdown_v2(&message.title),
            render_telegram(&message.tokens)
        )
    }
}

#[async_trait]
impl ChannelProvider for TelegramChannel {
    fn name(&self) -> &'static str {
        "telegram"
    }

    fn validate(&self, payload: &serde_json::Value) -> Result<(), SenderError> {
        let config: TelegramConfig = parse_payload(payload)?;
        if config.bot_token.trim().is_empty() || config.chat_id.trim().is_empty() {
            return Err(SenderError::InvalidConfiguration(
                "bot_token and chat_id are required".to_string(),
            ));
        }
        Ok(())
    }

    #[instrument(skip_all, fields(channel = %notification.name))]
    async fn send(&self, notification: &NotificationRecord, message: &NotificationMessage) -> Result<(), SenderError> {
        let config: TelegramConfig = parse_payload(&notification.payload)?;

        let api_url = format!(
            "{}/bot{}/sendMessage",
            config.api_base.trim_end_matches('/'),
            config.bot_token
        );

        let text = Self::format(message);
        let payload = TelegramMessage {
            chat_id: &config.chat_id,
            text: &text,
            parse_mode: "MarkdownV2",
        };

        let response = self.client.post(&api_url).json(&payload).send().await?;
        ensure_success("Telegram API", response).await?;

        info!("successfully sent Telegram message");
        Ok(())
    }
}
