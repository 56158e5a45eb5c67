use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, Method, header};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use super::token::{ContentToken, NotificationMessage};
use super::{ChannelProvider, SenderError, ensure_success, parse_payload};
use crate::storage::{MonitorStatus, NotificationRecord};

/// Payload of a `webhook` notification
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookConfig {
    pub url: String,

    /// `POST` (default) or `GET`
    #[serde(default = "default_method")]
    pub method: String,

    #[serde(default)]
    pub headers: HashMap<String, String>,
}

fn default_method() -> String {
    "POST".to_string()
}

impl WebhookConfig {
    fn http_method(&self) -> Result<Method, SenderError> {
        match self.method.to_uppercase().as_str() {
            "POST" => Ok(Method::POST),
            "GET" => Ok(Method::GET),
            _ => Err(SenderError::InvalidConfiguration(format!(
                "unsupported HTTP method: {}",
                self.method
            ))),
        }
    }

    fn header_map(&self) -> Result<header::HeaderMap, SenderError> {
        let mut header_map = header::HeaderMap::new();
        for (key, value) in &self.headers {
            let header_name = header::HeaderName::from_bytes(key.as_bytes())
                .map_err(|e| SenderError::InvalidConfiguration(format!("invalid header name: {e}")))?;
            let header_value = header::HeaderValue::from_str(value)
                .map_err(|e| SenderError::InvalidConfiguration(format!("invalid header value: {e}")))?;
            header_map.insert(header_name, header_value);
        }
        Ok(header_map)
    }
}

/// JSON body posted to the webhook
#[derive(Debug, Serialize)]
pub struct WebhookBody<'a> {
    pub title: &'a str,
    pub text: String,
    pub tokens: &'a [ContentToken],
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<MonitorStatus>,
    pub timestamp: String,
}

/// A sender for pushing notifications via a custom webhook.
pub struct WebhookChannel {
    client: Client,
}

impl Default for WebhookChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl WebhookChannel {
    pub fn new() -> Self {
        Self { client: Client::new() }
    }
}

#[async_trait]
impl ChannelProvider for WebhookChannel {
    fn name(&self) -> &'static str {
        "webhook"
    }

    fn validate(&self, payload: &serde_json::Value) -> Result<(), SenderError> {
        let config: WebhookConfig = parse_payload(payload)?;
        reqwest::Url::parse(&config.url)
            .map_err(|e| SenderError::InvalidConfiguration(format!("invalid url: {e}")))?;
        config.http_method()?;
        config.header_map()?;
        Ok(())
    }

    #[instrument(skip_all, fields(channel = %notification.name))]
    async fn send(&self, notification: &NotificationRecord, message: &NotificationMessage) -> Result<(), SenderError> {
        let config: WebhookConfig = parse_payload(&notification.payload)?;
        let method = config.http_method()?;

        let text = message.to_plain_text();
        let mut request = self
            .client
            .request(method.clone(), &config.url)
            .headers(config.header_map()?);

        // GET carries the message in the query string instead of a body
        request = if method == Method::GET {
            request.query(&[("title", message.title.as_str()), ("text", text.as_str())])
        } else {
            request.json(&WebhookBody {
                title: &message.title,
                text: text.clone(),
                tokens: &message.tokens,
                status: message.status,
                timestamp: Utc::now().to_rfc3339(),
            })
        };

        let response = request.send().await?;
        ensure_success("Webhook", response).await?;

        info!("successfully sent webhook notification");
        Ok(())
    }
}
