use std::time::Duration;

use async_trait::async_trait;
use lettre::message::{Mailbox, Mailboxes, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::transport::smtp::client::{Tls, TlsParameters};
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use serde::Deserialize;
use tracing::{info, instrument};

use super::token::{NotificationMessage, render_html};
use super::{ChannelProvider, SenderError, parse_payload};
use crate::storage::NotificationRecord;

const SMTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Payload of an `smtp` notification
#[derive(Debug, Clone, Deserialize)]
pub struct SmtpConfig {
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Implicit TLS from the first byte; otherwise STARTTLS when offered
    #[serde(default = "default_secure")]
    pub secure: bool,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<String>,

    pub from: String,

    /// One or more comma separated recipients
    pub to: String,
}

fn default_port() -> u16 {
    465
}

fn default_secure() -> bool {
    true
}

impl SmtpConfig {
    fn sender(&self) -> Result<Mailbox, SenderError> {
        self.from
            .parse()
            .map_err(|e| SenderError::InvalidConfiguration(format!("invalid from address: {e}")))
    }

    fn recipients(&self) -> Result<Mailboxes, SenderError> {
        let recipients: Mailboxes = self
            .to
            .parse()
            .map_err(|e| SenderError::InvalidConfiguration(format!("invalid to address: {e}")))?;
        if recipients.iter().next().is_none() {
            return Err(SenderError::InvalidConfiguration("to must name at least one recipient".to_string()));
        }
        Ok(recipients)
    }

    fn credentials(&self) -> Result<Option<Credentials>, SenderError> {
        match (&self.username, &self.password) {
            (Some(username), Some(password)) => Ok(Some(Credentials::new(username.clone(), password.clone()))),
            (None, None) => Ok(None),
            _ => Err(SenderError::InvalidConfiguration(
                "username and password must be given together".to_string(),
            )),
        }
    }

    fn transport(&self) -> Result<AsyncSmtpTransport<Tokio1Executor>, SenderError> {
        let smtp_error = |e: lettre::transport::smtp::Error| SenderError::InvalidConfiguration(e.to_string());

        let builder = if self.secure {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&self.host).map_err(smtp_error)?
        } else {
            let tls = TlsParameters::new(self.host.clone()).map_err(smtp_error)?;
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&self.host).tls(Tls::Opportunistic(tls))
        };

        let mut builder = builder.port(self.port).timeout(Some(SMTP_TIMEOUT));
        if let Some(credentials) = self.credentials()? {
            builder = builder.credentials(credentials);
        }
        Ok(builder.build())
    }
}

/// Build the mail: the title as subject, plain text and HTML alternatives
pub fn build_email(config: &SmtpConfig, message: &NotificationMessage) -> Result<Message, SenderError> {
    let mut builder = Message::builder().from(config.sender()?).subject(message.title.as_str());
    for recipient in config.recipients()? {
        builder = builder.to(recipient);
    }

    builder
        .multipart(MultiPart::alternative_plain_html(
            message.to_plain_text(),
            render_html(&message.tokens),
        ))
        .map_err(|e| SenderError::SendFailed(format!("failed to build email: {e}")))
}

/// A sender for delivering notifications by mail over SMTP.
#[derive(Default)]
pub struct SmtpChannel;

impl SmtpChannel {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ChannelProvider for SmtpChannel {
    fn name(&self) -> &'static str {
        "smtp"
    }

    fn validate(&self, payload: &serde_json::Value) -> Result<(), SenderError> {
        let config: SmtpConfig = parse_payload(payload)?;
        if config.host.trim().is_empty() {
            return Err(SenderError::InvalidConfiguration("host must not be empty".to_string()));
        }
        if config.port == 0 {
            return Err(SenderError::InvalidConfiguration("port must not be 0".to_string()));
        }
        config.sender()?;
        config.recipients()?;
        config.credentials()?;
        Ok(())
    }

    #[instrument(skip_all, fields(channel = %notification.name))]
    async fn send(&self, notification: &NotificationRecord, message: &NotificationMessage) -> Result<(), SenderError> {
        let config: SmtpConfig = parse_payload(&notification.payload)?;
        let email = build_email(&config, message)?;

        config
            .transport()?
            .send(email)
            .await
            .map_err(|e| SenderError::SendFailed(format!("SMTP delivery to {} failed: {e}", config.host)))?;

        info!("successfully sent smtp notification");
        Ok(())
    }
}
