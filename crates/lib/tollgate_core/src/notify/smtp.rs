//! SMTP delivery via lettre.

use std::time::Duration;

use async_trait::async_trait;
use lettre::message::Mailbox;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use serde::Deserialize;
use tracing::debug;

use super::{Notifier, NotifyError};
use crate::config::FieldError;

/// SMTP connect/send timeout.
const SMTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Mailer settings (`mailer` section of the config file).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MailerConfig {
    #[serde(default)]
    pub smtp_address: String,
    #[serde(default)]
    pub smtp_port: u16,
    #[serde(default)]
    pub author_name: String,
    #[serde(default)]
    pub author_pwd: String,
    /// Recipient of security warnings; defaults to `author_name`.
    #[serde(default)]
    pub notify_address: Option<String>,
}

impl MailerConfig {
    /// Check required fields.
    pub fn validate(&self) -> Result<(), FieldError> {
        if self.smtp_address.is_empty() {
            return Err(FieldError::Missing("smtp_address"));
        }
        if self.smtp_port == 0 {
            return Err(FieldError::Missing("smtp_port"));
        }
        if self.author_name.is_empty() {
            return Err(FieldError::Missing("author_name"));
        }
        if self.author_pwd.is_empty() {
            return Err(FieldError::Missing("author_pwd"));
        }
        Ok(())
    }

    /// Address warnings are sent to.
    pub fn recipient(&self) -> &str {
        self.notify_address
            .as_deref()
            .filter(|a| !a.is_empty())
            .unwrap_or(&self.author_name)
    }
}

/// Authenticated SMTP relay client.
#[derive(Clone)]
pub struct SmtpMailer {
    transport: SmtpTransport,
}

impl SmtpMailer {
    pub fn new(config: &MailerConfig) -> Result<Self, NotifyError> {
        let transport = SmtpTransport::relay(&config.smtp_address)?
            .port(config.smtp_port)
            .credentials(Credentials::new(
                config.author_name.clone(),
                config.author_pwd.clone(),
            ))
            .timeout(Some(SMTP_TIMEOUT))
            .build();
        Ok(Self { transport })
    }
}

#[async_trait]
impl Notifier for SmtpMailer {
    async fn send_mail(
        &self,
        from: &str,
        to: &str,
        subject: &str,
        body: &str,
    ) -> Result<(), NotifyError> {
        let message = Message::builder()
            .from(from.parse::<Mailbox>()?)
            .to(to.parse::<Mailbox>()?)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())?;

        let transport = self.transport.clone();
        tokio::task::spawn_blocking(move || transport.send(&message)).await??;

        debug!(to, subject, "mail sent");
        Ok(())
    }
}
