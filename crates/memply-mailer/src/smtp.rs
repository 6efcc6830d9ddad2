//! SMTP transport — async lettre sending with STARTTLS.

use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message as LettreMessage, Tokio1Executor,
};

use memply_core::config::SmtpConfig;
use memply_core::error::{MemplyError, Result};
use memply_core::traits::{SendReceipt, Transport};
use memply_core::types::OutboundEmail;

/// Transport implementation over a configured SMTP relay.
pub struct SmtpMailer {
    config: SmtpConfig,
}

impl SmtpMailer {
    pub fn new(config: SmtpConfig) -> Self {
        Self { config }
    }

    fn from_mailbox(&self) -> Result<Mailbox> {
        let from_name = self.config.from_name.as_deref().unwrap_or("Memply");
        format!("{from_name} <{}>", self.config.from_address)
            .parse()
            .map_err(|e| MemplyError::Config(format!("Invalid from address: {e}")))
    }
}

#[async_trait]
impl Transport for SmtpMailer {
    fn name(&self) -> &str {
        "smtp"
    }

    fn is_configured(&self) -> bool {
        !self.config.host.is_empty()
            && !self.config.username.is_empty()
            && !self.config.password.is_empty()
            && self.from_mailbox().is_ok()
    }

    async fn send(&self, email: &OutboundEmail) -> Result<SendReceipt> {
        let to_mailbox: Mailbox = email
            .to
            .parse()
            .map_err(|e| MemplyError::Transport(format!("invalid address: {e}")))?;

        let message = LettreMessage::builder()
            .from(self.from_mailbox()?)
            .to(to_mailbox)
            .subject(&email.subject)
            .header(ContentType::TEXT_PLAIN)
            .body(email.body.clone())
            .map_err(|e| MemplyError::Transport(format!("build message: {e}")))?;

        let creds = Credentials::new(self.config.username.clone(), self.config.password.clone());
        let mailer = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.config.host)
            .map_err(|e| MemplyError::Transport(format!("SMTP relay: {e}")))?
            .port(self.config.port)
            .credentials(creds)
            .build();

        let response = mailer
            .send(message)
            .await
            .map_err(|e| MemplyError::Transport(e.to_string()))?;

        tracing::info!("📤 Reminder sent to {}", email.to);
        let message_id = response.message().next().map(String::from);
        Ok(SendReceipt { message_id })
    }
}
