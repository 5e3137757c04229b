//! SMTP email transport (async lettre, STARTTLS).

use async_trait::async_trait;
use lettre::message::Mailbox;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use medinotify_core::config::EmailTransportConfig;
use medinotify_core::{DeliveryTransport, NotifyError, Result};

pub struct EmailTransport {
    from: Mailbox,
    subject: String,
    mailer: AsyncSmtpTransport<Tokio1Executor>,
}

impl EmailTransport {
    /// Build the SMTP client. Does not connect; the first send does.
    pub fn new(config: &EmailTransportConfig) -> Result<Self> {
        let from: Mailbox = config
            .from
            .parse()
            .map_err(|e| NotifyError::Config(format!("Invalid from '{}': {e}", config.from)))?;

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)
            .map_err(|e| NotifyError::Config(format!("SMTP relay: {e}")))?
            .port(config.smtp_port);
        if !config.username.is_empty() {
            builder = builder.credentials(Credentials::new(
                config.username.clone(),
                config.password.clone(),
            ));
        }

        Ok(Self {
            from,
            subject: config.subject.clone(),
            mailer: builder.build(),
        })
    }

    fn build_message(&self, to: &str, body: &str) -> Result<Message> {
        let to: Mailbox = to
            .parse()
            .map_err(|e| NotifyError::Undeliverable(format!("Invalid to '{to}': {e}")))?;
        Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(self.subject.as_str())
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())
            .map_err(|e| NotifyError::Undeliverable(format!("Build email: {e}")))
    }
}

#[async_trait]
impl DeliveryTransport for EmailTransport {
    fn name(&self) -> &str {
        "email"
    }

    async fn send(&self, recipient: &str, content: &str) -> Result<()> {
        let message = self.build_message(recipient, content)?;
        self.mailer
            .send(message)
            .await
            .map_err(|e| NotifyError::Delivery(format!("SMTP send: {e}")))?;
        tracing::info!("📤 Email sent to: {recipient}");
        Ok(())
    }
}
