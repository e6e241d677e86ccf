//! Outbound email.
//!
//! The only message the service sends is the password-reset link. Delivery is
//! behind the [`Mailer`] trait so the SMTP relay can be swapped for a logging
//! or in-memory implementation.

use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{info, instrument};
use url::Url;

use crate::config::MailConfig;
use crate::errors::ServiceError;

pub const RESET_SUBJECT: &str = "Reset your password";

/// A plain-text email
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailMessage {
    pub to: String,
    pub bcc: Option<String>,
    pub subject: String,
    pub body: String,
}

#[derive(Debug, Error)]
pub enum MailError {
    #[error("Invalid address '{0}'")]
    InvalidAddress(String),
    #[error("Invalid reset link: {0}")]
    InvalidLink(String),
    #[error("Message build failed: {0}")]
    Build(String),
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Mail configuration error: {0}")]
    Config(String),
}

impl From<MailError> for ServiceError {
    fn from(err: MailError) -> Self {
        match err {
            MailError::Transport(msg) => ServiceError::ExternalServiceError(msg),
            other => ServiceError::InternalError(other.to_string()),
        }
    }
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: MailMessage) -> Result<(), MailError>;
}

fn mailbox(address: &str) -> Result<Mailbox, MailError> {
    address
        .parse::<Mailbox>()
        .map_err(|_| MailError::InvalidAddress(address.to_string()))
}

/// Delivers through an SMTP relay with STARTTLS
#[derive(Clone)]
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn from_config(config: &MailConfig) -> Result<Self, MailError> {
        let host = config
            .smtp_host
            .as_deref()
            .ok_or_else(|| MailError::Config("smtp_host is required".to_string()))?;

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
            .map_err(|e| MailError::Config(e.to_string()))?
            .port(config.smtp_port);
        if let (Some(user), Some(pass)) = (&config.smtp_username, &config.smtp_password) {
            builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }

        Ok(Self {
            transport: builder.build(),
            from: mailbox(&config.from_address)?,
        })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    #[instrument(skip(self, message), fields(subject = %message.subject))]
    async fn send(&self, message: MailMessage) -> Result<(), MailError> {
        let mut builder = Message::builder()
            .from(self.from.clone())
            .to(mailbox(&message.to)?)
            .subject(message.subject)
            .header(ContentType::TEXT_PLAIN);
        if let Some(bcc) = message.bcc.as_deref() {
            builder = builder.bcc(mailbox(bcc)?);
        }
        let email = builder
            .body(message.body)
            .map_err(|e| MailError::Build(e.to_string()))?;

        self.transport
            .send(email)
            .await
            .map_err(|e| MailError::Transport(e.to_string()))?;

        info!("Mail handed to SMTP relay");
        Ok(())
    }
}

/// Drops messages after logging the envelope. Development only; bodies carry
/// reset tokens and never reach the log.
#[derive(Debug, Clone, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, message: MailMessage) -> Result<(), MailError> {
        mailbox(&message.to)?;
        info!(
            to = %message.to,
            subject = %message.subject,
            body_len = message.body.len(),
            "Mail backend is 'log'; message not delivered"
        );
        Ok(())
    }
}

/// Records messages in memory; can be told to fail like an unreachable relay.
#[derive(Debug, Clone, Default)]
pub struct InMemoryMailer {
    sent: Arc<RwLock<Vec<MailMessage>>>,
    fail: Arc<AtomicBool>,
}

impl InMemoryMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.fail.store(failing, Ordering::SeqCst);
    }

    pub async fn sent(&self) -> Vec<MailMessage> {
        self.sent.read().await.clone()
    }
}

#[async_trait]
impl Mailer for InMemoryMailer {
    async fn send(&self, message: MailMessage) -> Result<(), MailError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(MailError::Transport("relay unavailable".to_string()));
        }
        mailbox(&message.to)?;
        self.sent.write().await.push(message);
        Ok(())
    }
}

/// Picks the mailer named by `mail.backend`.
pub fn build_mailer(config: &MailConfig) -> Result<Arc<dyn Mailer>, MailError> {
    if config.uses_smtp() {
        Ok(Arc::new(SmtpMailer::from_config(config)?))
    } else {
        Ok(Arc::new(LogMailer))
    }
}

/// `{base}?email=..&token=..` with both values form-encoded.
pub fn reset_link(base: &str, email: &str, token: &str) -> Result<Url, MailError> {
    let mut url = Url::parse(base).map_err(|e| MailError::InvalidLink(e.to_string()))?;
    url.query_pairs_mut()
        .append_pair("email", email)
        .append_pair("token", token);
    Ok(url)
}

pub fn password_reset_message(
    config: &MailConfig,
    email: &str,
    token: &str,
) -> Result<MailMessage, MailError> {
    let link = reset_link(&config.reset_link_base, email, token)?;
    let minutes = config.reset_token_ttl_secs / 60;

    Ok(MailMessage {
        to: email.to_string(),
        bcc: config.bcc_address.clone(),
        subject: RESET_SUBJECT.to_string(),
        body: format!(
            "We received a request to reset the password for {email}.\n\n\
             Open the link below to choose a new password. It expires in {minutes} minutes \
             and can be used once.\n\n{link}\n\n\
             If you did not ask for this, you can ignore this email."
        ),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_link_encodes_query_values() {
        let link = reset_link("https://shop.example.com/reset", "a+b@example.com", "tok_-1").unwrap();
        assert_eq!(
            link.as_str(),
            "https://shop.example.com/reset?email=a%2Bb%40example.com&token=tok_-1"
        );
    }

    #[test]
    fn reset_link_rejects_relative_base() {
        assert!(matches!(
            reset_link("/reset", "a@example.com", "t"),
            Err(MailError::InvalidLink(_))
        ));
    }

    #[test]
    fn reset_message_carries_link_and_bcc() {
        let config = MailConfig {
            bcc_address: Some("audit@example.com".to_string()),
            reset_link_base: "https://shop.example.com/reset".to_string(),
            ..MailConfig::default()
        };

        let message = password_reset_message(&config, "user@example.com", "abc").unwrap();
        assert_eq!(message.to, "user@example.com");
        assert_eq!(message.subject, RESET_SUBJECT);
        assert_eq!(message.bcc.as_deref(), Some("audit@example.com"));
        assert!(message
            .body
            .contains("https://shop.example.com/reset?email=user%40example.com&token=abc"));
        assert!(message.body.contains("30 minutes"));
    }

    #[tokio::test]
    async fn in_memory_mailer_records_and_fails_on_demand() {
        let mailer = InMemoryMailer::new();
        let message = MailMessage {
            to: "x@example.com".to_string(),
            bcc: None,
            subject: "s".to_string(),
            body: "b".to_string(),
        };

        mailer.send(message.clone()).await.unwrap();
        assert_eq!(mailer.sent().await, vec![message.clone()]);

        mailer.set_failing(true);
        let err = mailer.send(message).await.unwrap_err();
        assert!(matches!(
            ServiceError::from(err),
            ServiceError::ExternalServiceError(_)
        ));
        assert_eq!(mailer.sent().await.len(), 1);
    }

    #[derive(Clone, Default)]
    struct Captured(Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn log_mailer_keeps_reset_links_out_of_the_log() {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let message =
            password_reset_message(&MailConfig::default(), "user@example.com", "s3cr3t-token")
                .unwrap();
        LogMailer.send(message).await.unwrap();

        let logged = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
        assert!(logged.contains("message not delivered"));
        assert!(logged.contains(RESET_SUBJECT));
        assert!(!logged.contains("s3cr3t-token"));
    }

    #[test]
    fn smtp_backend_requires_host() {
        let config = MailConfig {
            backend: "smtp".to_string(),
            ..MailConfig::default()
        };
        assert!(matches!(build_mailer(&config), Err(MailError::Config(_))));
    }
}
