//! Outbound mail: the `Mailer` collaborator and the captcha mail template.

use crate::config::EmailConfig;
use async_trait::async_trait;
use handlebars::Handlebars;
use lettre::message::{header::ContentType, Mailbox};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Address, Message, SmtpTransport, Transport};
use serde::Serialize;
use tokio::sync::RwLock;

/// Email errors
#[derive(Debug, thiserror::Error)]
pub enum EmailError {
    #[error("SMTP configuration error: {0}")]
    SmtpConfig(String),
    #[error("Invalid address: {0}")]
    InvalidAddress(String),
    #[error("Template error: {0}")]
    Template(String),
    #[error("Message format error: {0}")]
    MessageFormat(String),
    #[error("Send failed: {0}")]
    SendFailed(String),
}

/// Delivers a single message.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), EmailError>;
}

fn parse_address(to: &str) -> Result<Address, EmailError> {
    to.parse::<Address>()
        .map_err(|e| EmailError::InvalidAddress(format!("{}: {}", to, e)))
}

/// SMTP delivery over an implicit-TLS relay.
pub struct SmtpMailer {
    from: Mailbox,
    transport: SmtpTransport,
}

impl SmtpMailer {
    pub fn new(config: &EmailConfig) -> Result<Self, EmailError> {
        let creds = Credentials::new(config.smtp_username.clone(), config.smtp_password.clone());

        let transport = SmtpTransport::relay(&config.smtp_host)
            .map_err(|e| EmailError::SmtpConfig(e.to_string()))?
            .port(config.smtp_port)
            .credentials(creds)
            .build();

        let from = Mailbox::new(
            Some(config.from_name.clone()),
            parse_address(&config.from_email)?,
        );

        Ok(Self { from, transport })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), EmailError> {
        let message = Message::builder()
            .from(self.from.clone())
            .to(Mailbox::new(None, parse_address(to)?))
            .subject(subject)
            .header(ContentType::TEXT_HTML)
            .body(body.to_string())
            .map_err(|e| EmailError::MessageFormat(e.to_string()))?;

        // SmtpTransport is blocking
        let transport = self.transport.clone();
        tokio::task::spawn_blocking(move || transport.send(&message))
            .await
            .map_err(|e| EmailError::SendFailed(e.to_string()))?
            .map_err(|e| EmailError::SendFailed(e.to_string()))?;

        tracing::info!("Mail \"{}\" delivered to {}", subject, to);
        Ok(())
    }
}

/// A message captured by [`OutboxMailer`].
#[derive(Debug, Clone, PartialEq)]
pub struct SentMail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Keeps messages in memory instead of delivering them. Used when no SMTP
/// host is configured, and by tests.
#[derive(Default)]
pub struct OutboxMailer {
    sent: RwLock<Vec<SentMail>>,
}

impl OutboxMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn sent(&self) -> Vec<SentMail> {
        self.sent.read().await.clone()
    }

    /// Most recent message addressed to `to`.
    pub async fn last_to(&self, to: &str) -> Option<SentMail> {
        self.sent
            .read()
            .await
            .iter()
            .rev()
            .find(|mail| mail.to == to)
            .cloned()
    }
}

#[async_trait]
impl Mailer for OutboxMailer {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), EmailError> {
        parse_address(to)?;
        self.sent.write().await.push(SentMail {
            to: to.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
        });
        tracing::debug!("Mail \"{}\" queued in outbox for {}", subject, to);
        Ok(())
    }
}

#[derive(Serialize)]
struct CaptchaMail<'a> {
    product: &'a str,
    code: &'a str,
    minutes: i64,
}

/// Handlebars templates for generated mail.
pub struct MailTemplates {
    product: String,
    registry: Handlebars<'static>,
}

impl MailTemplates {
    pub fn new(product: impl Into<String>) -> Result<Self, EmailError> {
        let mut registry = Handlebars::new();
        registry.set_strict_mode(true);
        registry
            .register_template_string("captcha", include_str!("../templates/captcha.html"))
            .map_err(|e| EmailError::Template(e.to_string()))?;

        Ok(Self {
            product: product.into(),
            registry,
        })
    }

    pub fn captcha_subject(&self) -> String {
        format!("{} verification code", self.product)
    }

    pub fn render_captcha(&self, code: &str, minutes: i64) -> Result<String, EmailError> {
        let data = CaptchaMail {
            product: &self.product,
            code,
            minutes,
        };
        self.registry
            .render("captcha", &data)
            .map_err(|e| EmailError::Template(e.to_string()))
    }
}
