//! SMTP delivery of the converted document.

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info};

use crate::config::SmtpConfig;

/// MIME type of the mailed attachment.
pub const EPUB_CONTENT_TYPE: &str = "application/epub+zip";

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("SMTP_HOST is not set")]
    TransportNotConfigured,

    #[error("Attachment not found")]
    AttachmentMissing,

    #[error("Email failed: SMTP authentication failed (check SMTP_USER/SMTP_PASS)")]
    AuthFailed,

    #[error("Email failed: {0}")]
    DeliveryFailed(String),

    #[error("Email failed: invalid message: {0}")]
    InvalidMessage(String),
}

/// A file on disk to attach, read fully into memory before sending.
#[derive(Debug, Clone)]
pub struct AttachmentSource {
    pub path: PathBuf,
    pub filename: String,
    pub content_type: String,
}

#[derive(Debug, Clone)]
pub struct MailMessage {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub body: String,
    pub attachment: Option<AttachmentSource>,
}

/// Hands one fully built message to a mail server.
#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(&self, message: Message) -> Result<(), DeliveryError>;
}

/// lettre SMTP transport: one session per message, STARTTLS before AUTH when enabled.
pub struct SmtpMailTransport {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpMailTransport {
    pub fn new(host: &str, config: &SmtpConfig) -> Result<Self, DeliveryError> {
        let builder = if config.use_tls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
                .map_err(|e| DeliveryError::DeliveryFailed(e.to_string()))?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host)
        };

        let builder = builder.port(config.port).timeout(Some(config.timeout));
        let builder = match &config.username {
            Some(user) => builder.credentials(Credentials::new(
                user.clone(),
                config.password.clone().unwrap_or_default(),
            )),
            None => builder,
        };

        info!(
            host = %host,
            port = config.port,
            tls = config.use_tls,
            user_set = config.username.is_some(),
            "SMTP transport initialized"
        );

        Ok(Self {
            mailer: builder.build(),
        })
    }
}

#[async_trait]
impl MailTransport for SmtpMailTransport {
    async fn send(&self, message: Message) -> Result<(), DeliveryError> {
        self.mailer.send(message).await.map(|_| ()).map_err(|e| {
            let code = e.status().map(|code| code.to_string());
            if code.as_deref().is_some_and(is_auth_rejection) {
                error!(error = %e, "email: authentication failed");
                DeliveryError::AuthFailed
            } else {
                error!(error = %e, "email: send failed");
                DeliveryError::DeliveryFailed(e.to_string())
            }
        })
    }
}

/// SMTP replies that mean the server refused our credentials.
pub fn is_auth_rejection(code: &str) -> bool {
    matches!(code, "530" | "534" | "535" | "538")
}

/// Validates and assembles outgoing mail, then passes it to the transport.
#[derive(Clone)]
pub struct MailDispatcher {
    transport: Option<Arc<dyn MailTransport>>,
    from: String,
}

impl MailDispatcher {
    /// Builds the SMTP-backed dispatcher. Without `SMTP_HOST` every delivery
    /// fails with `TransportNotConfigured`.
    pub fn from_config(config: &SmtpConfig) -> Result<Self, DeliveryError> {
        let transport = match &config.host {
            Some(host) => Some(Arc::new(SmtpMailTransport::new(host, config)?) as Arc<dyn MailTransport>),
            None => {
                tracing::warn!("SMTP_HOST is not set; email delivery is disabled");
                None
            }
        };
        Ok(Self {
            transport,
            from: config.from.clone(),
        })
    }

    pub fn with_transport(transport: Arc<dyn MailTransport>, from: impl Into<String>) -> Self {
        Self {
            transport: Some(transport),
            from: from.into(),
        }
    }

    pub fn unconfigured(from: impl Into<String>) -> Self {
        Self {
            transport: None,
            from: from.into(),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.transport.is_some()
    }

    pub fn sender(&self) -> &str {
        &self.from
    }

    /// Sends exactly one message. Nothing is retried here.
    pub async fn deliver(&self, message: MailMessage) -> Result<(), DeliveryError> {
        info!(to = %message.to, from = %message.from, "email: preparing message");

        let transport = self.transport.as_ref().ok_or_else(|| {
            error!("email: SMTP_HOST is not set");
            DeliveryError::TransportNotConfigured
        })?;

        let attachment = match &message.attachment {
            Some(source) => {
                if !tokio::fs::try_exists(&source.path).await.unwrap_or(false) {
                    error!(path = %source.path.display(), "email: attachment missing");
                    return Err(DeliveryError::AttachmentMissing);
                }
                let data = tokio::fs::read(&source.path).await.map_err(|e| {
                    error!(path = %source.path.display(), error = %e, "email: attachment unreadable");
                    DeliveryError::AttachmentMissing
                })?;
                info!(attachment = %source.filename, bytes = data.len(), "email: attachment loaded");
                Some((source, data))
            }
            None => None,
        };

        let email = build_message(&message, attachment)?;

        info!("email: sending");
        transport.send(email).await?;
        info!(to = %message.to, "email: sent ok");
        Ok(())
    }
}

fn build_message(
    message: &MailMessage,
    attachment: Option<(&AttachmentSource, Vec<u8>)>,
) -> Result<Message, DeliveryError> {
    let from: Mailbox = message
        .from
        .parse()
        .map_err(|e| DeliveryError::InvalidMessage(format!("invalid sender address: {}", e)))?;
    let to: Mailbox = message
        .to
        .parse()
        .map_err(|e| DeliveryError::InvalidMessage(format!("invalid recipient address: {}", e)))?;

    let builder = Message::builder().from(from).to(to).subject(message.subject.as_str());

    let built = match attachment {
        Some((source, data)) => {
            let content_type = ContentType::parse(&source.content_type)
                .map_err(|e| DeliveryError::InvalidMessage(e.to_string()))?;
            builder.multipart(
                MultiPart::mixed()
                    .singlepart(SinglePart::plain(message.body.clone()))
                    .singlepart(Attachment::new(source.filename.clone()).body(data, content_type)),
            )
        }
        None => builder
            .header(ContentType::TEXT_PLAIN)
            .body(message.body.clone()),
    };

    built.map_err(|e| DeliveryError::InvalidMessage(e.to_string()))
}
