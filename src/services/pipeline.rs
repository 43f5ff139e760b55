//! Per-request conversion and delivery.
//!
//! Stages run strictly in order: auth, validate, workspace, convert, deliver.
//! The first failure ends the request; the workspace is released on every
//! path once it has been acquired.

use bytes::Bytes;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::config::AppConfig;
use crate::services::authorizer::{AuthError, Authorized, Authorizer};
use crate::services::converter::{ConversionError, DocumentConverter};
use crate::services::mailer::{
    AttachmentSource, DeliveryError, EPUB_CONTENT_TYPE, MailDispatcher, MailMessage,
};
use crate::services::workspace::{WorkspaceError, WorkspaceManager};
use crate::utils::validation::{UploadError, UploadValidator, attachment_name};

const CONVERTED_SUBJECT: &str = "Your converted EPUB";
const CONVERTED_BODY: &str = "Attached is the EPUB converted from your PDF.";
const TEST_SUBJECT: &str = "SMTP test (no attachment)";
const TEST_BODY: &str = "If you received this, SMTP is working.";

/// Pipeline stage a request failed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Auth,
    Validate,
    Workspace,
    Convert,
    Deliver,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Auth => "auth",
            Stage::Validate => "validate",
            Stage::Workspace => "workspace",
            Stage::Convert => "convert",
            Stage::Deliver => "deliver",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Upload(#[from] UploadError),

    #[error(transparent)]
    Workspace(#[from] WorkspaceError),

    #[error(transparent)]
    Conversion(#[from] ConversionError),

    #[error(transparent)]
    Delivery(#[from] DeliveryError),
}

impl PipelineError {
    pub fn stage(&self) -> Stage {
        match self {
            PipelineError::Auth(_) => Stage::Auth,
            PipelineError::Upload(_) => Stage::Validate,
            PipelineError::Workspace(_) => Stage::Workspace,
            PipelineError::Conversion(_) => Stage::Convert,
            PipelineError::Delivery(_) => Stage::Deliver,
        }
    }
}

/// An uploaded document, held in memory for the length of one request.
#[derive(Debug, Clone)]
pub struct Upload {
    pub data: Bytes,
    pub content_type: String,
    pub filename: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub sent_to: String,
}

pub struct ConversionPipeline {
    authorizer: Authorizer,
    validator: UploadValidator,
    workspaces: WorkspaceManager,
    converter: Arc<dyn DocumentConverter>,
    mailer: MailDispatcher,
    recipient: String,
}

impl ConversionPipeline {
    pub fn new(
        config: &AppConfig,
        converter: Arc<dyn DocumentConverter>,
        mailer: MailDispatcher,
    ) -> Self {
        Self {
            authorizer: Authorizer::new(config.bearer_token.clone()),
            validator: UploadValidator::new(config.max_upload_bytes),
            workspaces: WorkspaceManager::new(config.workspace_root.clone()),
            converter,
            mailer,
            recipient: config.recipient.clone(),
        }
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.validator.max_bytes()
    }

    pub fn converter_name(&self) -> String {
        self.converter.describe()
    }

    pub fn mail_configured(&self) -> bool {
        self.mailer.is_configured()
    }

    /// Received -> Authorized
    pub fn authorize(&self, header: Option<&str>) -> Result<Authorized, PipelineError> {
        Ok(self.authorizer.authorize(header)?)
    }

    /// Authorized -> Validated -> WorkspaceAcquired -> Converted -> Delivered -> Done
    pub async fn convert_and_deliver(
        &self,
        _auth: Authorized,
        upload: Upload,
    ) -> Result<Delivery, PipelineError> {
        info!(
            filename = ?upload.filename,
            content_type = %upload.content_type,
            bytes = upload.data.len(),
            max = self.validator.max_bytes(),
            "request: validating upload"
        );
        self.validator.validate(&upload.data, &upload.content_type)?;

        let workspace = self.workspaces.acquire().map_err(|e| {
            error!(error = %e, "request: could not create workspace");
            e
        })?;
        info!(path = %workspace.path().display(), "request: workspace acquired");

        // Everything between acquire and release is collected into one result
        // so release runs exactly once below, whatever the outcome.
        let outcome = async {
            let output = self.converter.convert(&upload.data, &workspace).await?;
            info!(to = %self.recipient, "request: emailing converted document");
            self.mailer
                .deliver(MailMessage {
                    from: self.mailer.sender().to_string(),
                    to: self.recipient.clone(),
                    subject: CONVERTED_SUBJECT.to_string(),
                    body: CONVERTED_BODY.to_string(),
                    attachment: Some(AttachmentSource {
                        path: output,
                        filename: attachment_name(upload.filename.as_deref()),
                        content_type: EPUB_CONTENT_TYPE.to_string(),
                    }),
                })
                .await?;
            Ok::<_, PipelineError>(())
        }
        .await;

        if let Err(e) = workspace.release() {
            // The request's own outcome wins over a cleanup failure
            warn!(error = %e, "request: workspace cleanup failed");
        }

        match outcome {
            Ok(()) => {
                info!(to = %self.recipient, "request: done");
                Ok(Delivery {
                    sent_to: self.recipient.clone(),
                })
            }
            Err(e) => {
                error!(stage = %e.stage(), error = %e, "request: failed");
                Err(e)
            }
        }
    }

    /// Sends a message without attachment to check the SMTP settings.
    pub async fn send_test_email(&self, _auth: Authorized) -> Result<Delivery, PipelineError> {
        info!(to = %self.recipient, "test-email: sending");
        self.mailer
            .deliver(MailMessage {
                from: self.mailer.sender().to_string(),
                to: self.recipient.clone(),
                subject: TEST_SUBJECT.to_string(),
                body: TEST_BODY.to_string(),
                attachment: None,
            })
            .await
            .map_err(|e| {
                error!(error = %e, "test-email: failed");
                PipelineError::from(e)
            })?;

        Ok(Delivery {
            sent_to: self.recipient.clone(),
        })
    }
}
