use std::path::Path;
use thiserror::Error;

/// Content types accepted for upload: the document type itself and the
/// generic fallback browsers and CLI clients send for unknown files.
pub fn accepted_content_types() -> [mime::Mime; 2] {
    [mime::APPLICATION_PDF, mime::APPLICATION_OCTET_STREAM]
}

/// Extension of the converted artifact mailed to the recipient.
pub const OUTPUT_EXTENSION: &str = "epub";

/// Attachment name used when the upload carries no usable filename.
pub const FALLBACK_ATTACHMENT_NAME: &str = "output.epub";

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("Expected PDF, got {content_type}")]
    UnsupportedType { content_type: String },

    #[error("PDF too large (limit is {max_bytes} bytes)")]
    PayloadTooLarge { max_bytes: usize },

    #[error("No file provided")]
    MissingFile,

    #[error("Malformed upload: {0}")]
    Malformed(String),
}

/// Checks the declared type and size of an in-memory upload.
#[derive(Debug, Clone)]
pub struct UploadValidator {
    max_bytes: usize,
}

impl UploadValidator {
    pub fn new(max_bytes: usize) -> Self {
        Self { max_bytes }
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    /// Type is checked before size, so an oversized upload of the wrong type
    /// reports `UnsupportedType`.
    pub fn validate(&self, payload: &[u8], declared_content_type: &str) -> Result<(), UploadError> {
        validate_content_type(declared_content_type)?;

        if payload.len() > self.max_bytes {
            tracing::warn!(
                size = payload.len(),
                max = self.max_bytes,
                "validate: upload too large"
            );
            return Err(UploadError::PayloadTooLarge {
                max_bytes: self.max_bytes,
            });
        }

        tracing::debug!(size = payload.len(), "validate: ok");
        Ok(())
    }
}

/// Validates a declared content type against the accepted set. Parameters
/// and letter case are ignored.
pub fn validate_content_type(content_type: &str) -> Result<(), UploadError> {
    let accepted = content_type
        .trim()
        .to_lowercase()
        .parse::<mime::Mime>()
        .map(|declared| {
            accepted_content_types()
                .iter()
                .any(|accepted| accepted.essence_str() == declared.essence_str())
        })
        .unwrap_or(false);

    if accepted {
        return Ok(());
    }

    tracing::warn!(content_type = %content_type, "validate: unsupported content type");
    Err(UploadError::UnsupportedType {
        content_type: content_type.to_string(),
    })
}

/// Reduces a client-supplied filename to a safe final path component.
/// Returns `None` when nothing usable is left.
pub fn sanitize_filename(filename: &str) -> Option<String> {
    // Backslashes count as separators too; Path only splits on '/' here
    let name = filename.rsplit(['/', '\\']).next().unwrap_or("");
    let name = Path::new(name).file_name().and_then(|n| n.to_str())?;

    let sanitized: String = name
        .chars()
        .map(|c| {
            if c.is_control() || matches!(c, ':' | '*' | '?' | '"' | '<' | '>' | '|' | ';') {
                '_'
            } else {
                c
            }
        })
        .collect();

    let sanitized = sanitized.trim_start_matches('.').trim();
    if sanitized.is_empty() {
        return None;
    }

    // Limit length safely for UTF-8
    let mut end = sanitized.len().min(200);
    while !sanitized.is_char_boundary(end) {
        end -= 1;
    }
    Some(sanitized[..end].to_string())
}

/// Name of the mailed attachment: the upload's stem with the output extension.
pub fn attachment_name(filename_hint: Option<&str>) -> String {
    filename_hint
        .and_then(sanitize_filename)
        .and_then(|name| {
            Path::new(&name)
                .file_stem()
                .and_then(|s| s.to_str())
                .map(str::to_string)
        })
        .filter(|stem| !stem.is_empty())
        .map(|stem| format!("{}.{}", stem, OUTPUT_EXTENSION))
        .unwrap_or_else(|| FALLBACK_ATTACHMENT_NAME.to_string())
}
