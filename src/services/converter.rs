use async_trait::async_trait;
use std::io;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tracing::{error, info};

use crate::config::ConverterConfig;
use crate::services::workspace::Workspace;
use crate::utils::text::output_tail;

/// Bytes of converter stderr kept in a `ToolFailed` error.
pub const STDERR_TAIL_BYTES: usize = 2000;

/// Bytes of converter output written to the log on success.
const LOG_TAIL_BYTES: usize = 1000;

#[derive(Debug, Error)]
pub enum ConversionError {
    #[error("Conversion failed: {bin} could not be started ({source})")]
    ToolMissing {
        bin: String,
        #[source]
        source: io::Error,
    },

    #[error("Conversion failed ({status}): {stderr}")]
    ToolFailed { status: ExitStatus, stderr: String },

    #[error("Conversion failed: output was not created")]
    EmptyOutput,

    #[error("Conversion failed: converter did not finish within {0:?}")]
    TimedOut(Duration),

    #[error("Conversion failed: {0}")]
    Io(#[from] io::Error),
}

/// Turns an uploaded document into the output document inside a workspace.
#[async_trait]
pub trait DocumentConverter: Send + Sync {
    /// Writes `input` into the workspace, converts it, and returns the path of
    /// a non-empty output file.
    async fn convert(&self, input: &[u8], workspace: &Workspace) -> Result<PathBuf, ConversionError>;

    /// Human readable name of the tool, for health output.
    fn describe(&self) -> String;
}

/// Runs an external command as `<bin> [args...] <input> <output>`.
///
/// With calibre installed the defaults convert PDF to EPUB:
/// ```bash
/// ebook-convert input.pdf output.epub
/// ```
pub struct ExternalConverter {
    bin: String,
    args: Vec<String>,
    timeout: Option<Duration>,
}

impl ExternalConverter {
    pub fn new(bin: impl Into<String>) -> Self {
        Self {
            bin: bin.into(),
            args: Vec::new(),
            timeout: None,
        }
    }

    pub fn from_config(config: &ConverterConfig) -> Self {
        Self {
            bin: config.bin.clone(),
            args: config.args.clone(),
            timeout: config.timeout,
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

#[async_trait]
impl DocumentConverter for ExternalConverter {
    async fn convert(&self, input: &[u8], workspace: &Workspace) -> Result<PathBuf, ConversionError> {
        let input_path = workspace.input_path();
        let output_path = workspace.output_path();

        tokio::fs::write(&input_path, input).await?;
        info!(
            bin = %self.bin,
            input = %input_path.display(),
            output = %output_path.display(),
            "convert: starting"
        );

        // kill_on_drop: a timeout or a dropped request must not leave the tool running
        let child = Command::new(&self.bin)
            .args(&self.args)
            .arg(&input_path)
            .arg(&output_path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| {
                error!(bin = %self.bin, error = %source, "convert: converter not found or not executable");
                ConversionError::ToolMissing {
                    bin: self.bin.clone(),
                    source,
                }
            })?;

        let output = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, child.wait_with_output())
                .await
                .map_err(|_| {
                    error!(timeout = ?limit, "convert: converter timed out");
                    ConversionError::TimedOut(limit)
                })??,
            None => child.wait_with_output().await?,
        };

        if !output.status.success() {
            let stderr = output_tail(&output.stderr, STDERR_TAIL_BYTES);
            error!(status = %output.status, stderr = %stderr, "convert: converter failed");
            return Err(ConversionError::ToolFailed {
                status: output.status,
                stderr,
            });
        }

        let stdout = output_tail(&output.stdout, LOG_TAIL_BYTES);
        if !stdout.is_empty() {
            info!("convert: stdout (tail): {}", stdout);
        }
        let stderr = output_tail(&output.stderr, LOG_TAIL_BYTES);
        if !stderr.is_empty() {
            info!("convert: stderr (tail): {}", stderr);
        }

        let size = match tokio::fs::metadata(&output_path).await {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => 0,
            Err(e) => return Err(e.into()),
        };
        if size == 0 {
            error!(output = %output_path.display(), "convert: output missing or empty");
            return Err(ConversionError::EmptyOutput);
        }

        info!(bytes = size, "convert: success");
        Ok(output_path)
    }

    fn describe(&self) -> String {
        self.bin.clone()
    }
}
