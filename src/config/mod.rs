use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Placeholder secret shipped in the defaults; startup warns when it is still in use.
pub const DEFAULT_BEARER_TOKEN: &str = "change-me";

/// Service configuration, read once at startup and shared read-only afterwards.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Shared secret expected in `Authorization: Bearer <token>` (default: "change-me")
    pub bearer_token: String,

    /// Address every converted document is mailed to
    pub recipient: String,

    /// Maximum accepted upload size in bytes (default: 25 MB)
    pub max_upload_bytes: usize,

    /// Directory under which per-request workspaces are created (default: system temp dir)
    pub workspace_root: PathBuf,

    pub converter: ConverterConfig,

    pub smtp: SmtpConfig,

    /// Listen address (default: "0.0.0.0")
    pub host: String,

    /// Listen port (default: 8000)
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct ConverterConfig {
    /// Converter executable (default: "ebook-convert")
    pub bin: String,

    /// Extra arguments placed before the input/output paths
    pub args: Vec<String>,

    /// Upper bound on a single conversion (default: 600s)
    pub timeout: Option<Duration>,
}

#[derive(Debug, Clone)]
pub struct SmtpConfig {
    /// SMTP relay host; `None` disables delivery entirely
    pub host: Option<String>,

    /// SMTP port (default: 587)
    pub port: u16,

    pub username: Option<String>,

    pub password: Option<String>,

    /// Envelope/header sender (default: username or "noreply@example.com")
    pub from: String,

    /// Require STARTTLS before authenticating (default: true)
    pub use_tls: bool,

    /// Connect and command timeout (default: 30s)
    pub timeout: Duration,
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            bin: "ebook-convert".to_string(),
            args: Vec::new(),
            timeout: Some(Duration::from_secs(600)),
        }
    }
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            host: None,
            port: 587,
            username: None,
            password: None,
            from: "noreply@example.com".to_string(),
            use_tls: true,
            timeout: Duration::from_secs(30),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bearer_token: DEFAULT_BEARER_TOKEN.to_string(),
            recipient: "change-me".to_string(),
            max_upload_bytes: 25 * 1024 * 1024, // 25 MB
            workspace_root: env::temp_dir(),
            converter: ConverterConfig::default(),
            smtp: SmtpConfig::default(),
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup. Unset or empty
    /// values fall back to the defaults; unparsable numbers do too.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let default = Self::default();

        let username = get("SMTP_USER");
        let from = get("SMTP_FROM")
            .or_else(|| username.clone())
            .unwrap_or(default.smtp.from);

        let smtp = SmtpConfig {
            host: get("SMTP_HOST"),
            port: get("SMTP_PORT")
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.smtp.port),
            username,
            password: get("SMTP_PASS"),
            from,
            use_tls: get("SMTP_TLS")
                .map(|v| parse_flag(&v))
                .unwrap_or(default.smtp.use_tls),
            timeout: get("SMTP_TIMEOUT_SECS")
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(default.smtp.timeout),
        };

        // 0 turns the conversion deadline off
        let timeout = match get("CONVERT_TIMEOUT_SECS").and_then(|v| v.parse::<u64>().ok()) {
            Some(0) => None,
            Some(secs) => Some(Duration::from_secs(secs)),
            None => default.converter.timeout,
        };

        let converter = ConverterConfig {
            bin: get("EBOOK_CONVERT_BIN").unwrap_or(default.converter.bin),
            args: get("EBOOK_CONVERT_ARGS")
                .map(|v| v.split_whitespace().map(str::to_string).collect())
                .unwrap_or_default(),
            timeout,
        };

        Self {
            bearer_token: get("BEARER_TOKEN").unwrap_or(default.bearer_token),
            recipient: get("KINDLE_EMAIL").unwrap_or(default.recipient),
            max_upload_bytes: get("MAX_PDF_BYTES")
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.max_upload_bytes),
            workspace_root: get("WORKSPACE_DIR")
                .map(PathBuf::from)
                .unwrap_or(default.workspace_root),
            converter,
            smtp,
            host: get("HOST").unwrap_or(default.host),
            port: get("PORT")
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.port),
        }
    }

    /// Create config for local development and tests (no SMTP relay, short timeouts)
    pub fn development() -> Self {
        Self {
            bearer_token: "dev-token".to_string(),
            recipient: "reader@example.com".to_string(),
            converter: ConverterConfig {
                timeout: Some(Duration::from_secs(60)),
                ..ConverterConfig::default()
            },
            smtp: SmtpConfig {
                use_tls: false,
                timeout: Duration::from_secs(5),
                ..SmtpConfig::default()
            },
            host: "127.0.0.1".to_string(),
            ..Self::default()
        }
    }

    pub fn uses_default_token(&self) -> bool {
        self.bearer_token == DEFAULT_BEARER_TOKEN
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(value.trim().to_lowercase().as_str(), "1" | "true" | "yes")
}
