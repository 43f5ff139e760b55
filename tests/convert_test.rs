use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use http_body_util::BodyExt;
use lettre::Message;
use pdf2epub_mailer::config::AppConfig;
use pdf2epub_mailer::services::converter::{ConversionError, DocumentConverter};
use pdf2epub_mailer::services::mailer::{DeliveryError, MailDispatcher, MailTransport};
use pdf2epub_mailer::services::pipeline::ConversionPipeline;
use pdf2epub_mailer::services::workspace::Workspace;
use pdf2epub_mailer::{AppState, create_app};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tower::ServiceExt;

const TOKEN: &str = "dev-token";
const BOUNDARY: &str = "---------------------------123456789012345678901234567";
const MAX_BYTES: usize = 1024;

/// Stand-in for the external tool: writes a fake EPUB, or fails like a
/// converter that exited non-zero.
struct FakeConverter {
    fail_with: Option<String>,
}

#[async_trait]
impl DocumentConverter for FakeConverter {
    async fn convert(&self, input: &[u8], workspace: &Workspace) -> Result<PathBuf, ConversionError> {
        tokio::fs::write(workspace.input_path(), input).await?;
        if let Some(stderr) = &self.fail_with {
            return Err(ConversionError::ToolFailed {
                status: failed_status(),
                stderr: stderr.clone(),
            });
        }
        tokio::fs::write(workspace.output_path(), b"PK\x03\x04mimetypeapplication/epub+zip").await?;
        Ok(workspace.output_path())
    }

    fn describe(&self) -> String {
        "fake-convert".to_string()
    }
}

#[cfg(unix)]
fn failed_status() -> std::process::ExitStatus {
    use std::os::unix::process::ExitStatusExt;
    std::process::ExitStatus::from_raw(1 << 8)
}

#[cfg(not(unix))]
fn failed_status() -> std::process::ExitStatus {
    use std::os::windows::process::ExitStatusExt;
    std::process::ExitStatus::from_raw(1)
}

#[derive(Default)]
struct RecordingTransport {
    sent: Mutex<Vec<String>>,
}

#[async_trait]
impl MailTransport for RecordingTransport {
    async fn send(&self, message: Message) -> Result<(), DeliveryError> {
        let raw = String::from_utf8_lossy(&message.formatted()).to_string();
        self.sent.lock().unwrap().push(raw);
        Ok(())
    }
}

struct TestApp {
    app: Router,
    transport: Arc<RecordingTransport>,
    workspace_root: TempDir,
}

fn setup(fail_with: Option<String>, mail_configured: bool) -> TestApp {
    let workspace_root = tempfile::tempdir().unwrap();
    let config = AppConfig {
        max_upload_bytes: MAX_BYTES,
        workspace_root: workspace_root.path().to_path_buf(),
        ..AppConfig::development()
    };

    let transport = Arc::new(RecordingTransport::default());
    let mailer = if mail_configured {
        MailDispatcher::with_transport(transport.clone(), "sender@example.com")
    } else {
        MailDispatcher::unconfigured("sender@example.com")
    };

    let pipeline = ConversionPipeline::new(&config, Arc::new(FakeConverter { fail_with }), mailer);
    let app = create_app(AppState {
        pipeline: Arc::new(pipeline),
        config: Arc::new(config),
    });

    TestApp {
        app,
        transport,
        workspace_root,
    }
}

fn multipart_body(filename: &str, content_type: &str, data: &[u8]) -> Vec<u8> {
    let mut body = format!(
        "--{boundary}\r\n\
        Content-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\n\
        Content-Type: {content_type}\r\n\r\n",
        boundary = BOUNDARY,
        filename = filename,
        content_type = content_type
    )
    .into_bytes();
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());
    body
}

fn convert_request(auth: Option<&str>, body: Vec<u8>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/convert")
        .header("Content-Type", format!("multipart/form-data; boundary={}", BOUNDARY));
    if let Some(auth) = auth {
        builder = builder.header("Authorization", auth);
    }
    builder.body(Body::from(body)).unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, json)
}

fn workspace_is_clean(root: &Path) -> bool {
    std::fs::read_dir(root).unwrap().next().is_none()
}

fn bearer() -> String {
    format!("Bearer {}", TOKEN)
}

#[tokio::test]
async fn test_convert_and_deliver() {
    let t = setup(None, true);
    let body = multipart_body("Moby Dick.pdf", "application/pdf", b"%PDF-1.4 small document");

    let (status, json) = send(&t.app, convert_request(Some(&bearer()), body)).await;

    assert_eq!(status, StatusCode::OK, "body: {}", json);
    assert_eq!(json["ok"], true);
    assert_eq!(json["sent_to"], "reader@example.com");

    let sent = t.transport.sent.lock().unwrap();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].contains("To: reader@example.com"));
    assert!(sent[0].contains("application/epub+zip"));
    assert!(sent[0].contains("Moby Dick.epub"));
    drop(sent);

    assert!(workspace_is_clean(t.workspace_root.path()));
}

#[tokio::test]
async fn test_octet_stream_is_accepted() {
    let t = setup(None, true);
    let body = multipart_body("upload.bin", "application/octet-stream", b"%PDF-1.7");

    let (status, _) = send(&t.app, convert_request(Some(&bearer()), body)).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_auth_failures() {
    let t = setup(None, true);
    let body = || multipart_body("a.pdf", "application/pdf", b"%PDF");

    let (status, json) = send(&t.app, convert_request(None, body())).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["stage"], "auth");

    let (status, _) = send(&t.app, convert_request(Some("Bearer "), body())).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(&t.app, convert_request(Some("Token dev-token"), body())).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, json) = send(&t.app, convert_request(Some("Bearer wrong"), body())).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(json["error"], "Invalid bearer token");

    assert!(t.transport.sent.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_auth_checked_before_body() {
    let t = setup(None, true);
    let request = Request::builder()
        .method("POST")
        .uri("/convert")
        .header("Content-Type", "application/json")
        .body(Body::from("{}"))
        .unwrap();

    let (status, _) = send(&t.app, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_unsupported_content_type() {
    let t = setup(None, true);
    let body = multipart_body("notes.txt", "text/plain", b"hello");

    let (status, json) = send(&t.app, convert_request(Some(&bearer()), body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["stage"], "validate");
    assert_eq!(json["error"], "Expected PDF, got text/plain");
}

#[tokio::test]
async fn test_oversized_upload_of_wrong_type_is_unsupported() {
    let t = setup(None, true);
    let body = multipart_body("dump.txt", "text/plain", &vec![b'x'; 2 * 1024 * 1024]);

    let (status, json) = send(&t.app, convert_request(Some(&bearer()), body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["stage"], "validate");
    assert_eq!(json["error"], "Expected PDF, got text/plain");
    assert!(workspace_is_clean(t.workspace_root.path()));
}

#[tokio::test]
async fn test_huge_upload_limit_does_not_overflow() {
    let workspace_root = tempfile::tempdir().unwrap();
    let config = AppConfig {
        max_upload_bytes: usize::MAX,
        workspace_root: workspace_root.path().to_path_buf(),
        ..AppConfig::development()
    };
    let mailer = MailDispatcher::with_transport(
        Arc::new(RecordingTransport::default()),
        "sender@example.com",
    );
    let converter = Arc::new(FakeConverter { fail_with: None });
    let pipeline = ConversionPipeline::new(&config, converter, mailer);
    let app = create_app(AppState {
        pipeline: Arc::new(pipeline),
        config: Arc::new(config),
    });

    let body = multipart_body("book.pdf", "application/pdf", b"%PDF-1.4");
    let (status, _) = send(&app, convert_request(Some(&bearer()), body)).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_payload_too_large() {
    let t = setup(None, true);
    let body = multipart_body("big.pdf", "application/pdf", &vec![b'x'; MAX_BYTES + 1]);

    let (status, json) = send(&t.app, convert_request(Some(&bearer()), body)).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(json["stage"], "validate");
    assert!(workspace_is_clean(t.workspace_root.path()));
    assert!(t.transport.sent.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_payload_at_limit_is_accepted() {
    let t = setup(None, true);
    let body = multipart_body("exact.pdf", "application/pdf", &vec![b'x'; MAX_BYTES]);

    let (status, _) = send(&t.app, convert_request(Some(&bearer()), body)).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_missing_file_part() {
    let t = setup(None, true);
    let body = format!(
        "--{b}\r\nContent-Disposition: form-data; name=\"comment\"\r\n\r\nhi\r\n--{b}--\r\n",
        b = BOUNDARY
    )
    .into_bytes();

    let (status, json) = send(&t.app, convert_request(Some(&bearer()), body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "No file provided");
}

#[tokio::test]
async fn test_conversion_failure_returns_truncated_detail() {
    let stderr = format!("{}ValueError: not a PDF", "e".repeat(1979));
    let t = setup(Some(stderr), true);
    let body = multipart_body("broken.pdf", "application/pdf", b"not a pdf");

    let (status, json) = send(&t.app, convert_request(Some(&bearer()), body)).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["stage"], "convert");

    let detail = json["error"].as_str().unwrap();
    assert!(detail.starts_with("Conversion failed"));
    assert!(detail.chars().count() <= 2000);
    assert!(detail.ends_with("ValueError: not a PDF"));

    assert!(t.transport.sent.lock().unwrap().is_empty());
    assert!(workspace_is_clean(t.workspace_root.path()));
}

#[tokio::test]
async fn test_delivery_failure_is_distinct_from_conversion_failure() {
    let t = setup(None, false);
    let body = multipart_body("book.pdf", "application/pdf", b"%PDF-1.4");

    let (status, json) = send(&t.app, convert_request(Some(&bearer()), body)).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(json["stage"], "deliver");
    assert_eq!(json["error"], "SMTP_HOST is not set");
    assert!(workspace_is_clean(t.workspace_root.path()));
}

#[tokio::test]
async fn test_email_endpoint() {
    let t = setup(None, true);
    let request = Request::builder()
        .method("POST")
        .uri("/test-email")
        .header("Authorization", bearer())
        .body(Body::empty())
        .unwrap();

    let (status, json) = send(&t.app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["sent_to"], "reader@example.com");

    let sent = t.transport.sent.lock().unwrap();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].contains("Subject: SMTP test (no attachment)"));
}

#[tokio::test]
async fn test_email_endpoint_without_smtp() {
    let t = setup(None, false);

    let request = Request::builder()
        .method("POST")
        .uri("/test-email")
        .header("Authorization", bearer())
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&t.app, request).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);

    let request = Request::builder()
        .method("POST")
        .uri("/test-email")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&t.app, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_liveness_and_health() {
    let t = setup(None, false);

    let response = t
        .app
        .clone()
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));
    let body = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&body[..], b"ok");

    let (status, json) = send(
        &t.app,
        Request::builder().uri("/health").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["converter"], "fake-convert");
    assert_eq!(json["smtp_configured"], false);

    let (status, json) = send(
        &t.app,
        Request::builder()
            .uri("/api-docs/openapi.json")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(json["paths"]["/convert"].is_object());
}

#[tokio::test]
async fn test_request_id_is_propagated() {
    let t = setup(None, false);
    let response = t
        .app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/")
                .header("x-request-id", "abc-123")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.headers()["x-request-id"], "abc-123");
}
