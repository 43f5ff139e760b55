use axum::{
    Json,
    extract::{
        Multipart, State,
        multipart::{MultipartError, MultipartRejection},
    },
    http::{HeaderMap, StatusCode, header},
};
use serde::Serialize;
use utoipa::ToSchema;

use crate::AppState;
use crate::services::pipeline::{Delivery, PipelineError, Upload};
use crate::utils::validation::{UploadError, validate_content_type};

#[derive(Serialize, ToSchema)]
pub struct DeliveryResponse {
    pub ok: bool,
    pub sent_to: String,
}

impl From<Delivery> for DeliveryResponse {
    fn from(delivery: Delivery) -> Self {
        Self {
            ok: true,
            sent_to: delivery.sent_to,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct ErrorResponse {
    /// Failure detail, at most 2000 characters
    pub error: String,
    /// One of auth, validate, workspace, convert, deliver
    pub stage: String,
}

/// Multipart body of `POST /convert`.
#[derive(ToSchema)]
#[allow(dead_code)]
pub struct ConvertUpload {
    /// PDF document (application/pdf or application/octet-stream)
    #[schema(value_type = String, format = Binary)]
    file: Vec<u8>,
}

pub(crate) fn bearer_header(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
}

#[utoipa::path(
    post,
    path = "/convert",
    request_body(content = ConvertUpload, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Converted and mailed", body = DeliveryResponse),
        (status = 400, description = "Unsupported content type or malformed upload", body = ErrorResponse),
        (status = 401, description = "Missing bearer token", body = ErrorResponse),
        (status = 403, description = "Invalid bearer token", body = ErrorResponse),
        (status = 413, description = "Upload too large", body = ErrorResponse),
        (status = 500, description = "Conversion failed", body = ErrorResponse),
        (status = 502, description = "Email delivery failed", body = ErrorResponse)
    ),
    security(
        ("bearer" = [])
    ),
    tag = "convert"
)]
pub async fn convert_document(
    State(state): State<AppState>,
    headers: HeaderMap,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<DeliveryResponse>, PipelineError> {
    tracing::info!("request: /convert received");

    // Credentials are checked before any of the body is read
    let auth = state.pipeline.authorize(bearer_header(&headers))?;

    let mut multipart = multipart.map_err(|e| UploadError::Malformed(e.body_text()))?;
    let upload = read_upload(&mut multipart, state.pipeline.max_upload_bytes()).await?;

    let delivery = state.pipeline.convert_and_deliver(auth, upload).await?;
    Ok(Json(delivery.into()))
}

/// Reads the `file` part into memory; other parts are ignored.
async fn read_upload(multipart: &mut Multipart, max_bytes: usize) -> Result<Upload, UploadError> {
    let to_upload_error = |e: MultipartError| {
        if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
            UploadError::PayloadTooLarge { max_bytes }
        } else {
            UploadError::Malformed(e.body_text())
        }
    };

    while let Some(field) = multipart.next_field().await.map_err(to_upload_error)? {
        if field.name() != Some("file") {
            continue;
        }

        let filename = field.file_name().map(str::to_string);
        let content_type = field
            .content_type()
            .unwrap_or(mime::APPLICATION_OCTET_STREAM.as_ref())
            .to_string();
        // Rejected types never reach the body limit, so they report 400 rather than 413
        validate_content_type(&content_type)?;

        tracing::info!(filename = ?filename, content_type = %content_type, "request: reading upload into memory");

        let data = field.bytes().await.map_err(to_upload_error)?;
        return Ok(Upload {
            data,
            content_type,
            filename,
        });
    }

    tracing::warn!("request: no file part in upload");
    Err(UploadError::MissingFile)
}
