use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::services::authorizer::AuthError;
use crate::services::converter::ConversionError;
use crate::services::pipeline::PipelineError;
use crate::utils::text::{MAX_DETAIL_CHARS, tail_chars, truncate};
use crate::utils::validation::UploadError;

/// HTTP status for each pipeline failure. This is the only place failures
/// become status codes.
pub fn status_for(error: &PipelineError) -> StatusCode {
    match error {
        PipelineError::Auth(AuthError::Unauthorized) => StatusCode::UNAUTHORIZED,
        PipelineError::Auth(AuthError::Forbidden) => StatusCode::FORBIDDEN,
        PipelineError::Upload(UploadError::PayloadTooLarge { .. }) => StatusCode::PAYLOAD_TOO_LARGE,
        PipelineError::Upload(_) => StatusCode::BAD_REQUEST,
        PipelineError::Workspace(_) | PipelineError::Conversion(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
        PipelineError::Delivery(_) => StatusCode::BAD_GATEWAY,
    }
}

/// Client-facing failure detail, at most `MAX_DETAIL_CHARS` characters.
/// Converter output keeps its end, where the tool reports what went wrong.
fn detail_for(error: &PipelineError) -> String {
    match error {
        PipelineError::Conversion(ConversionError::ToolFailed { status, stderr }) => {
            let prefix = format!("Conversion failed ({}): ", status);
            let budget = MAX_DETAIL_CHARS.saturating_sub(prefix.chars().count());
            format!("{}{}", prefix, tail_chars(stderr, budget))
        }
        other => truncate(&other.to_string(), MAX_DETAIL_CHARS).to_string(),
    }
}

impl IntoResponse for PipelineError {
    fn into_response(self) -> Response {
        let status = status_for(&self);

        let body = Json(json!({
            "error": detail_for(&self),
            "stage": self.stage().as_str(),
        }));

        (status, body).into_response()
    }
}
