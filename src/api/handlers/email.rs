use axum::{
    Json,
    extract::State,
    http::HeaderMap,
};

use crate::AppState;
use crate::api::handlers::convert::{DeliveryResponse, ErrorResponse, bearer_header};
use crate::services::pipeline::PipelineError;

#[utoipa::path(
    post,
    path = "/test-email",
    responses(
        (status = 200, description = "Test message sent", body = DeliveryResponse),
        (status = 401, description = "Missing bearer token", body = ErrorResponse),
        (status = 403, description = "Invalid bearer token", body = ErrorResponse),
        (status = 502, description = "Email delivery failed", body = ErrorResponse)
    ),
    security(
        ("bearer" = [])
    ),
    tag = "convert"
)]
pub async fn send_test_email(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<DeliveryResponse>, PipelineError> {
    tracing::info!("request: /test-email received");
    let auth = state.pipeline.authorize(bearer_header(&headers))?;
    let delivery = state.pipeline.send_test_email(auth).await?;
    Ok(Json(delivery.into()))
}
