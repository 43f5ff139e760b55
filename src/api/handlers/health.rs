use axum::{Json, extract::State, response::IntoResponse};
use serde::Serialize;
use crate::{ApiDoc, AppState};
use utoipa::{OpenApi, ToSchema};

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub converter: String,
    pub smtp_configured: bool,
}

#[utoipa::path(
    get,
    path = "/",
    responses(
        (status = 200, description = "Liveness probe", body = String)
    ),
    tag = "system"
)]
pub async fn root() -> &'static str {
    "ok"
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service configuration summary", body = HealthResponse)
    ),
    tag = "system"
)]
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        converter: state.pipeline.converter_name(),
        smtp_configured: state.pipeline.mail_configured(),
    })
}

pub async fn openapi_json() -> impl IntoResponse {
    Json(ApiDoc::openapi())
}
