use crate::transport::http::handlers::common::{fail_with, ok};
use crate::transport::http::types::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy (store reachable)", body = ApiResponse),
        (status = 503, description = "Service is unhealthy (store unreachable)", body = ApiResponse)
    )
)]
pub async fn healthcheck_handler(State(state): State<AppState>) -> impl IntoResponse {
    match state.service.ping().await {
        Ok(()) => ok(serde_json::json!({ "status": "ok" })),
        Err(e) => fail_with(
            StatusCode::SERVICE_UNAVAILABLE,
            format!("Store ping failed: {}", e),
            Some(serde_json::json!({ "status": "unhealthy" })),
        ),
    }
}
