use crate::transport::http::handlers::common::{fail, load_error_response, ok};
use crate::transport::http::types::{json_422, AppState, ImportRequest, ImportSummary};
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;

#[utoipa::path(
    post,
    path = "/api/import",
    request_body = ImportRequest,
    responses(
        (status = 200, description = "Load committed; rejected records are listed per batch", body = ApiResponse),
        (status = 400, description = "Invalid load plan", body = ApiResponse),
        (status = 404, description = "A batch targets an unregistered table", body = ApiResponse),
        (status = 409, description = "Duplicate natural key; nothing committed", body = ApiResponse),
        (status = 422, description = "Unprocessable entity (invalid JSON body)", body = ApiResponse),
        (status = 503, description = "Store unavailable; nothing committed", body = ApiResponse),
        (status = 504, description = "Load timed out; nothing committed", body = ApiResponse)
    )
)]
pub async fn import_handler(
    State(state): State<AppState>,
    request: Result<Json<ImportRequest>, JsonRejection>,
) -> impl IntoResponse {
    let Json(request) = match request {
        Ok(v) => v,
        Err(e) => return json_422(e, "{\"batches\": [...]}"),
    };
    let plan = request.into_plan();

    match state.service.import(&plan).await {
        Ok(report) => match serde_json::to_value(&report) {
            Ok(value) => ok(ImportSummary {
                committed: report.committed_count(),
                rejected: report.rejected_count(),
                fingerprint: report.fingerprint(),
                report: value,
            }),
            Err(e) => fail(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to encode report: {}", e),
            ),
        },
        Err(e) => load_error_response(&e),
    }
}
