use crate::transport::http::handlers::common::{fail, ok, store_error_response};
use crate::transport::http::types::{json_422, AppState, ApplySchemaRequest};
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;

#[utoipa::path(
    post,
    path = "/bootstrap/apply-schema",
    request_body = ApplySchemaRequest,
    responses(
        (status = 200, description = "Schema applied", body = ApiResponse),
        (status = 400, description = "Bad request", body = ApiResponse),
        (status = 422, description = "Unprocessable entity (invalid JSON body)", body = ApiResponse),
        (status = 503, description = "Store unavailable", body = ApiResponse)
    )
)]
pub async fn bootstrap_apply_schema_handler(
    State(state): State<AppState>,
    request: Result<Json<ApplySchemaRequest>, JsonRejection>,
) -> impl IntoResponse {
    let Json(request) = match request {
        Ok(v) => v,
        Err(e) => return json_422(e, "{\"tables\": [...]}"),
    };

    if request.tables.is_empty() {
        return fail(StatusCode::BAD_REQUEST, "tables cannot be empty");
    }

    match state.service.apply_schema(&request.tables).await {
        Ok(models) => ok(serde_json::json!({
            "applied": request.tables.iter().map(|t| t.table_name.as_str()).collect::<Vec<_>>(),
            "models": models,
        })),
        Err(e) => {
            tracing::warn!(error = %e, "apply-schema failed");
            store_error_response(&e)
        }
    }
}
