use crate::storage::Criteria;
use crate::transport::http::handlers::common::{
    fail, normalize_model_name, ok, store_error_response,
};
use crate::transport::http::types::{json_422, AppState, DeleteRequest, ModelsResponse};
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;

#[utoipa::path(
    get,
    path = "/api/models",
    responses(
        (status = 200, description = "Registered models and their row counts", body = ApiResponse),
        (status = 503, description = "Store unavailable", body = ApiResponse)
    )
)]
pub async fn list_models_handler(State(state): State<AppState>) -> impl IntoResponse {
    let models = state.service.list_models().await;
    match state.service.summarize(models.as_slice()).await {
        Ok(counts) => ok(ModelsResponse { models, counts }),
        Err(e) => store_error_response(&e),
    }
}

#[utoipa::path(
    post,
    path = "/api/models/{model}/query",
    params(
        ("model" = String, Path, description = "Model name (e.g. students)")
    ),
    request_body = Criteria,
    responses(
        (status = 200, description = "Matching rows", body = ApiResponse),
        (status = 400, description = "Unknown column in filter or ordering", body = ApiResponse),
        (status = 404, description = "Model is not registered", body = ApiResponse),
        (status = 422, description = "Unprocessable entity (invalid JSON body)", body = ApiResponse)
    )
)]
pub async fn query_handler(
    State(state): State<AppState>,
    Path(model): Path<String>,
    request: Result<Json<Criteria>, JsonRejection>,
) -> impl IntoResponse {
    let model = normalize_model_name(&model);
    let Json(criteria) = match request {
        Ok(v) => v,
        Err(e) => return json_422(e, "{\"where\": {...}, \"order_by\": {...}, \"limit\": n}"),
    };

    match state.service.query(&model, &criteria).await {
        Ok(rows) => {
            let records: Vec<serde_json::Value> = rows
                .into_iter()
                .map(|r| serde_json::Value::Object(r.fields))
                .collect();
            ok(serde_json::json!({ "model": model, "count": records.len(), "records": records }))
        }
        Err(e) => store_error_response(&e),
    }
}

#[utoipa::path(
    post,
    path = "/api/models/{model}/delete",
    params(
        ("model" = String, Path, description = "Model name (e.g. teachers)")
    ),
    request_body = DeleteRequest,
    responses(
        (status = 200, description = "Rows deleted; dependent rows cascade", body = ApiResponse),
        (status = 400, description = "Bad request", body = ApiResponse),
        (status = 404, description = "Model is not registered", body = ApiResponse),
        (status = 409, description = "Rows are still referenced", body = ApiResponse),
        (status = 422, description = "Unprocessable entity (invalid JSON body)", body = ApiResponse)
    )
)]
pub async fn delete_handler(
    State(state): State<AppState>,
    Path(model): Path<String>,
    request: Result<Json<DeleteRequest>, JsonRejection>,
) -> impl IntoResponse {
    let model = normalize_model_name(&model);
    let Json(request) = match request {
        Ok(v) => v,
        Err(e) => return json_422(e, "{\"where\": {...}}"),
    };
    if request.filters.is_empty() && !request.confirm {
        return fail(
            StatusCode::BAD_REQUEST,
            "Refusing to delete every row without {\"confirm\": true}",
        );
    }

    match state.service.delete(&model, &request.criteria()).await {
        Ok(deleted) => ok(serde_json::json!({ "model": model, "deleted": deleted })),
        Err(e) => store_error_response(&e),
    }
}
