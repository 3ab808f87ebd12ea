use crate::error::{LoadError, PlanError, StoreError};
use crate::transport::http::types::ApiResponse;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use serde_json::Value as JsonValue;

pub type HandlerResponse = (StatusCode, Json<ApiResponse>);

pub fn ok<T: Serialize>(data: T) -> HandlerResponse {
    match serde_json::to_value(data) {
        Ok(value) => (
            StatusCode::OK,
            Json(ApiResponse {
                success: true,
                data: Some(value),
                error: None,
            }),
        ),
        Err(e) => fail(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to encode response: {}", e),
        ),
    }
}

pub fn fail(status: StatusCode, message: impl Into<String>) -> HandlerResponse {
    fail_with(status, message, None)
}

pub fn fail_with(
    status: StatusCode,
    message: impl Into<String>,
    data: Option<JsonValue>,
) -> HandlerResponse {
    (
        status,
        Json(ApiResponse {
            success: false,
            data,
            error: Some(message.into()),
        }),
    )
}

pub fn normalize_model_name(model: &str) -> String {
    model.trim().to_lowercase()
}

pub fn store_error_response(err: &StoreError) -> HandlerResponse {
    let status = match err {
        StoreError::UnknownTable { .. } => StatusCode::NOT_FOUND,
        StoreError::UnknownColumn { .. } | StoreError::Schema(_) => StatusCode::BAD_REQUEST,
        StoreError::Constraint { .. } => StatusCode::CONFLICT,
        StoreError::Unavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        StoreError::TransactionFinished | StoreError::Sqlx(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    fail(status, err.to_string())
}

pub fn load_error_response(err: &LoadError) -> HandlerResponse {
    match err {
        LoadError::Plan(plan) => {
            let status = match plan {
                PlanError::UnknownTable { .. } => StatusCode::NOT_FOUND,
                _ => StatusCode::BAD_REQUEST,
            };
            fail_with(
                status,
                err.to_string(),
                Some(serde_json::json!({ "code": "INVALID_PLAN" })),
            )
        }
        LoadError::DuplicateNaturalKey { batch, key, rows } => fail_with(
            StatusCode::CONFLICT,
            err.to_string(),
            Some(serde_json::json!({
                "code": "DUPLICATE_NATURAL_KEY",
                "batch": batch,
                "key": key,
                "rows": rows,
            })),
        ),
        LoadError::PersistenceUnavailable { stage, .. } => fail_with(
            StatusCode::SERVICE_UNAVAILABLE,
            err.to_string(),
            Some(serde_json::json!({ "code": "PERSISTENCE_UNAVAILABLE", "stage": stage })),
        ),
        LoadError::TimedOut { budget } => fail_with(
            StatusCode::GATEWAY_TIMEOUT,
            err.to_string(),
            Some(serde_json::json!({
                "code": "TIMED_OUT",
                "budget_ms": budget.as_millis() as u64,
            })),
        ),
    }
}
