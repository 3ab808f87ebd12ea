use crate::domain::model::{ColumnSpec, ColumnType, ForeignKeySpec, TableSpec};
use crate::storage::{Criteria, OrderBySpec, OrderDirection};
use crate::transport::http::handlers::{bootstrap, health, import, models};
use crate::transport::http::types::{
    ApiResponse, AppState, ApplySchemaRequest, DeleteRequest, ImportRequest, ImportSummary,
    ModelsResponse,
};
use axum::routing::{get, post};
use axum::Router;
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        health::healthcheck_handler,
        bootstrap::bootstrap_apply_schema_handler,
        import::import_handler,
        models::list_models_handler,
        models::query_handler,
        models::delete_handler
    ),
    components(schemas(
        ApiResponse,
        ApplySchemaRequest,
        ImportRequest,
        ImportSummary,
        DeleteRequest,
        ModelsResponse,
        Criteria,
        OrderBySpec,
        OrderDirection,
        TableSpec,
        ColumnSpec,
        ColumnType,
        ForeignKeySpec
    ))
)]
pub struct ApiDoc;

pub fn create_router(app_state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::healthcheck_handler))
        .route(
            "/bootstrap/apply-schema",
            post(bootstrap::bootstrap_apply_schema_handler),
        )
        .route("/api/import", post(import::import_handler))
        .route("/api/models", get(models::list_models_handler))
        .route("/api/models/:model/query", post(models::query_handler))
        .route("/api/models/:model/delete", post(models::delete_handler))
        .with_state(app_state)
}
