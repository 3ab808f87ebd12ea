use crate::app::ImportService;
use crate::domain::model::TableSpec;
use crate::domain::plan::{BatchSpec, LoadPlan};
use crate::storage::Criteria;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::sync::Arc;
use utoipa::ToSchema;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<ImportService>,
}

impl AppState {
    pub fn new(service: ImportService) -> Self {
        Self {
            service: Arc::new(service),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, ToSchema)]
pub struct ApiResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Object)]
    pub data: Option<JsonValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Deserialize, Serialize, Debug, ToSchema)]
pub struct ApplySchemaRequest {
    /// Tables to create. Order does not matter; parents are created first.
    pub tables: Vec<TableSpec>,
}

#[derive(Deserialize, Debug, ToSchema)]
pub struct ImportRequest {
    /// Batches in dependency order. Each batch names its table, optional
    /// natural key field, references to earlier batches, conversions and records.
    #[schema(value_type = Vec<Object>)]
    pub batches: Vec<BatchSpec>,
}

impl ImportRequest {
    pub fn into_plan(self) -> LoadPlan {
        LoadPlan::new(self.batches)
    }
}

#[derive(Serialize, Debug, ToSchema)]
pub struct ImportSummary {
    pub committed: usize,
    pub rejected: usize,
    /// Digest of the outcome, independent of surrogate key values.
    pub fingerprint: String,
    /// Per-batch committed and rejected records.
    #[schema(value_type = Object)]
    pub report: JsonValue,
}

#[derive(Deserialize, Debug, ToSchema)]
pub struct DeleteRequest {
    /// Equality filters selecting the rows to delete.
    #[serde(default, rename = "where")]
    #[schema(value_type = Object)]
    pub filters: BTreeMap<String, JsonValue>,
    /// Required to delete every row (empty `where`).
    #[serde(default)]
    pub confirm: bool,
}

impl DeleteRequest {
    pub fn criteria(&self) -> Criteria {
        Criteria {
            filters: self.filters.clone(),
            ..Criteria::default()
        }
    }
}

#[derive(Serialize, Debug, ToSchema)]
pub struct ModelsResponse {
    pub models: Vec<String>,
    /// Row count per model.
    pub counts: BTreeMap<String, u64>,
}

pub fn json_422(err: JsonRejection, expected: &str) -> (StatusCode, Json<ApiResponse>) {
    (
        StatusCode::UNPROCESSABLE_ENTITY,
        Json(ApiResponse {
            success: false,
            data: None,
            error: Some(format!("Invalid JSON body: {} (expected: {})", err, expected)),
        }),
    )
}
