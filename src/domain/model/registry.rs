//! ModelRegistry for mapping table names to EntityModel implementations.

use crate::domain::model::{DynamicModel, EntityModel, TableSpec};
use sqlx::{PgPool, Row};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Table that persists registered specs so a restarted process can warm-start.
pub const MODELS_TABLE: &str = "loader_models";

/// A registry that maps table names to their EntityModel implementations.
#[derive(Clone, Default)]
pub struct ModelRegistry {
    models: BTreeMap<String, Arc<dyn EntityModel>>,
}

impl ModelRegistry {
    /// Creates a new empty ModelRegistry.
    pub fn new() -> Self {
        Self {
            models: BTreeMap::new(),
        }
    }

    /// Registers a model under its own table name, replacing any previous one.
    pub fn register<M: EntityModel + 'static>(&mut self, model: M) {
        self.models
            .insert(model.table_name().to_string(), Arc::new(model));
    }

    pub fn register_spec(&mut self, spec: TableSpec) {
        self.register(DynamicModel::new(spec));
    }

    /// Retrieves a model implementation by table name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn EntityModel>> {
        self.models.get(name).cloned()
    }

    /// Returns all registered table names, sorted.
    pub fn list_models(&self) -> Vec<String> {
        self.models.keys().cloned().collect()
    }

    pub fn specs(&self) -> Vec<TableSpec> {
        self.models.values().map(|m| m.spec().clone()).collect()
    }

    /// Tables with a foreign key pointing at `table`: `(child table, column, cascades)`.
    pub fn referencing(&self, table: &str) -> Vec<(String, String, bool)> {
        let mut out = Vec::new();
        for model in self.models.values() {
            for (column, fk) in model.spec().foreign_keys() {
                if fk.table == table {
                    out.push((
                        model.table_name().to_string(),
                        column.to_string(),
                        fk.on_delete_cascade,
                    ));
                }
            }
        }
        out
    }

    /// Loads the registry from the `loader_models` table.
    ///
    /// A missing table means nothing was bootstrapped yet; that yields an
    /// empty registry rather than an error.
    pub async fn load_from_db(pool: &PgPool) -> anyhow::Result<Self> {
        let rows = match sqlx::query(&format!("SELECT table_name, spec FROM {}", MODELS_TABLE))
            .fetch_all(pool)
            .await
        {
            Ok(r) => r,
            Err(_) => return Ok(ModelRegistry::new()),
        };

        let mut reg = ModelRegistry::new();
        for r in rows {
            let table_name: String = r.try_get("table_name")?;
            let spec: serde_json::Value = r.try_get("spec")?;
            match serde_json::from_value::<TableSpec>(spec) {
                Ok(spec) => reg.register_spec(spec),
                Err(e) => {
                    tracing::warn!(
                        table = %table_name,
                        error = %e,
                        "skipping unreadable model spec"
                    );
                }
            }
        }

        Ok(reg)
    }
}
