//! The import service.
//!
//! This module sits between the outer surfaces (HTTP handlers, the CLI) and
//! the loader. It owns the store and the loader options and is shared behind
//! an `Arc` by every request.

use crate::domain::loader::{Loader, LoaderOptions};
use crate::domain::model::TableSpec;
use crate::domain::plan::LoadPlan;
use crate::domain::record::StoredRecord;
use crate::domain::report::LoadReport;
use crate::error::{LoadError, StoreError};
use crate::storage::{Criteria, Store};
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Clone)]
pub struct ImportService {
    store: Arc<dyn Store>,
    options: LoaderOptions,
}

impl ImportService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self::with_options(store, LoaderOptions::default())
    }

    pub fn with_options(store: Arc<dyn Store>, options: LoaderOptions) -> Self {
        Self { store, options }
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Creates the given tables and returns every registered table afterwards.
    pub async fn apply_schema(&self, tables: &[TableSpec]) -> Result<Vec<String>, StoreError> {
        self.store.apply_schema(tables).await?;
        let models = self.store.registry().await.list_models();
        tracing::info!(requested = tables.len(), registered = models.len(), "schema applied");
        Ok(models)
    }

    /// Runs one atomic load.
    pub async fn import(&self, plan: &LoadPlan) -> Result<LoadReport, LoadError> {
        Loader::new(self.store.as_ref())
            .with_options(self.options.clone())
            .load(plan)
            .await
    }

    pub async fn is_populated(&self, table: &str) -> Result<bool, StoreError> {
        Ok(self.store.count(table).await? > 0)
    }

    /// Imports `plan` unless `sentinel` already holds rows. `Ok(None)` means skipped.
    pub async fn import_once(
        &self,
        sentinel: &str,
        plan: &LoadPlan,
    ) -> anyhow::Result<Option<LoadReport>> {
        if self.is_populated(sentinel).await? {
            tracing::info!(table = sentinel, "already contains data, skipping import");
            return Ok(None);
        }
        Ok(Some(self.import(plan).await?))
    }

    /// Row count per table.
    pub async fn summarize<S: AsRef<str>>(
        &self,
        tables: &[S],
    ) -> Result<BTreeMap<String, u64>, StoreError> {
        let mut counts = BTreeMap::new();
        for table in tables {
            let table = table.as_ref();
            counts.insert(table.to_string(), self.store.count(table).await?);
        }
        Ok(counts)
    }

    pub async fn query(
        &self,
        table: &str,
        criteria: &Criteria,
    ) -> Result<Vec<StoredRecord>, StoreError> {
        self.store.query(table, criteria).await
    }

    pub async fn delete(&self, table: &str, criteria: &Criteria) -> Result<u64, StoreError> {
        let deleted = self.store.delete(table, criteria).await?;
        tracing::info!(table, deleted, "rows deleted");
        Ok(deleted)
    }

    pub async fn list_models(&self) -> Vec<String> {
        self.store.registry().await.list_models()
    }

    pub async fn ping(&self) -> Result<(), StoreError> {
        self.store.ping().await
    }
}
