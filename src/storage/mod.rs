//! Persistence collaborators used by the loader.
//!
//! A [`Store`] hands out [`StoreTransaction`]s. Inside a transaction,
//! `insert` assigns surrogate keys, `flush` makes them visible to the rest of
//! the transaction without ending it, and only `commit` makes anything
//! durable. Dropping a transaction without committing discards its writes.

pub mod memory;
pub mod postgres;

pub use memory::{MemoryStore, StoreFaults};
pub use postgres::PgStore;

use crate::domain::model::{ModelRegistry, TableSpec};
use crate::domain::record::{Record, StoredRecord, SurrogateKey};
use crate::error::StoreError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use utoipa::ToSchema;

#[async_trait]
pub trait Store: Send + Sync {
    /// Creates the declared tables (parents first) and registers them.
    async fn apply_schema(&self, tables: &[TableSpec]) -> Result<(), StoreError>;

    /// Snapshot of the registered tables.
    async fn registry(&self) -> ModelRegistry;

    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError>;

    async fn query(&self, table: &str, criteria: &Criteria)
        -> Result<Vec<StoredRecord>, StoreError>;

    async fn count(&self, table: &str) -> Result<u64, StoreError>;

    /// Deletes matching rows of `table`, cascading along foreign keys declared
    /// with `on_delete_cascade`. Returns the number of `table` rows deleted.
    async fn delete(&self, table: &str, criteria: &Criteria) -> Result<u64, StoreError>;

    async fn list_tables(&self) -> Result<Vec<String>, StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;
}

#[async_trait]
pub trait StoreTransaction: Send {
    /// Stages one record and returns its newly assigned surrogate key.
    async fn insert(&mut self, table: &str, record: &Record) -> Result<SurrogateKey, StoreError>;

    async fn insert_many(
        &mut self,
        table: &str,
        records: &[Record],
    ) -> Result<Vec<SurrogateKey>, StoreError> {
        let mut ids = Vec::with_capacity(records.len());
        for record in records {
            ids.push(self.insert(table, record).await?);
        }
        Ok(ids)
    }

    /// Makes every staged row and its key visible within this transaction.
    async fn flush(&mut self) -> Result<(), StoreError>;

    async fn commit(&mut self) -> Result<(), StoreError>;

    async fn rollback(&mut self) -> Result<(), StoreError>;
}

/// Restricted equality filters plus ordering, shared by every store.
#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq, ToSchema)]
pub struct Criteria {
    /// Equality filters: `{ "field": value }`. Values compare by their text form.
    #[serde(default, rename = "where")]
    #[schema(value_type = Object)]
    pub filters: BTreeMap<String, JsonValue>,
    #[serde(default)]
    pub order_by: Option<OrderBySpec>,
    #[serde(default)]
    pub limit: Option<u32>,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, ToSchema)]
pub struct OrderBySpec {
    pub field: String,
    #[serde(default)]
    pub direction: OrderDirection,
}

#[derive(Deserialize, Serialize, Debug, ToSchema, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrderDirection {
    #[default]
    Asc,
    Desc,
}

impl Criteria {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn eq(field: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        let mut criteria = Self::default();
        criteria.filters.insert(field.into(), value.into());
        criteria
    }

    pub fn and(mut self, field: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.filters.insert(field.into(), value.into());
        self
    }

    pub fn order_by(mut self, field: impl Into<String>, direction: OrderDirection) -> Self {
        self.order_by = Some(OrderBySpec {
            field: field.into(),
            direction,
        });
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Whether `record` satisfies every filter.
    pub fn matches(&self, record: &Record) -> bool {
        self.filters.iter().all(|(field, expected)| {
            record
                .get(field)
                .map(|actual| filter_text(actual) == filter_text(expected))
                .unwrap_or(false)
        })
    }
}

/// Text form used for filter comparisons (`col::text = $n` on Postgres).
pub fn filter_text(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::Null => None,
        JsonValue::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}
