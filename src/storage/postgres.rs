//! PostgreSQL store built on a `sqlx` connection pool.

use crate::crypto::hashing::hash_schema;
use crate::domain::model::registry::MODELS_TABLE;
use crate::domain::model::{
    creation_order, resolve_references, validate_ident, EntityModel, ModelRegistry, TableSpec,
};
use crate::domain::record::{Record, StoredRecord, SurrogateKey};
use crate::error::StoreError;
use crate::infra::config::DatabaseConfig;
use crate::storage::{filter_text, Criteria, OrderDirection, Store, StoreTransaction};
use async_trait::async_trait;
use serde_json::Value as JsonValue;
use sqlx::{PgPool, Postgres, Row, Transaction};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Tables owned by the loader itself, hidden from `list_tables`.
pub const INTERNAL_TABLES: &[&str] = &[MODELS_TABLE, "_sqlx_migrations"];

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
    registry: Arc<RwLock<ModelRegistry>>,
}

fn check_ident(ident: &str) -> Result<(), StoreError> {
    if validate_ident(ident) {
        Ok(())
    } else {
        Err(StoreError::Schema(crate::error::SchemaError::InvalidIdentifier {
            ident: ident.to_string(),
        }))
    }
}

/// Constraint failures stay distinguishable from connectivity problems.
fn map_sqlx(table: &str, err: sqlx::Error) -> StoreError {
    match &err {
        sqlx::Error::Database(db)
            if db.constraint().is_some() || db.code().map_or(false, |c| c.starts_with("23")) =>
        {
            StoreError::Constraint {
                table: table.to_string(),
                reason: db.message().to_string(),
            }
        }
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            StoreError::unavailable(err.to_string())
        }
        _ => StoreError::Sqlx(err),
    }
}

/// Text parameter for a JSON scalar; the SQL side casts it to the column type.
fn bind_text(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::Null => None,
        JsonValue::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

impl PgStore {
    /// Connects with the configured pool settings, ensures the model registry
    /// table exists, and warm-starts the registry from it.
    pub async fn connect(config: &DatabaseConfig) -> anyhow::Result<Self> {
        let options = config.connect_options()?;
        let pool = config.pool.pool_options().connect_with(options).await?;
        tracing::info!(
            database = %config.describe(),
            max_connections = config.pool.max_connections(),
            "connected to database"
        );
        Ok(Self::from_pool(pool).await?)
    }

    pub async fn from_pool(pool: PgPool) -> Result<Self, StoreError> {
        sqlx::query(&format!(
            "CREATE TABLE IF NOT EXISTS {} (
                table_name TEXT PRIMARY KEY,
                spec JSONB NOT NULL,
                spec_hash TEXT NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )",
            MODELS_TABLE
        ))
        .execute(&pool)
        .await
        .map_err(|e| map_sqlx(MODELS_TABLE, e))?;

        let registry = ModelRegistry::load_from_db(&pool)
            .await
            .map_err(|e| StoreError::unavailable(e.to_string()))?;

        Ok(Self {
            pool,
            registry: Arc::new(RwLock::new(registry)),
        })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn model(&self, table: &str) -> Result<Arc<dyn EntityModel>, StoreError> {
        self.registry
            .read()
            .await
            .get(table)
            .ok_or_else(|| StoreError::UnknownTable {
                table: table.to_string(),
            })
    }
}

fn where_clause(
    model: &dyn EntityModel,
    criteria: &Criteria,
    first_param: usize,
) -> Result<(String, Vec<Option<String>>), StoreError> {
    let mut clauses = Vec::new();
    let mut params = Vec::new();
    for (idx, (field, value)) in criteria.filters.iter().enumerate() {
        check_ident(field)?;
        if model.column_type(field).is_none() {
            return Err(StoreError::UnknownColumn {
                table: model.table_name().to_string(),
                column: field.clone(),
            });
        }
        match filter_text(value) {
            Some(text) => {
                clauses.push(format!("{}::text = ${}", field, first_param + idx));
                params.push(Some(text));
            }
            None => {
                clauses.push(format!("{} IS NULL AND ${}::text IS NULL", field, first_param + idx));
                params.push(None);
            }
        }
    }
    if clauses.is_empty() {
        Ok((String::new(), params))
    } else {
        Ok((format!(" WHERE {}", clauses.join(" AND ")), params))
    }
}

#[async_trait]
impl Store for PgStore {
    async fn apply_schema(&self, tables: &[TableSpec]) -> Result<(), StoreError> {
        let resolved = {
            let registry = self.registry.read().await;
            resolve_references(tables, |t| {
                registry.get(t).map(|m| m.primary_key_field().to_string())
            })?
        };
        let ordered = creation_order(&resolved)?;
        let mut tx = self.pool.begin().await.map_err(|e| map_sqlx(MODELS_TABLE, e))?;

        for spec in &ordered {
            let sql = spec.create_table_sql();
            tracing::debug!(table = %spec.table_name, %sql, "creating table");
            sqlx::query(&sql)
                .execute(&mut *tx)
                .await
                .map_err(|e| map_sqlx(&spec.table_name, e))?;

            let spec_json = serde_json::to_value(spec).unwrap_or(JsonValue::Null);
            let spec_hash = hash_schema(&spec_json);
            sqlx::query(&format!(
                "INSERT INTO {} (table_name, spec, spec_hash) VALUES ($1, $2, $3)
                 ON CONFLICT (table_name) DO UPDATE
                 SET spec = EXCLUDED.spec, spec_hash = EXCLUDED.spec_hash, updated_at = now()",
                MODELS_TABLE
            ))
            .bind(&spec.table_name)
            .bind(&spec_json)
            .bind(&spec_hash)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx(MODELS_TABLE, e))?;
        }

        tx.commit().await.map_err(|e| map_sqlx(MODELS_TABLE, e))?;

        let mut registry = self.registry.write().await;
        for spec in ordered {
            registry.register_spec(spec.clone());
        }
        Ok(())
    }

    async fn registry(&self) -> ModelRegistry {
        self.registry.read().await.clone()
    }

    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::unavailable(e.to_string()))?;
        Ok(Box::new(PgTransaction {
            tx: Some(tx),
            registry: self.registry.read().await.clone(),
        }))
    }

    async fn query(
        &self,
        table: &str,
        criteria: &Criteria,
    ) -> Result<Vec<StoredRecord>, StoreError> {
        let model = self.model(table).await?;
        let (where_sql, params) = where_clause(model.as_ref(), criteria, 1)?;
        let pk = model.primary_key_field();

        let mut sql = format!(
            "SELECT row_to_json({t}.*) AS record, {t}.{pk}::bigint AS pk_value FROM {t}{w}",
            t = table,
            pk = pk,
            w = where_sql
        );
        if let Some(order) = &criteria.order_by {
            check_ident(&order.field)?;
            if model.column_type(&order.field).is_none() {
                return Err(StoreError::UnknownColumn {
                    table: table.to_string(),
                    column: order.field.clone(),
                });
            }
            let dir = match order.direction {
                OrderDirection::Asc => "ASC",
                OrderDirection::Desc => "DESC",
            };
            sql.push_str(&format!(" ORDER BY {} {}, {} {}", order.field, dir, pk, dir));
        } else {
            sql.push_str(&format!(" ORDER BY {} ASC", pk));
        }
        if let Some(limit) = criteria.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }

        let mut query = sqlx::query(&sql);
        for p in params {
            query = query.bind(p);
        }
        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx(table, e))?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let record: JsonValue = row.try_get("record")?;
            let id: i64 = row.try_get("pk_value")?;
            let fields = match record {
                JsonValue::Object(map) => map,
                _ => Record::new(),
            };
            out.push(StoredRecord { id, fields });
        }
        Ok(out)
    }

    async fn count(&self, table: &str) -> Result<u64, StoreError> {
        self.model(table).await?;
        let n: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*)::bigint FROM {}", table))
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_sqlx(table, e))?;
        Ok(n.max(0) as u64)
    }

    async fn delete(&self, table: &str, criteria: &Criteria) -> Result<u64, StoreError> {
        let model = self.model(table).await?;
        let (where_sql, params) = where_clause(model.as_ref(), criteria, 1)?;
        let sql = format!("DELETE FROM {}{}", table, where_sql);
        let mut query = sqlx::query(&sql);
        for p in params {
            query = query.bind(p);
        }
        let result = query
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx(table, e))?;
        Ok(result.rows_affected())
    }

    async fn list_tables(&self) -> Result<Vec<String>, StoreError> {
        let rows = sqlx::query(
            "SELECT table_name
             FROM information_schema.tables
             WHERE table_schema = current_schema() AND table_type = 'BASE TABLE'
             ORDER BY table_name",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::unavailable(e.to_string()))?;

        Ok(rows
            .into_iter()
            .filter_map(|r| r.try_get::<String, _>("table_name").ok())
            .filter(|t| !INTERNAL_TABLES.contains(&t.as_str()))
            .collect())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::unavailable(format!("DB ping failed: {}", e)))?;
        Ok(())
    }
}

/// One database transaction. Dropping it without `commit` rolls back.
pub struct PgTransaction {
    tx: Option<Transaction<'static, Postgres>>,
    registry: ModelRegistry,
}

impl PgTransaction {
    fn open(&mut self) -> Result<&mut Transaction<'static, Postgres>, StoreError> {
        self.tx.as_mut().ok_or(StoreError::TransactionFinished)
    }
}

#[async_trait]
impl StoreTransaction for PgTransaction {
    async fn insert(&mut self, table: &str, record: &Record) -> Result<SurrogateKey, StoreError> {
        let model = self
            .registry
            .get(table)
            .ok_or_else(|| StoreError::UnknownTable {
                table: table.to_string(),
            })?;
        let pk = model.primary_key_field().to_string();

        let mut columns: Vec<&str> = Vec::with_capacity(record.len());
        let mut placeholders: Vec<String> = Vec::with_capacity(record.len());
        for (idx, col) in record.keys().enumerate() {
            check_ident(col)?;
            let col_type = model.column_type(col).ok_or_else(|| StoreError::UnknownColumn {
                table: table.to_string(),
                column: col.clone(),
            })?;
            columns.push(col.as_str());
            placeholders.push(format!("${}::{}", idx + 1, col_type.cast()));
        }

        let sql = if columns.is_empty() {
            format!("INSERT INTO {} DEFAULT VALUES RETURNING {}::bigint AS pk_value", table, pk)
        } else {
            format!(
                "INSERT INTO {} ({}) VALUES ({}) RETURNING {}::bigint AS pk_value",
                table,
                columns.join(", "),
                placeholders.join(", "),
                pk
            )
        };

        let mut query = sqlx::query(&sql);
        for value in record.values() {
            query = query.bind(bind_text(value));
        }

        let tx = self.open()?;
        let row = query
            .fetch_one(&mut **tx)
            .await
            .map_err(|e| map_sqlx(table, e))?;
        let id: i64 = row.try_get("pk_value")?;
        Ok(id)
    }

    async fn flush(&mut self) -> Result<(), StoreError> {
        // Each INSERT ... RETURNING has already run inside the transaction,
        // so assigned keys are visible to later statements.
        self.open()?;
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), StoreError> {
        let tx = self.tx.take().ok_or(StoreError::TransactionFinished)?;
        tx.commit()
            .await
            .map_err(|e| StoreError::unavailable(format!("commit failed: {}", e)))
    }

    async fn rollback(&mut self) -> Result<(), StoreError> {
        match self.tx.take() {
            Some(tx) => tx
                .rollback()
                .await
                .map_err(|e| StoreError::unavailable(format!("rollback failed: {}", e))),
            None => Ok(()),
        }
    }
}
