//! Structured error types for the import library.
//!
//! Library surfaces return these `thiserror` enums; the service layer and the
//! binaries wrap them in `anyhow` for convenience.

use thiserror::Error;

/// Failures reported by a persistence collaborator.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Connection lost, pool exhausted, or the backend refused the operation.
    #[error("persistence layer unavailable: {reason}")]
    Unavailable { reason: String },

    /// A database-level constraint rejected a write (unique, foreign key, not null).
    #[error("constraint violation on '{table}': {reason}")]
    Constraint { table: String, reason: String },

    #[error("unknown table '{table}'")]
    UnknownTable { table: String },

    #[error("table '{table}' has no column '{column}'")]
    UnknownColumn { table: String, column: String },

    #[error("invalid schema: {0}")]
    Schema(#[from] SchemaError),

    /// The transaction handle was already committed or rolled back.
    #[error("transaction already finished")]
    TransactionFinished,

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

impl StoreError {
    pub fn unavailable(reason: impl Into<String>) -> Self {
        StoreError::Unavailable {
            reason: reason.into(),
        }
    }
}

/// Problems with declared table specs.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum SchemaError {
    #[error("invalid identifier '{ident}'")]
    InvalidIdentifier { ident: String },

    #[error("table '{table}' is declared more than once")]
    DuplicateTable { table: String },

    #[error("table '{table}' has no column '{column}'")]
    UnknownColumn { table: String, column: String },

    #[error("foreign keys may only reference the primary key of '{table}', not '{column}'")]
    NotPrimaryKey { table: String, column: String },

    #[error("foreign keys form a cycle between {tables:?}")]
    Cycle { tables: Vec<String> },
}

/// Structural problems with a load plan, detected before any write.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum PlanError {
    #[error("load plan contains no batches")]
    Empty,

    #[error("batch name '{name}' is declared more than once")]
    DuplicateBatchName { name: String },

    #[error("batch '{batch}' references unknown batch '{target}'")]
    UnknownBatch { batch: String, target: String },

    /// The caller supplied batches out of dependency order.
    #[error("batch '{batch}' references '{target}', which is loaded later")]
    ForwardReference { batch: String, target: String },

    #[error("batch '{batch}' references '{target}', which declares no natural key")]
    TargetWithoutNaturalKey { batch: String, target: String },

    #[error("batch '{batch}' declares link column '{column}' that no reference produces")]
    UnknownLinkColumn { batch: String, column: String },

    #[error("batch '{batch}' uses invalid identifier '{ident}'")]
    InvalidIdentifier { batch: String, ident: String },

    #[error("batch '{batch}' targets unregistered table '{table}'")]
    UnknownTable { batch: String, table: String },

    #[error("batch '{batch}' writes column '{column}', which table '{table}' does not have")]
    UnknownColumn {
        batch: String,
        table: String,
        column: String,
    },

    #[error("batch '{batch}' sets '{column}', the primary key the store assigns in '{table}'")]
    PrimaryKeyAssigned {
        batch: String,
        table: String,
        column: String,
    },
}

/// Terminal outcomes of a multi-batch load. Any of these means nothing was committed.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("invalid load plan: {0}")]
    Plan(#[from] PlanError),

    /// Two records of one batch share a natural key and the batch policy is `Fail`.
    #[error("duplicate natural key '{key}' in batch '{batch}' (rows {rows:?})")]
    DuplicateNaturalKey {
        batch: String,
        key: String,
        rows: Vec<usize>,
    },

    /// The store failed; the whole load was rolled back. `stage` is `begin`,
    /// `commit`, or the batch being written.
    #[error("persistence layer unavailable during {stage}: {source}")]
    PersistenceUnavailable {
        stage: String,
        #[source]
        source: StoreError,
    },

    #[error("load exceeded its {budget:?} time budget and was rolled back")]
    TimedOut { budget: std::time::Duration },
}

/// Configuration read from the environment.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing required environment variable {name}")]
    Missing { name: &'static str },

    #[error("environment variable {name} has invalid value '{value}': {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

/// Problems turning tabular input into records.
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("expected {expected}, got {got}")]
    Shape { expected: String, got: String },

    #[error("column '{column}' has {len} values, expected {expected}")]
    RaggedColumn {
        column: String,
        len: usize,
        expected: usize,
    },
}
