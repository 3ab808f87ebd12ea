//! Per-batch outcomes of a load.

use crate::crypto::hashing::hash_report;
use crate::domain::record::{Record, SurrogateKey};
use serde::Serialize;
use serde_json::{json, Value as JsonValue};
use std::fmt;

/// Why a single record was not persisted. Never fatal to its batch.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RejectionReason {
    /// The natural key is not present in the referenced batch's lookup.
    UnresolvedReference {
        field: String,
        batch: String,
        key: String,
    },
    /// The natural key was duplicated in the referenced batch.
    AmbiguousReference {
        field: String,
        batch: String,
        key: String,
    },
    /// The reference field is absent, null, or not a usable key.
    MissingReference { field: String },
    FieldConversion {
        field: String,
        value: JsonValue,
        reason: String,
    },
    MissingNaturalKey { field: String },
    /// Rejected under `DuplicateKeyPolicy::RejectAll`.
    DuplicateNaturalKey { key: String },
    /// Same resolved link pair as an earlier row of the batch.
    DuplicateLink {
        columns: Vec<String>,
        first_row: usize,
    },
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectionReason::UnresolvedReference { field, batch, key } => {
                write!(f, "unresolved reference: {} '{}' not found in {}", field, key, batch)
            }
            RejectionReason::AmbiguousReference { field, batch, key } => {
                write!(f, "ambiguous reference: {} '{}' is duplicated in {}", field, key, batch)
            }
            RejectionReason::MissingReference { field } => {
                write!(f, "missing reference field '{}'", field)
            }
            RejectionReason::FieldConversion { field, reason, .. } => {
                write!(f, "cannot convert '{}': {}", field, reason)
            }
            RejectionReason::MissingNaturalKey { field } => {
                write!(f, "missing natural key field '{}'", field)
            }
            RejectionReason::DuplicateNaturalKey { key } => {
                write!(f, "duplicate natural key '{}'", key)
            }
            RejectionReason::DuplicateLink { columns, first_row } => {
                write!(
                    f,
                    "duplicate link on ({}), first seen at row {}",
                    columns.join(", "),
                    first_row
                )
            }
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct Rejection {
    /// Index of the record in its batch.
    pub row: usize,
    /// The record as supplied by the caller.
    pub record: Record,
    pub reason: RejectionReason,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct PersistedRecord {
    pub row: usize,
    pub id: SurrogateKey,
    pub natural_key: Option<String>,
    /// The record as supplied by the caller.
    pub source: Record,
    /// The record as written: references replaced by surrogate keys, conversions applied.
    pub stored: Record,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct BatchReport {
    pub name: String,
    pub table: String,
    pub committed: Vec<PersistedRecord>,
    pub rejected: Vec<Rejection>,
}

impl BatchReport {
    pub fn new(name: &str, table: &str) -> Self {
        Self {
            name: name.to_string(),
            table: table.to_string(),
            committed: Vec::new(),
            rejected: Vec::new(),
        }
    }

    pub fn committed_id(&self, natural_key: &str) -> Option<SurrogateKey> {
        self.committed
            .iter()
            .find(|r| r.natural_key.as_deref() == Some(natural_key))
            .map(|r| r.id)
    }
}

#[derive(Serialize, Debug, Clone, PartialEq, Default)]
pub struct LoadReport {
    pub batches: Vec<BatchReport>,
}

impl LoadReport {
    pub fn batch(&self, name: &str) -> Option<&BatchReport> {
        self.batches.iter().find(|b| b.name == name)
    }

    pub fn committed_count(&self) -> usize {
        self.batches.iter().map(|b| b.committed.len()).sum()
    }

    pub fn rejected_count(&self) -> usize {
        self.batches.iter().map(|b| b.rejected.len()).sum()
    }

    /// Digest of what was committed and rejected, ignoring surrogate key values.
    /// Two loads of the same input into fresh targets have equal fingerprints.
    pub fn fingerprint(&self) -> String {
        let doc: Vec<JsonValue> = self
            .batches
            .iter()
            .map(|b| {
                json!({
                    "name": b.name,
                    "table": b.table,
                    "committed": b.committed.iter().map(|r| json!({
                        "row": r.row,
                        "source": r.source,
                    })).collect::<Vec<_>>(),
                    "rejected": b.rejected.iter().map(|r| json!({
                        "row": r.row,
                        "record": r.record,
                        "reason": r.reason,
                    })).collect::<Vec<_>>(),
                })
            })
            .collect();
        hash_report(&JsonValue::Array(doc))
    }
}
