//! Load plans: the ordered batches of a load and how they reference each other.

use crate::domain::convert::ConversionKind;
use crate::domain::model::{validate_ident, ModelRegistry};
use crate::domain::record::Record;
use crate::error::PlanError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Batches in dependency order: referenced batches before referencing ones.
#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
pub struct LoadPlan {
    pub batches: Vec<BatchSpec>,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct BatchSpec {
    /// Name other batches use to reference this one.
    pub name: String,
    /// Destination table.
    pub table: String,
    /// Field holding this batch's natural key. Required when another batch references it.
    #[serde(default)]
    pub natural_key: Option<String>,
    #[serde(default)]
    pub references: Vec<ReferenceSpec>,
    #[serde(default)]
    pub conversions: Vec<FieldConversion>,
    /// Present for many-to-many link batches.
    #[serde(default)]
    pub link: Option<LinkSpec>,
    #[serde(default)]
    pub on_duplicate_key: DuplicateKeyPolicy,
    #[serde(default)]
    pub records: Vec<Record>,
}

/// `field` carries a natural key of batch `batch`; the resolved surrogate key
/// is written to `column` and `field` is dropped from the stored record.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct ReferenceSpec {
    pub field: String,
    pub batch: String,
    pub column: String,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct FieldConversion {
    pub field: String,
    pub kind: ConversionKind,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct LinkSpec {
    /// Resolved reference columns forming the link pair.
    pub columns: Vec<String>,
    #[serde(default)]
    pub on_duplicate: DuplicateLinkPolicy,
}

/// What to do when two records of one batch share a natural key.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateKeyPolicy {
    /// Abort the whole load with `DuplicateNaturalKey`.
    #[default]
    Fail,
    /// Reject every record carrying the duplicated key; references to it
    /// are rejected as ambiguous. The rest of the batch loads.
    RejectAll,
}

/// What to do when a link batch contains the same resolved pair twice.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateLinkPolicy {
    /// The first occurrence loads, later ones are rejected as `DuplicateLink`.
    #[default]
    Reject,
    /// Every occurrence loads as a separate historical link row.
    Allow,
}

impl BatchSpec {
    pub fn new(name: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: table.into(),
            natural_key: None,
            references: Vec::new(),
            conversions: Vec::new(),
            link: None,
            on_duplicate_key: DuplicateKeyPolicy::default(),
            records: Vec::new(),
        }
    }

    pub fn natural_key(mut self, field: impl Into<String>) -> Self {
        self.natural_key = Some(field.into());
        self
    }

    pub fn reference(
        mut self,
        field: impl Into<String>,
        batch: impl Into<String>,
        column: impl Into<String>,
    ) -> Self {
        self.references.push(ReferenceSpec {
            field: field.into(),
            batch: batch.into(),
            column: column.into(),
        });
        self
    }

    pub fn convert(mut self, field: impl Into<String>, kind: ConversionKind) -> Self {
        self.conversions.push(FieldConversion {
            field: field.into(),
            kind,
        });
        self
    }

    pub fn link<I, S>(mut self, columns: I, on_duplicate: DuplicateLinkPolicy) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.link = Some(LinkSpec {
            columns: columns.into_iter().map(Into::into).collect(),
            on_duplicate,
        });
        self
    }

    pub fn on_duplicate_key(mut self, policy: DuplicateKeyPolicy) -> Self {
        self.on_duplicate_key = policy;
        self
    }

    pub fn records(mut self, records: Vec<Record>) -> Self {
        self.records = records;
        self
    }
}

impl LoadPlan {
    pub fn new(batches: Vec<BatchSpec>) -> Self {
        Self { batches }
    }

    /// Checks the plan's structure. Batch order is taken as given: a
    /// reference to a later batch is an error, never reordered.
    pub fn validate(&self) -> Result<(), PlanError> {
        if self.batches.is_empty() {
            return Err(PlanError::Empty);
        }

        let positions: BTreeMap<&str, usize> = self
            .batches
            .iter()
            .enumerate()
            .map(|(i, b)| (b.name.as_str(), i))
            .collect();
        if positions.len() != self.batches.len() {
            let mut seen = BTreeSet::new();
            for b in &self.batches {
                if !seen.insert(b.name.as_str()) {
                    return Err(PlanError::DuplicateBatchName {
                        name: b.name.clone(),
                    });
                }
            }
        }

        for (idx, batch) in self.batches.iter().enumerate() {
            let ident_err = |ident: &str| PlanError::InvalidIdentifier {
                batch: batch.name.clone(),
                ident: ident.to_string(),
            };
            if !validate_ident(&batch.table) {
                return Err(ident_err(&batch.table));
            }
            if let Some(nk) = &batch.natural_key {
                if !validate_ident(nk) {
                    return Err(ident_err(nk));
                }
            }

            for r in &batch.references {
                if !validate_ident(&r.column) {
                    return Err(ident_err(&r.column));
                }
                let target_idx = match positions.get(r.batch.as_str()) {
                    Some(i) => *i,
                    None => {
                        return Err(PlanError::UnknownBatch {
                            batch: batch.name.clone(),
                            target: r.batch.clone(),
                        })
                    }
                };
                if target_idx >= idx {
                    return Err(PlanError::ForwardReference {
                        batch: batch.name.clone(),
                        target: r.batch.clone(),
                    });
                }
                if self.batches[target_idx].natural_key.is_none() {
                    return Err(PlanError::TargetWithoutNaturalKey {
                        batch: batch.name.clone(),
                        target: r.batch.clone(),
                    });
                }
            }

            if let Some(link) = &batch.link {
                for col in &link.columns {
                    if !batch.references.iter().any(|r| &r.column == col) {
                        return Err(PlanError::UnknownLinkColumn {
                            batch: batch.name.clone(),
                            column: col.clone(),
                        });
                    }
                }
            }
        }

        Ok(())
    }

    /// Checks every batch against the tables a store has registered: the
    /// target table must exist and every column the batch would write
    /// (reference columns, the natural key, converted fields, and every
    /// record field that is not a reference source) must belong to it.
    pub fn check_targets(&self, registry: &ModelRegistry) -> Result<(), PlanError> {
        for batch in &self.batches {
            let model = registry.get(&batch.table).ok_or_else(|| PlanError::UnknownTable {
                batch: batch.name.clone(),
                table: batch.table.clone(),
            })?;
            let sources: BTreeSet<&str> =
                batch.references.iter().map(|r| r.field.as_str()).collect();

            let mut written: BTreeSet<&str> = BTreeSet::new();
            written.extend(batch.references.iter().map(|r| r.column.as_str()));
            written.extend(batch.natural_key.as_deref());
            written.extend(batch.conversions.iter().map(|c| c.field.as_str()));
            for record in &batch.records {
                written.extend(
                    record
                        .keys()
                        .map(String::as_str)
                        .filter(|field| !sources.contains(field)),
                );
            }

            for column in written {
                if column == model.primary_key_field() {
                    return Err(PlanError::PrimaryKeyAssigned {
                        batch: batch.name.clone(),
                        table: batch.table.clone(),
                        column: column.to_string(),
                    });
                }
                if model.column_type(column).is_none() {
                    return Err(PlanError::UnknownColumn {
                        batch: batch.name.clone(),
                        table: batch.table.clone(),
                        column: column.to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    pub fn total_records(&self) -> usize {
        self.batches.iter().map(|b| b.records.len()).sum()
    }
}
