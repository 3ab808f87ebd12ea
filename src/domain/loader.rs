//! The natural-key reconciliation loader.
//!
//! A load walks the plan's batches in the order given. For each batch it
//! resolves natural-key references through the lookups of earlier batches,
//! applies declared conversions, inserts the surviving records, flushes so
//! their surrogate keys are assigned, and only then builds the batch's own
//! lookup. Everything happens in one transaction: per-record problems end up
//! in the report, while a store failure or timeout rolls the whole load back.

use crate::domain::lookup::{duplicate_keys, KeyLookup, Resolution};
use crate::domain::plan::{BatchSpec, DuplicateKeyPolicy, DuplicateLinkPolicy, LoadPlan};
use crate::domain::record::{natural_key_of, Record, SurrogateKey};
use crate::domain::report::{BatchReport, LoadReport, PersistedRecord, Rejection, RejectionReason};
use crate::error::{LoadError, StoreError};
use crate::storage::{Store, StoreTransaction};
use serde_json::Value as JsonValue;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::Duration;
use tracing::Instrument;

#[derive(Debug, Clone, Default)]
pub struct LoaderOptions {
    /// Upper bound for the whole load; exceeding it rolls everything back.
    pub timeout: Option<Duration>,
}

pub struct Loader<'s> {
    store: &'s dyn Store,
    options: LoaderOptions,
}

fn unavailable(stage: impl Into<String>) -> impl FnOnce(StoreError) -> LoadError {
    let stage = stage.into();
    move |source| LoadError::PersistenceUnavailable { stage, source }
}

impl<'s> Loader<'s> {
    pub fn new(store: &'s dyn Store) -> Self {
        Self {
            store,
            options: LoaderOptions::default(),
        }
    }

    pub fn with_options(mut self, options: LoaderOptions) -> Self {
        self.options = options;
        self
    }

    /// Runs `plan` as one atomic unit and commits it.
    ///
    /// Returns the per-batch report on success. On any error nothing from
    /// any batch is committed.
    pub async fn load(&self, plan: &LoadPlan) -> Result<LoadReport, LoadError> {
        plan.validate()?;
        let span = tracing::info_span!(
            "load",
            batches = plan.batches.len(),
            records = plan.total_records()
        );
        self.load_validated(plan).instrument(span).await
    }

    async fn load_validated(&self, plan: &LoadPlan) -> Result<LoadReport, LoadError> {
        plan.check_targets(&self.store.registry().await)?;
        let mut tx = self.store.begin().await.map_err(unavailable("begin"))?;

        let outcome = {
            let run = self.run_batches(plan, tx.as_mut());
            match self.options.timeout {
                Some(limit) => match tokio::time::timeout(limit, run).await {
                    Ok(result) => result,
                    Err(_) => Err(LoadError::TimedOut { budget: limit }),
                },
                None => run.await,
            }
        };

        match outcome {
            Ok(report) => {
                if let Err(source) = tx.commit().await {
                    if let Err(e) = tx.rollback().await {
                        tracing::warn!(error = %e, "rollback after failed commit also failed");
                    }
                    tracing::error!(error = %source, "commit failed, load rolled back");
                    return Err(unavailable("commit")(source));
                }
                tracing::info!(
                    committed = report.committed_count(),
                    rejected = report.rejected_count(),
                    "load committed"
                );
                Ok(report)
            }
            Err(err) => {
                if let Err(e) = tx.rollback().await {
                    tracing::warn!(error = %e, "rollback failed");
                }
                tracing::error!(error = %err, "load aborted and rolled back");
                Err(err)
            }
        }
    }

    async fn run_batches(
        &self,
        plan: &LoadPlan,
        tx: &mut dyn StoreTransaction,
    ) -> Result<LoadReport, LoadError> {
        // Lookups live only for this load.
        let mut lookups: HashMap<&str, KeyLookup> = HashMap::new();
        let mut report = LoadReport::default();

        for batch in &plan.batches {
            let (batch_report, lookup) = self.load_batch(batch, &lookups, tx).await?;
            if let Some(lookup) = lookup {
                tracing::debug!(batch = %batch.name, keys = lookup.len(), "lookup built");
                lookups.insert(batch.name.as_str(), lookup);
            }
            report.batches.push(batch_report);
        }

        Ok(report)
    }

    async fn load_batch(
        &self,
        batch: &BatchSpec,
        lookups: &HashMap<&str, KeyLookup>,
        tx: &mut dyn StoreTransaction,
    ) -> Result<(BatchReport, Option<KeyLookup>), LoadError> {
        let mut rejected: BTreeMap<usize, RejectionReason> = BTreeMap::new();
        let mut natural: Vec<Option<String>> = vec![None; batch.records.len()];
        let mut ambiguous: HashSet<String> = HashSet::new();

        if let Some(field) = &batch.natural_key {
            for (row, source) in batch.records.iter().enumerate() {
                match source.get(field).and_then(natural_key_of) {
                    Some(key) => natural[row] = Some(key),
                    None => {
                        rejected.insert(
                            row,
                            RejectionReason::MissingNaturalKey {
                                field: field.clone(),
                            },
                        );
                    }
                }
            }

            let dups = duplicate_keys(
                natural
                    .iter()
                    .enumerate()
                    .filter_map(|(row, key)| key.as_deref().map(|k| (row, k))),
            );
            if let Some((key, rows)) = dups.iter().next() {
                if batch.on_duplicate_key == DuplicateKeyPolicy::Fail {
                    return Err(LoadError::DuplicateNaturalKey {
                        batch: batch.name.clone(),
                        key: key.clone(),
                        rows: rows.clone(),
                    });
                }
            }
            for (key, rows) in dups {
                for row in rows {
                    rejected.insert(row, RejectionReason::DuplicateNaturalKey { key: key.clone() });
                }
                ambiguous.insert(key);
            }
        }

        let mut rows: Vec<usize> = Vec::with_capacity(batch.records.len());
        let mut records: Vec<Record> = Vec::with_capacity(batch.records.len());
        let mut links_seen: HashMap<Vec<SurrogateKey>, usize> = HashMap::new();

        for (row, source) in batch.records.iter().enumerate() {
            if rejected.contains_key(&row) {
                continue;
            }
            let stored = match prepare(batch, source, lookups) {
                Ok(stored) => stored,
                Err(reason) => {
                    rejected.insert(row, reason);
                    continue;
                }
            };

            if let Some(link) = &batch.link {
                if link.on_duplicate == DuplicateLinkPolicy::Reject {
                    let pair: Vec<SurrogateKey> = link
                        .columns
                        .iter()
                        .filter_map(|c| stored.get(c).and_then(JsonValue::as_i64))
                        .collect();
                    if let Some(first_row) = links_seen.get(&pair) {
                        rejected.insert(
                            row,
                            RejectionReason::DuplicateLink {
                                columns: link.columns.clone(),
                                first_row: *first_row,
                            },
                        );
                        continue;
                    }
                    links_seen.insert(pair, row);
                }
            }

            rows.push(row);
            records.push(stored);
        }

        let stage = format!("batch '{}'", batch.name);
        let ids = tx
            .insert_many(&batch.table, &records)
            .await
            .map_err(unavailable(stage.clone()))?;
        if ids.len() != records.len() {
            return Err(unavailable(stage)(StoreError::unavailable(format!(
                "store returned {} keys for {} records",
                ids.len(),
                records.len()
            ))));
        }
        // Keys must be visible in the transaction before the lookup is built.
        tx.flush().await.map_err(unavailable(stage))?;

        let lookup = match batch.natural_key {
            Some(_) => {
                let pairs = rows
                    .iter()
                    .zip(ids.iter())
                    .filter_map(|(row, id)| natural[*row].clone().map(|key| (key, *id)));
                let lookup = KeyLookup::build(pairs, ambiguous).map_err(|key| {
                    LoadError::DuplicateNaturalKey {
                        batch: batch.name.clone(),
                        key,
                        rows: Vec::new(),
                    }
                })?;
                Some(lookup)
            }
            None => None,
        };

        let mut report = BatchReport::new(&batch.name, &batch.table);
        for ((row, id), stored) in rows.into_iter().zip(ids).zip(records) {
            report.committed.push(PersistedRecord {
                row,
                id,
                natural_key: natural[row].clone(),
                source: batch.records[row].clone(),
                stored,
            });
        }
        for (row, reason) in rejected {
            tracing::warn!(batch = %batch.name, row, %reason, "record rejected");
            report.rejected.push(Rejection {
                row,
                record: batch.records[row].clone(),
                reason,
            });
        }

        tracing::info!(
            batch = %batch.name,
            table = %batch.table,
            inserted = report.committed.len(),
            rejected = report.rejected.len(),
            "batch staged"
        );
        Ok((report, lookup))
    }
}

/// Substitutes surrogate keys for natural-key references and applies conversions.
fn prepare(
    batch: &BatchSpec,
    source: &Record,
    lookups: &HashMap<&str, KeyLookup>,
) -> Result<Record, RejectionReason> {
    let mut stored = source.clone();

    for reference in &batch.references {
        let key = stored
            .remove(&reference.field)
            .as_ref()
            .and_then(natural_key_of)
            .ok_or_else(|| RejectionReason::MissingReference {
                field: reference.field.clone(),
            })?;

        let resolution = lookups
            .get(reference.batch.as_str())
            .map(|lookup| lookup.resolve(&key))
            .unwrap_or(Resolution::Missing);

        match resolution {
            Resolution::Found(id) => {
                stored.insert(reference.column.clone(), JsonValue::from(id));
            }
            Resolution::Missing => {
                return Err(RejectionReason::UnresolvedReference {
                    field: reference.field.clone(),
                    batch: reference.batch.clone(),
                    key,
                })
            }
            Resolution::Ambiguous => {
                return Err(RejectionReason::AmbiguousReference {
                    field: reference.field.clone(),
                    batch: reference.batch.clone(),
                    key,
                })
            }
        }
    }

    for conversion in &batch.conversions {
        let value = stored
            .get(&conversion.field)
            .cloned()
            .unwrap_or(JsonValue::Null);
        match conversion.kind.apply(&value) {
            Ok(converted) => {
                stored.insert(conversion.field.clone(), converted);
            }
            Err(reason) => {
                return Err(RejectionReason::FieldConversion {
                    field: conversion.field.clone(),
                    value,
                    reason,
                })
            }
        }
    }

    Ok(stored)
}
