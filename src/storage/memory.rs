//! In-process store with database-like semantics.
//!
//! Sequences never roll back, unique and foreign-key constraints are checked
//! at flush, staged rows only become visible to other readers on commit, and
//! deletes cascade along declared foreign keys. Faults can be injected to
//! exercise rollback paths.

use crate::domain::model::{
    creation_order, resolve_references, EntityModel, ModelRegistry, TableSpec,
};
use crate::domain::record::{Record, StoredRecord, SurrogateKey};
use crate::error::StoreError;
use crate::storage::{Criteria, OrderDirection, Store, StoreTransaction};
use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Failures to inject into a [`MemoryStore`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreFaults {
    /// Inserts succeed this many times (across transactions), then every insert fails.
    pub fail_after_inserts: Option<usize>,
    pub fail_on_flush: bool,
    pub fail_on_commit: bool,
    /// Every operation fails, as if the database were unreachable.
    pub unavailable: bool,
}

#[derive(Default)]
struct TableRows {
    rows: BTreeMap<SurrogateKey, Record>,
    next_id: SurrogateKey,
}

#[derive(Default)]
struct MemoryState {
    registry: ModelRegistry,
    tables: BTreeMap<String, TableRows>,
    committed: KeyIndex,
    faults: StoreFaults,
    inserts: usize,
    flushes: usize,
    commits: usize,
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn with_schema(tables: &[TableSpec]) -> Result<Self, StoreError> {
        let store = Self::new();
        store.apply_schema(tables).await?;
        Ok(store)
    }

    pub async fn set_faults(&self, faults: StoreFaults) {
        self.state.lock().await.faults = faults;
    }

    /// Number of successful commits so far.
    pub async fn commits(&self) -> usize {
        self.state.lock().await.commits
    }

    /// Number of successful flushes so far.
    pub async fn flushes(&self) -> usize {
        self.state.lock().await.flushes
    }
}

fn unavailable_if(faults: &StoreFaults) -> Result<(), StoreError> {
    if faults.unavailable {
        Err(StoreError::unavailable("memory store is marked unavailable"))
    } else {
        Ok(())
    }
}

fn model_for(state: &MemoryState, table: &str) -> Result<Arc<dyn EntityModel>, StoreError> {
    state.registry.get(table).ok_or_else(|| StoreError::UnknownTable {
        table: table.to_string(),
    })
}

fn compare_json(a: Option<&JsonValue>, b: Option<&JsonValue>) -> Ordering {
    match (a, b) {
        (Some(JsonValue::Number(x)), Some(JsonValue::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(JsonValue::String(x)), Some(JsonValue::String(y))) => x.cmp(y),
        (Some(JsonValue::Bool(x)), Some(JsonValue::Bool(y))) => x.cmp(y),
        (None, None) | (Some(JsonValue::Null), Some(JsonValue::Null)) => Ordering::Equal,
        (None, _) | (Some(JsonValue::Null), _) => Ordering::Less,
        (_, None) | (_, Some(JsonValue::Null)) => Ordering::Greater,
        (Some(x), Some(y)) => x.to_string().cmp(&y.to_string()),
    }
}

struct StagedRow {
    table: String,
    id: SurrogateKey,
    record: Record,
}

/// Unique keys of a table: every `unique` column alone, then each composite key.
fn unique_groups(spec: &TableSpec) -> Vec<Vec<String>> {
    spec.columns
        .iter()
        .filter(|c| c.unique)
        .map(|c| vec![c.name.clone()])
        .chain(spec.unique_together.iter().cloned())
        .collect()
}

/// Text form of `record`'s values for `group`; `None` when any is null,
/// since nulls never clash.
fn key_text(record: &Record, group: &[String]) -> Option<String> {
    let mut values = Vec::with_capacity(group.len());
    for column in group {
        match record.get(column) {
            None | Some(JsonValue::Null) => return None,
            Some(value) => values.push(value.clone()),
        }
    }
    Some(JsonValue::Array(values).to_string())
}

/// Row ids and unique-key values per table, for constraint checks without scans.
#[derive(Default)]
struct KeyIndex {
    ids: HashMap<String, HashSet<SurrogateKey>>,
    keys: HashMap<(String, Vec<String>), HashSet<String>>,
}

impl KeyIndex {
    fn contains_id(&self, table: &str, id: SurrogateKey) -> bool {
        self.ids.get(table).map_or(false, |ids| ids.contains(&id))
    }

    fn contains_key(&self, table: &str, group: &[String], key: &str) -> bool {
        self.keys
            .get(&(table.to_string(), group.to_vec()))
            .map_or(false, |keys| keys.contains(key))
    }

    fn add(&mut self, spec: &TableSpec, id: SurrogateKey, record: &Record) {
        let table = &spec.table_name;
        self.ids.entry(table.clone()).or_default().insert(id);
        for group in unique_groups(spec) {
            if let Some(key) = key_text(record, &group) {
                self.keys.entry((table.clone(), group)).or_default().insert(key);
            }
        }
    }

    fn remove(&mut self, spec: &TableSpec, id: SurrogateKey, record: &Record) {
        let table = &spec.table_name;
        if let Some(ids) = self.ids.get_mut(table) {
            ids.remove(&id);
        }
        for group in unique_groups(spec) {
            if let Some(key) = key_text(record, &group) {
                if let Some(keys) = self.keys.get_mut(&(table.clone(), group)) {
                    keys.remove(&key);
                }
            }
        }
    }
}

pub struct MemoryTransaction {
    state: Arc<Mutex<MemoryState>>,
    /// Inserted since the last flush.
    pending: Vec<StagedRow>,
    /// Flushed: constraint-checked and visible to this transaction.
    staged: Vec<StagedRow>,
    index: KeyIndex,
    finished: bool,
}

impl MemoryTransaction {
    fn ensure_open(&self) -> Result<(), StoreError> {
        if self.finished {
            Err(StoreError::TransactionFinished)
        } else {
            Ok(())
        }
    }
}

fn key_exists(state: &MemoryState, staged: &KeyIndex, table: &str, id: SurrogateKey) -> bool {
    state.committed.contains_id(table, id) || staged.contains_id(table, id)
}

fn is_null(value: Option<&JsonValue>) -> bool {
    matches!(value, None | Some(JsonValue::Null))
}

fn check_row(
    state: &MemoryState,
    staged: &KeyIndex,
    spec: &TableSpec,
    row: &StagedRow,
) -> Result<(), StoreError> {
    let violation = |reason: String| StoreError::Constraint {
        table: row.table.clone(),
        reason,
    };

    for column in &spec.columns {
        let value = match row.record.get(&column.name) {
            Some(value) if !is_null(Some(value)) => value,
            _ => {
                if !column.nullable {
                    return Err(violation(format!("column '{}' is NOT NULL", column.name)));
                }
                continue;
            }
        };

        if !column.col_type.accepts(value) {
            return Err(violation(format!(
                "invalid input {} for column '{}' of type {}",
                value,
                column.name,
                column.col_type.sql()
            )));
        }

        if let Some(fk) = &column.references {
            let parent = value
                .as_i64()
                .ok_or_else(|| violation(format!("'{}' is not a key", column.name)))?;
            if !key_exists(state, staged, &fk.table, parent) {
                return Err(violation(format!(
                    "foreign key '{}' = {} has no row in '{}'",
                    column.name, parent, fk.table
                )));
            }
        }
    }

    for group in unique_groups(spec) {
        let Some(key) = key_text(&row.record, &group) else {
            continue;
        };
        let clash = staged.contains_key(&row.table, &group, &key)
            || state.committed.contains_key(&row.table, &group, &key);
        if clash {
            return Err(violation(format!(
                "duplicate value {} for unique ({})",
                key,
                group.join(", ")
            )));
        }
    }

    Ok(())
}

#[async_trait]
impl StoreTransaction for MemoryTransaction {
    async fn insert(&mut self, table: &str, record: &Record) -> Result<SurrogateKey, StoreError> {
        self.ensure_open()?;
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        unavailable_if(&state.faults)?;
        if let Some(limit) = state.faults.fail_after_inserts {
            if state.inserts >= limit {
                return Err(StoreError::unavailable("connection lost during insert"));
            }
        }

        let model = model_for(state, table)?;
        let pk = model.primary_key_field().to_string();
        if record.contains_key(&pk) {
            return Err(StoreError::Constraint {
                table: table.to_string(),
                reason: format!("'{}' is assigned by the store", pk),
            });
        }
        if let Some(column) = record.keys().find(|c| model.column_type(c).is_none()) {
            return Err(StoreError::UnknownColumn {
                table: table.to_string(),
                column: column.clone(),
            });
        }

        let rows = state.tables.entry(table.to_string()).or_default();
        rows.next_id += 1;
        let id = rows.next_id;
        state.inserts += 1;

        let mut stored = record.clone();
        stored.insert(pk, JsonValue::from(id));
        self.pending.push(StagedRow {
            table: table.to_string(),
            id,
            record: stored,
        });
        Ok(id)
    }

    async fn flush(&mut self) -> Result<(), StoreError> {
        self.ensure_open()?;
        let mut state = self.state.lock().await;
        unavailable_if(&state.faults)?;
        if state.faults.fail_on_flush {
            return Err(StoreError::unavailable("flush failed"));
        }

        let pending = std::mem::take(&mut self.pending);
        // Rows checked so far in this flush, unindexed again if a later row fails.
        let mut checked: Vec<(Arc<dyn EntityModel>, &StagedRow)> = Vec::new();
        for row in &pending {
            let outcome = model_for(&state, &row.table).and_then(|model| {
                check_row(&state, &self.index, model.spec(), row)?;
                Ok(model)
            });
            match outcome {
                Ok(model) => {
                    self.index.add(model.spec(), row.id, &row.record);
                    checked.push((model, row));
                }
                Err(e) => {
                    for (model, done) in checked {
                        self.index.remove(model.spec(), done.id, &done.record);
                    }
                    return Err(e);
                }
            }
        }
        drop(checked);
        state.flushes += 1;
        drop(state);

        self.staged.extend(pending);
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), StoreError> {
        self.flush().await?;
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        if state.faults.fail_on_commit {
            return Err(StoreError::unavailable("commit failed"));
        }
        for row in self.staged.drain(..) {
            if let Some(model) = state.registry.get(&row.table) {
                state.committed.add(model.spec(), row.id, &row.record);
            }
            state
                .tables
                .entry(row.table)
                .or_default()
                .rows
                .insert(row.id, row.record);
        }
        self.index = KeyIndex::default();
        state.commits += 1;
        self.finished = true;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), StoreError> {
        self.pending.clear();
        self.staged.clear();
        self.index = KeyIndex::default();
        self.finished = true;
        Ok(())
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn apply_schema(&self, tables: &[TableSpec]) -> Result<(), StoreError> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        unavailable_if(&state.faults)?;
        let resolved = resolve_references(tables, |t| {
            state.registry.get(t).map(|m| m.primary_key_field().to_string())
        })?;
        let ordered = creation_order(&resolved)?;

        for spec in &ordered {
            for (_, fk) in spec.foreign_keys() {
                let declared = tables.iter().any(|t| t.table_name == fk.table);
                if !declared && state.registry.get(&fk.table).is_none() {
                    return Err(StoreError::UnknownTable {
                        table: fk.table.clone(),
                    });
                }
            }
        }
        for spec in ordered {
            if state.registry.get(&spec.table_name).is_some() {
                continue;
            }
            state.registry.register_spec(spec.clone());
            state.tables.entry(spec.table_name.clone()).or_default();
        }
        Ok(())
    }

    async fn registry(&self) -> ModelRegistry {
        self.state.lock().await.registry.clone()
    }

    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError> {
        unavailable_if(&self.state.lock().await.faults)?;
        Ok(Box::new(MemoryTransaction {
            state: self.state.clone(),
            pending: Vec::new(),
            staged: Vec::new(),
            index: KeyIndex::default(),
            finished: false,
        }))
    }

    async fn query(
        &self,
        table: &str,
        criteria: &Criteria,
    ) -> Result<Vec<StoredRecord>, StoreError> {
        let state = self.state.lock().await;
        unavailable_if(&state.faults)?;
        let model = model_for(&state, table)?;

        let referenced = criteria
            .filters
            .keys()
            .chain(criteria.order_by.as_ref().map(|o| &o.field));
        for field in referenced {
            if model.column_type(field).is_none() {
                return Err(StoreError::UnknownColumn {
                    table: table.to_string(),
                    column: field.clone(),
                });
            }
        }

        let mut out: Vec<StoredRecord> = state
            .tables
            .get(table)
            .map(|t| {
                t.rows
                    .iter()
                    .filter(|(_, r)| criteria.matches(r))
                    .map(|(id, r)| StoredRecord {
                        id: *id,
                        fields: r.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default();

        if let Some(order) = &criteria.order_by {
            out.sort_by(|a, b| {
                let ord = compare_json(a.fields.get(&order.field), b.fields.get(&order.field))
                    .then(a.id.cmp(&b.id));
                match order.direction {
                    OrderDirection::Asc => ord,
                    OrderDirection::Desc => ord.reverse(),
                }
            });
        }
        if let Some(limit) = criteria.limit {
            out.truncate(limit as usize);
        }
        Ok(out)
    }

    async fn count(&self, table: &str) -> Result<u64, StoreError> {
        let state = self.state.lock().await;
        unavailable_if(&state.faults)?;
        model_for(&state, table)?;
        Ok(state
            .tables
            .get(table)
            .map(|t| t.rows.len() as u64)
            .unwrap_or(0))
    }

    async fn delete(&self, table: &str, criteria: &Criteria) -> Result<u64, StoreError> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        unavailable_if(&state.faults)?;
        model_for(state, table)?;

        let roots: BTreeSet<SurrogateKey> = state
            .tables
            .get(table)
            .map(|t| {
                t.rows
                    .iter()
                    .filter(|(_, r)| criteria.matches(r))
                    .map(|(id, _)| *id)
                    .collect()
            })
            .unwrap_or_default();

        // Plan the whole cascade first so a restricted child leaves everything untouched.
        let mut doomed: BTreeMap<String, BTreeSet<SurrogateKey>> = BTreeMap::new();
        let mut queue = vec![(table.to_string(), roots.clone())];
        while let Some((tbl, ids)) = queue.pop() {
            let already = doomed.entry(tbl.clone()).or_default();
            let fresh: BTreeSet<SurrogateKey> = ids.difference(already).copied().collect();
            if fresh.is_empty() {
                continue;
            }
            already.extend(fresh.iter().copied());

            for (child, column, cascade) in state.registry.referencing(&tbl) {
                let child_ids: BTreeSet<SurrogateKey> = state
                    .tables
                    .get(&child)
                    .map(|t| {
                        t.rows
                            .iter()
                            .filter(|(_, r)| {
                                r.get(&column)
                                    .and_then(|v| v.as_i64())
                                    .map(|parent| fresh.contains(&parent))
                                    .unwrap_or(false)
                            })
                            .map(|(id, _)| *id)
                            .collect()
                    })
                    .unwrap_or_default();
                if child_ids.is_empty() {
                    continue;
                }
                if !cascade {
                    return Err(StoreError::Constraint {
                        table: child,
                        reason: format!("rows still reference '{}' through '{}'", tbl, column),
                    });
                }
                queue.push((child, child_ids));
            }
        }

        for (tbl, ids) in doomed {
            let model = state.registry.get(&tbl);
            if let Some(rows) = state.tables.get_mut(&tbl) {
                for id in ids {
                    if let (Some(record), Some(model)) = (rows.rows.remove(&id), &model) {
                        state.committed.remove(model.spec(), id, &record);
                    }
                }
            }
        }
        Ok(roots.len() as u64)
    }

    async fn list_tables(&self) -> Result<Vec<String>, StoreError> {
        let state = self.state.lock().await;
        unavailable_if(&state.faults)?;
        Ok(state.registry.list_models())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        unavailable_if(&self.state.lock().await.faults)
    }
}
