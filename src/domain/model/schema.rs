//! Table declarations and DDL generation.

use crate::error::SchemaError;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::{BTreeMap, BTreeSet};
use utoipa::ToSchema;

#[derive(Deserialize, Serialize, Debug, ToSchema, Clone, PartialEq)]
pub struct TableSpec {
    pub table_name: String,
    /// Surrogate key column, always a `BIGSERIAL`.
    #[serde(default = "default_primary_key")]
    pub primary_key_field: String,
    pub columns: Vec<ColumnSpec>,
    /// Composite unique keys, e.g. `[["student_id", "course_id"]]`.
    #[serde(default)]
    pub unique_together: Vec<Vec<String>>,
}

#[derive(Deserialize, Serialize, Debug, ToSchema, Clone, PartialEq)]
pub struct ColumnSpec {
    pub name: String,
    pub col_type: ColumnType,
    #[serde(default)]
    pub nullable: bool,
    #[serde(default)]
    pub unique: bool,
    #[serde(default)]
    pub references: Option<ForeignKeySpec>,
}

#[derive(Deserialize, Serialize, Debug, ToSchema, Clone, PartialEq)]
pub struct ForeignKeySpec {
    pub table: String,
    /// Referenced column. Filled in with the parent's primary key when the
    /// schema is applied; only primary keys can be referenced.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<String>,
    /// Deleting the referenced row deletes this row as well.
    #[serde(default)]
    pub on_delete_cascade: bool,
}

#[derive(Deserialize, Serialize, Debug, ToSchema, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    Text,
    Int,
    BigInt,
    Float,
    Bool,
    Date,
    Timestamptz,
    Jsonb,
}

fn default_primary_key() -> String {
    "id".to_string()
}

impl ForeignKeySpec {
    pub fn target_column(&self) -> &str {
        self.column.as_deref().unwrap_or("id")
    }
}

impl ColumnType {
    pub fn sql(&self) -> &'static str {
        match self {
            ColumnType::Text => "TEXT",
            ColumnType::Int => "INTEGER",
            ColumnType::BigInt => "BIGINT",
            ColumnType::Float => "DOUBLE PRECISION",
            ColumnType::Bool => "BOOLEAN",
            ColumnType::Date => "DATE",
            ColumnType::Timestamptz => "TIMESTAMPTZ",
            ColumnType::Jsonb => "JSONB",
        }
    }

    /// Whether `value`, bound as text and cast to this type, would be accepted
    /// by Postgres. Null is handled by the caller.
    pub fn accepts(&self, value: &JsonValue) -> bool {
        match (self, value) {
            (ColumnType::Text, _) => true,
            (ColumnType::Jsonb, JsonValue::String(s)) => {
                serde_json::from_str::<JsonValue>(s).is_ok()
            }
            (ColumnType::Jsonb, _) => true,
            (ColumnType::Int, JsonValue::Number(n)) => {
                n.as_i64().map_or(false, |v| i32::try_from(v).is_ok())
            }
            (ColumnType::Int, JsonValue::String(s)) => s.trim().parse::<i32>().is_ok(),
            (ColumnType::BigInt, JsonValue::Number(n)) => n.as_i64().is_some(),
            (ColumnType::BigInt, JsonValue::String(s)) => s.trim().parse::<i64>().is_ok(),
            (ColumnType::Float, JsonValue::Number(_)) => true,
            (ColumnType::Float, JsonValue::String(s)) => s.trim().parse::<f64>().is_ok(),
            (ColumnType::Bool, JsonValue::Bool(_)) => true,
            (ColumnType::Bool, JsonValue::Number(n)) => matches!(n.as_i64(), Some(0 | 1)),
            (ColumnType::Bool, JsonValue::String(s)) => matches!(
                s.trim().to_ascii_lowercase().as_str(),
                "t" | "true" | "y" | "yes" | "on" | "1" | "f" | "false" | "n" | "no" | "off" | "0"
            ),
            (ColumnType::Date, JsonValue::String(s)) => is_date(s) || is_timestamp(s),
            (ColumnType::Timestamptz, JsonValue::String(s)) => is_timestamp(s) || is_date(s),
            _ => false,
        }
    }

    /// Postgres cast suffix used when binding dynamic values.
    pub fn cast(&self) -> &'static str {
        match self {
            ColumnType::Text => "text",
            ColumnType::Int => "int4",
            ColumnType::BigInt => "int8",
            ColumnType::Float => "float8",
            ColumnType::Bool => "bool",
            ColumnType::Date => "date",
            ColumnType::Timestamptz => "timestamptz",
            ColumnType::Jsonb => "jsonb",
        }
    }
}

fn is_date(text: &str) -> bool {
    chrono::NaiveDate::parse_from_str(text.trim(), "%Y-%m-%d").is_ok()
}

fn is_timestamp(text: &str) -> bool {
    let text = text.trim();
    chrono::DateTime::parse_from_rfc3339(text).is_ok()
        || chrono::NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S").is_ok()
        || chrono::NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S").is_ok()
}

pub fn validate_ident(ident: &str) -> bool {
    let mut chars = ident.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn check_ident(ident: &str) -> Result<(), SchemaError> {
    if validate_ident(ident) {
        Ok(())
    } else {
        Err(SchemaError::InvalidIdentifier {
            ident: ident.to_string(),
        })
    }
}

impl TableSpec {
    pub fn column(&self, name: &str) -> Option<&ColumnSpec> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_type(&self, name: &str) -> Option<ColumnType> {
        if name == self.primary_key_field {
            return Some(ColumnType::BigInt);
        }
        self.column(name).map(|c| c.col_type)
    }

    /// Foreign-key columns of this table: `(column, spec)`.
    pub fn foreign_keys(&self) -> impl Iterator<Item = (&str, &ForeignKeySpec)> {
        self.columns
            .iter()
            .filter_map(|c| c.references.as_ref().map(|fk| (c.name.as_str(), fk)))
    }

    pub fn validate(&self) -> Result<(), SchemaError> {
        check_ident(&self.table_name)?;
        check_ident(&self.primary_key_field)?;
        for c in &self.columns {
            check_ident(&c.name)?;
            if let Some(fk) = &c.references {
                check_ident(&fk.table)?;
            }
        }
        for group in &self.unique_together {
            for col in group {
                if self.column(col).is_none() {
                    return Err(SchemaError::UnknownColumn {
                        table: self.table_name.clone(),
                        column: col.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Postgres `CREATE TABLE IF NOT EXISTS` statement.
    pub fn create_table_sql(&self) -> String {
        let mut cols_sql = vec![format!("{} BIGSERIAL PRIMARY KEY", self.primary_key_field)];

        for c in &self.columns {
            if c.name == self.primary_key_field {
                continue;
            }
            let mut col = format!("{} {}", c.name, c.col_type.sql());
            if !c.nullable {
                col.push_str(" NOT NULL");
            }
            if c.unique {
                col.push_str(" UNIQUE");
            }
            if let Some(fk) = &c.references {
                col.push_str(&format!(" REFERENCES {}({})", fk.table, fk.target_column()));
                if fk.on_delete_cascade {
                    col.push_str(" ON DELETE CASCADE");
                }
            }
            cols_sql.push(col);
        }

        for group in &self.unique_together {
            cols_sql.push(format!("UNIQUE ({})", group.join(", ")));
        }

        format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            self.table_name,
            cols_sql.join(", ")
        )
    }
}

/// Copies `tables` with every foreign key pointed at its parent's primary key.
///
/// Parents are looked up among `tables` first, then through `existing`
/// (primary key of an already registered table). A key naming any other
/// column is rejected.
pub fn resolve_references<F>(
    tables: &[TableSpec],
    existing: F,
) -> Result<Vec<TableSpec>, SchemaError>
where
    F: Fn(&str) -> Option<String>,
{
    let declared: BTreeMap<&str, &str> = tables
        .iter()
        .map(|t| (t.table_name.as_str(), t.primary_key_field.as_str()))
        .collect();

    let mut out = tables.to_vec();
    for spec in &mut out {
        for column in &mut spec.columns {
            let Some(fk) = column.references.as_mut() else {
                continue;
            };
            let parent_key = match declared.get(fk.table.as_str()) {
                Some(pk) => Some(pk.to_string()),
                None => existing(&fk.table),
            };
            match (parent_key, &fk.column) {
                (Some(pk), Some(named)) if *named != pk => {
                    return Err(SchemaError::NotPrimaryKey {
                        table: fk.table.clone(),
                        column: named.clone(),
                    });
                }
                (Some(pk), _) => fk.column = Some(pk),
                (None, _) => {}
            }
        }
    }
    Ok(out)
}

/// Orders tables so that every table comes after the tables it references.
/// References to tables outside `tables` are assumed to exist already.
pub fn creation_order(tables: &[TableSpec]) -> Result<Vec<&TableSpec>, SchemaError> {
    let mut by_name: BTreeMap<&str, &TableSpec> = BTreeMap::new();
    for t in tables {
        t.validate()?;
        if by_name.insert(t.table_name.as_str(), t).is_some() {
            return Err(SchemaError::DuplicateTable {
                table: t.table_name.clone(),
            });
        }
    }

    let mut ordered: Vec<&TableSpec> = Vec::with_capacity(tables.len());
    let mut placed: BTreeSet<&str> = BTreeSet::new();

    while ordered.len() < tables.len() {
        let before = ordered.len();
        for t in tables {
            if placed.contains(t.table_name.as_str()) {
                continue;
            }
            let ready = t.foreign_keys().all(|(_, fk)| {
                fk.table == t.table_name
                    || placed.contains(fk.table.as_str())
                    || !by_name.contains_key(fk.table.as_str())
            });
            if ready {
                placed.insert(t.table_name.as_str());
                ordered.push(t);
            }
        }
        if ordered.len() == before {
            let tables = tables
                .iter()
                .filter(|t| !placed.contains(t.table_name.as_str()))
                .map(|t| t.table_name.clone())
                .collect();
            return Err(SchemaError::Cycle { tables });
        }
    }

    Ok(ordered)
}
