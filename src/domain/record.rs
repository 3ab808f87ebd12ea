//! Flat records exchanged between tabular sources, the loader and stores.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// A flat record: field name to scalar value.
pub type Record = serde_json::Map<String, JsonValue>;

/// System-assigned identifier of a persisted row.
pub type SurrogateKey = i64;

/// A row as read back from a store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub id: SurrogateKey,
    pub fields: Record,
}

/// Renders a scalar as a natural key. Only strings and numbers qualify;
/// blank strings do not.
pub fn natural_key_of(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        }
        JsonValue::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Short type label used in rejection messages.
pub fn json_kind(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "bool",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}
