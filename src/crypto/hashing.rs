// Canonical hashing of JSON documents (load reports, schema declarations).

use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

// Domain separation so report and schema digests never collide.
const REPORT_DOMAIN: &[u8] = b"RELIMPORT-REPORT";
const SCHEMA_DOMAIN: &[u8] = b"RELIMPORT-SCHEMA";

/// Sorts object keys recursively so equal documents serialize identically.
fn sort_json_value(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let sorted_map: BTreeMap<String, Value> = map
                .iter()
                .map(|(k, v)| (k.clone(), sort_json_value(v)))
                .collect();
            Value::Object(sorted_map.into_iter().collect())
        }
        Value::Array(arr) => Value::Array(arr.iter().map(sort_json_value).collect()),
        _ => value.clone(),
    }
}

fn digest(domain: &[u8], value: &Value) -> [u8; 32] {
    let canonical = sort_json_value(value).to_string();
    let mut hasher = Sha256::new();
    hasher.update(domain);
    hasher.update(canonical.as_bytes());
    hasher.finalize().into()
}

/// Hex digest of a load report document.
pub fn hash_report(value: &Value) -> String {
    hex::encode(digest(REPORT_DOMAIN, value))
}

/// Hex digest of a set of table declarations.
pub fn hash_schema(value: &Value) -> String {
    hex::encode(digest(SCHEMA_DOMAIN, value))
}
