//! Turning tabular input into records.
//!
//! CSV cells always arrive as strings; declare conversions on the batch for
//! typed columns. JSON keeps whatever scalar types the document has.

use crate::domain::record::{json_kind, Record};
use crate::error::SourceError;
use serde_json::Value as JsonValue;
use std::io::Read;

/// Reads CSV with a header row. Every cell becomes a JSON string.
pub fn records_from_csv_reader<R: Read>(reader: R) -> Result<Vec<Record>, SourceError> {
    let mut csv = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::Headers)
        .from_reader(reader);
    let headers = csv.headers()?.clone();

    let mut out = Vec::new();
    for row in csv.records() {
        let row = row?;
        let record: Record = headers
            .iter()
            .zip(row.iter())
            .map(|(h, cell)| (h.to_string(), JsonValue::from(cell)))
            .collect();
        out.push(record);
    }
    Ok(out)
}

pub fn records_from_csv_str(text: &str) -> Result<Vec<Record>, SourceError> {
    records_from_csv_reader(text.as_bytes())
}

/// Accepts a JSON array of objects.
pub fn records_from_json(value: JsonValue) -> Result<Vec<Record>, SourceError> {
    let JsonValue::Array(items) = value else {
        return Err(SourceError::Shape {
            expected: "array of objects".to_string(),
            got: json_kind(&value).to_string(),
        });
    };
    items
        .into_iter()
        .map(|item| match item {
            JsonValue::Object(map) => Ok(map),
            other => Err(SourceError::Shape {
                expected: "object".to_string(),
                got: json_kind(&other).to_string(),
            }),
        })
        .collect()
}

pub fn records_from_json_str(text: &str) -> Result<Vec<Record>, SourceError> {
    records_from_json(serde_json::from_str(text)?)
}

/// Pivots column-oriented data (`name -> values`) into records.
/// Every column must have the same length.
pub fn records_from_columns<I, S>(columns: I) -> Result<Vec<Record>, SourceError>
where
    I: IntoIterator<Item = (S, Vec<JsonValue>)>,
    S: Into<String>,
{
    let columns: Vec<(String, Vec<JsonValue>)> = columns
        .into_iter()
        .map(|(name, values)| (name.into(), values))
        .collect();
    let Some(expected) = columns.first().map(|(_, values)| values.len()) else {
        return Ok(Vec::new());
    };
    if let Some((column, values)) = columns.iter().find(|(_, v)| v.len() != expected) {
        return Err(SourceError::RaggedColumn {
            column: column.clone(),
            len: values.len(),
            expected,
        });
    }

    let mut out: Vec<Record> = (0..expected).map(|_| Record::new()).collect();
    for (name, values) in columns {
        for (record, value) in out.iter_mut().zip(values) {
            record.insert(name.clone(), value);
        }
    }
    Ok(out)
}
