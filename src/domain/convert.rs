//! Declared field conversions: textual source values to canonical typed values.

use crate::domain::record::json_kind;
use chrono::{NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

pub const DEFAULT_DATE_FORMAT: &str = "%Y-%m-%d";

fn default_date_format() -> String {
    DEFAULT_DATE_FORMAT.to_string()
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConversionKind {
    /// Calendar date, canonical form `YYYY-MM-DD`.
    Date {
        #[serde(default = "default_date_format")]
        format: String,
    },
    /// Timestamp, canonical form RFC 3339 in UTC. A date-only format yields midnight.
    DateTime {
        #[serde(default = "default_date_format")]
        format: String,
    },
    Integer,
    Float,
    Boolean,
    Text,
}

impl ConversionKind {
    pub fn date() -> Self {
        ConversionKind::Date {
            format: default_date_format(),
        }
    }

    pub fn date_time() -> Self {
        ConversionKind::DateTime {
            format: default_date_format(),
        }
    }

    /// Converts `value` to its canonical form. The error is a human-readable reason.
    pub fn apply(&self, value: &JsonValue) -> Result<JsonValue, String> {
        if value.is_null() {
            return Err("value is missing".to_string());
        }
        match self {
            ConversionKind::Date { format } => {
                let s = expect_str(value)?;
                let date = NaiveDate::parse_from_str(s.trim(), format)
                    .map_err(|e| format!("'{}' is not a date in format '{}': {}", s, format, e))?;
                Ok(JsonValue::from(date.format(DEFAULT_DATE_FORMAT).to_string()))
            }
            ConversionKind::DateTime { format } => {
                let s = expect_str(value)?.trim();
                let naive = match NaiveDateTime::parse_from_str(s, format) {
                    Ok(dt) => dt,
                    Err(_) => NaiveDate::parse_from_str(s, format)
                        .map_err(|e| {
                            format!("'{}' is not a timestamp in format '{}': {}", s, format, e)
                        })?
                        .and_hms_opt(0, 0, 0)
                        .ok_or_else(|| format!("'{}' has no midnight", s))?,
                };
                let utc = Utc.from_utc_datetime(&naive);
                Ok(JsonValue::from(utc.to_rfc3339_opts(SecondsFormat::Secs, true)))
            }
            ConversionKind::Integer => {
                if let Some(n) = value.as_i64() {
                    return Ok(JsonValue::from(n));
                }
                if let Some(s) = value.as_str() {
                    return s
                        .trim()
                        .parse::<i64>()
                        .map(JsonValue::from)
                        .map_err(|_| format!("'{}' is not an integer", s));
                }
                Err(format!("expected integer, got {}", json_kind(value)))
            }
            ConversionKind::Float => {
                if let Some(n) = value.as_f64() {
                    return Ok(JsonValue::from(n));
                }
                if let Some(s) = value.as_str() {
                    let parsed = s
                        .trim()
                        .parse::<f64>()
                        .map_err(|_| format!("'{}' is not a number", s))?;
                    return serde_json::Number::from_f64(parsed)
                        .map(JsonValue::Number)
                        .ok_or_else(|| format!("'{}' is not a finite number", s));
                }
                Err(format!("expected number, got {}", json_kind(value)))
            }
            ConversionKind::Boolean => {
                if let Some(b) = value.as_bool() {
                    return Ok(JsonValue::from(b));
                }
                if let Some(s) = value.as_str() {
                    return match s.trim().to_lowercase().as_str() {
                        "true" | "t" | "yes" | "y" | "1" => Ok(JsonValue::from(true)),
                        "false" | "f" | "no" | "n" | "0" => Ok(JsonValue::from(false)),
                        _ => Err(format!("'{}' is not a boolean", s)),
                    };
                }
                Err(format!("expected boolean, got {}", json_kind(value)))
            }
            ConversionKind::Text => match value {
                JsonValue::String(_) => Ok(value.clone()),
                JsonValue::Number(_) | JsonValue::Bool(_) => Ok(JsonValue::from(value.to_string())),
                other => Err(format!("expected text, got {}", json_kind(other))),
            },
        }
    }
}

fn expect_str(value: &JsonValue) -> Result<&str, String> {
    value
        .as_str()
        .ok_or_else(|| format!("expected text, got {}", json_kind(value)))
}
