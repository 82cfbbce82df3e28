//! Field access on decoded stream lines.
//!
//! Backend lines are read field by field: a field with an unexpected type
//! reads as absent instead of rejecting the whole line.

use serde_json::Value;

/// The line's `error` field as text.
///
/// Strings are returned as-is; any other non-null value is returned as its
/// JSON text. `null` and a missing field both read as no error.
pub fn reported_error(raw: &Value) -> Option<String> {
    match raw.get("error")? {
        Value::Null => None,
        Value::String(message) => Some(message.clone()),
        other => Some(other.to_string()),
    }
}

pub(crate) fn str_field(raw: &Value, key: &str) -> Option<String> {
    raw.get(key).and_then(Value::as_str).map(str::to_string)
}

pub(crate) fn u64_field(raw: &Value, key: &str) -> Option<u64> {
    raw.get(key).and_then(Value::as_u64)
}

pub(crate) fn bool_field(raw: &Value, key: &str) -> bool {
    raw.get(key).and_then(Value::as_bool).unwrap_or(false)
}
