//! Lenient accessors for loosely-typed analysis payloads.

use serde_json::Value;

/// Coerce a field that may be a list, a keyed map, a single string or missing
/// into a list of strings.
///
/// - sequence: non-empty entries, scalars stringified
/// - mapping: its values in key order
/// - non-empty string: one element
/// - anything else: empty
pub fn extract_array_from_field(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items.iter().filter_map(entry_text).collect(),
        Some(Value::Object(map)) => map.values().filter_map(entry_text).collect(),
        Some(Value::String(s)) if !s.trim().is_empty() => vec![s.clone()],
        _ => Vec::new(),
    }
}

fn entry_text(value: &Value) -> Option<String> {
    match value {
        Value::Null | Value::Bool(false) => None,
        Value::String(s) if s.trim().is_empty() => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) if n.as_f64() == Some(0.0) => None,
        other => Some(other.to_string()),
    }
}

/// A number, or a string that parses as one. Non-finite values are discarded.
pub fn number(value: Option<&Value>) -> Option<f64> {
    let n = match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().trim_end_matches('%').parse::<f64>().ok(),
        _ => None,
    }?;
    n.is_finite().then_some(n)
}

/// First non-empty string among `keys`.
pub fn first_text<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .filter_map(|k| value.get(*k).and_then(Value::as_str))
        .map(str::trim)
        .find(|s| !s.is_empty())
}

/// First numeric field among `keys`.
pub fn first_number(value: &Value, keys: &[&str]) -> Option<f64> {
    keys.iter().find_map(|k| number(value.get(*k)))
}
