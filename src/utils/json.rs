//! Helpers for picking values out of loosely shaped scraper JSON.

use serde_json::{Map, Value};

/// Returns `true` for values that carry information.
///
/// `null`, `false`, `0`, blank strings, empty arrays and empty objects are
/// considered empty.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.trim().is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// Returns `true` when the value is missing, `null`, blank or an empty container.
///
/// Unlike [`is_truthy`], `0` and `false` count as present.
pub fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        Value::Bool(_) | Value::Number(_) => false,
    }
}

/// Returns the first candidate that is not blank, with strings trimmed.
pub fn first_non_empty<'a, I>(candidates: I) -> Option<Value>
where
    I: IntoIterator<Item = Option<&'a Value>>,
{
    candidates
        .into_iter()
        .flatten()
        .find(|v| !is_blank(v))
        .map(|v| match v {
            Value::String(s) => Value::String(s.trim().to_string()),
            other => other.clone(),
        })
}

/// Returns the first truthy candidate.
pub fn first_truthy<'a, I>(candidates: I) -> Option<&'a Value>
where
    I: IntoIterator<Item = Option<&'a Value>>,
{
    candidates.into_iter().flatten().find(|v| is_truthy(v))
}

/// Looks up `key` in an object value.
pub fn get<'a>(value: &'a Value, key: &str) -> Option<&'a Value> {
    value.as_object().and_then(|o| o.get(key))
}

/// Follows a path of object keys.
pub fn get_path<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(value, |current, key| get(current, key))
}

/// Returns the string at `key` when it is a non-blank string.
pub fn get_str<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    get(value, key)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
}

/// Returns the object at `key`, or an empty map.
pub fn object_or_empty(value: Option<&Value>) -> Map<String, Value> {
    value
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default()
}

/// Renders a scalar as text the way it would be displayed to a user.
pub fn value_to_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

/// Coerces a value into a list of strings.
///
/// A single string becomes a one-element list. Arrays keep their truthy
/// entries; objects inside arrays contribute their `url` field.
pub fn ensure_list_of_strings(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::String(s)) if !s.trim().is_empty() => vec![s.clone()],
        Some(Value::Array(items)) => items
            .iter()
            .filter(|item| is_truthy(item))
            .filter_map(|item| match item {
                Value::Object(_) => get_str(item, "url").map(ToString::to_string),
                other => value_to_text(other),
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// Converts a JSON number or numeric string to `f64`.
pub fn as_f64_lenient(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
