//! Raw Parameter Extraction
//!
//! The recipe configuration arrives as a flat map of option name to JSON value.
//! This module holds the helpers used to pull values out of that map before
//! they are registered and validated.
//!
//! # Numeric coercion
//!
//! The host UI serialises integer options either as JSON floats (`7.0`) or, in
//! the advanced key/value editors, as strings (`"7"`). Values go through
//! [`coerce_integer`] before any integer check runs: whole-valued floats and
//! strings made only of ASCII digits become JSON integers. Everything else is
//! left untouched, so `7.5` or `"seven"` still fail the integer check with the
//! user's original value in the error message.

use serde_json::{Map, Value};

/// The flat option map a recipe is configured with.
pub type RawConfig = Map<String, Value>;

/// Extracts a typed parameter from the raw configuration.
///
/// Missing keys, nulls and values that cannot be deserialised into `T` all
/// yield `default`. Use this only for options whose bad values should fall
/// back silently; anything user-facing goes through the registry instead.
///
/// ```rust
/// use serde_json::json;
/// use tsdecomp::config::params::{extract_param, RawConfig};
///
/// let mut raw = RawConfig::new();
/// raw.insert("expert_stl".into(), json!(true));
///
/// assert!(extract_param(&raw, "expert_stl", false));
/// assert_eq!(extract_param(&raw, "missing", 42_u32), 42);
/// ```
pub fn extract_param<T>(params: &RawConfig, key: &str, default: T) -> T
where
    T: serde::de::DeserializeOwned,
{
    params
        .get(key)
        .filter(|v| !v.is_null())
        .and_then(|v| serde_json::from_value(v.clone()).ok())
        .unwrap_or(default)
}

/// Returns the raw value for `key`, treating nulls as absent.
pub fn raw_value(params: &RawConfig, key: &str) -> Option<Value> {
    params.get(key).filter(|v| !v.is_null()).cloned()
}

/// Returns the first present value among `keys`.
pub fn raw_value_any(params: &RawConfig, keys: &[&str]) -> Option<Value> {
    keys.iter().find_map(|key| raw_value(params, key))
}

/// Converts whole-valued floats and digit-only strings into JSON integers.
pub fn coerce_integer(value: Value) -> Value {
    match &value {
        Value::Number(n) if n.as_i64().is_none() && n.as_u64().is_none() => match n.as_f64() {
            Some(f) if f.is_finite() && f.fract() == 0.0 && f.abs() < i64::MAX as f64 => {
                Value::from(f as i64)
            }
            _ => value,
        },
        Value::String(s) => {
            let trimmed = s.trim();
            if !trimmed.is_empty() && trimmed.bytes().all(|b| b.is_ascii_digit()) {
                trimmed.parse::<u64>().map(Value::from).unwrap_or(value)
            } else {
                value
            }
        }
        _ => value,
    }
}

/// Drops the empty keys and empty-string values that the host's key/value
/// editor leaves behind for rows the user did not fill in.
pub fn strip_blank_entries(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .filter(|(k, v)| !k.trim().is_empty() && !is_blank(v))
                .collect(),
        ),
        other => other,
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}
