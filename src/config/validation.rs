//! Validation rule engine.
//!
//! A [`Check`] is a small predicate applied to a parameter value while it is
//! being registered. Checks run in the order they were declared and the first
//! failing one aborts registration, so only a single violation is reported.

use crate::error::ConfigurationError;

use serde_json::Value;
use std::fmt;

/// Semantic types a parameter value can be checked against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    String,
    Integer,
    Number,
    Boolean,
    Mapping,
    Sequence,
}

impl ValueType {
    /// Whole-valued floats count as integers, since JSON numbers coming from
    /// the host UI carry no integer type.
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            ValueType::String => value.is_string(),
            ValueType::Integer => as_integer(value).is_some(),
            ValueType::Number => value.is_number(),
            ValueType::Boolean => value.is_boolean(),
            ValueType::Mapping => value.is_object(),
            ValueType::Sequence => value.is_array(),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ValueType::String => "string",
            ValueType::Integer => "integer",
            ValueType::Number => "number",
            ValueType::Boolean => "boolean",
            ValueType::Mapping => "mapping",
            ValueType::Sequence => "sequence",
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returns the integer held by `value`, accepting whole-valued floats.
pub fn as_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(i)
            } else if let Some(f) = n.as_f64() {
                (f.is_finite() && f.fract() == 0.0 && f.abs() < i64::MAX as f64).then_some(f as i64)
            } else {
                None
            }
        }
        _ => None,
    }
}

/// The kind of predicate a check applies.
#[derive(Debug, Clone, PartialEq)]
pub enum CheckKind {
    /// Value must be of the given semantic type.
    IsType(ValueType),

    /// Scalars must be members of the set. For mappings every key must be a
    /// member, for sequences every element.
    In(Vec<Value>),

    /// Numeric value must be greater than or equal to the threshold.
    SupEq(f64),

    /// Condition computed by the caller before the check is built.
    Custom(bool),
}

/// A single validation rule with an optional custom error message.
#[derive(Debug, Clone, PartialEq)]
pub struct Check {
    pub kind: CheckKind,
    pub err_msg: Option<String>,
}

impl Check {
    pub fn is_type(expected: ValueType) -> Self {
        Self {
            kind: CheckKind::IsType(expected),
            err_msg: None,
        }
    }

    pub fn one_of<I, V>(allowed: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self {
            kind: CheckKind::In(allowed.into_iter().map(Into::into).collect()),
            err_msg: None,
        }
    }

    pub fn sup_eq(threshold: f64) -> Self {
        Self {
            kind: CheckKind::SupEq(threshold),
            err_msg: None,
        }
    }

    pub fn custom(cond: bool, err_msg: impl Into<String>) -> Self {
        Self {
            kind: CheckKind::Custom(cond),
            err_msg: Some(err_msg.into()),
        }
    }

    /// Replaces the generated error message.
    pub fn with_message(mut self, err_msg: impl Into<String>) -> Self {
        self.err_msg = Some(err_msg.into());
        self
    }

    /// Applies the check to `value`, returning an error naming `name` on failure.
    pub fn apply(&self, name: &str, value: &Value) -> Result<(), ConfigurationError> {
        match self.violation(value) {
            None => Ok(()),
            Some(generated) => {
                let reason = self.err_msg.clone().unwrap_or(generated);
                Err(ConfigurationError::invalid(name, reason))
            }
        }
    }

    /// Describes why `value` fails the check, or `None` when it passes.
    fn violation(&self, value: &Value) -> Option<String> {
        match &self.kind {
            CheckKind::IsType(expected) => (!expected.matches(value))
                .then(|| format!("value {} should be of type {}", value, expected)),

            CheckKind::In(allowed) => match value {
                Value::Object(map) => map
                    .keys()
                    .find(|key| !allowed.iter().any(|a| a.as_str() == Some(key.as_str())))
                    .map(|key| {
                        format!(
                            "key '{}' is not allowed, keys should be in {}",
                            key,
                            render(allowed)
                        )
                    }),
                Value::Array(items) => items
                    .iter()
                    .find(|item| !allowed.contains(item))
                    .map(|item| format!("{} should be in {}", item, render(allowed))),
                scalar => (!allowed.contains(scalar))
                    .then(|| format!("value {} should be in {}", scalar, render(allowed))),
            },

            CheckKind::SupEq(threshold) => match value.as_f64() {
                Some(v) if v >= *threshold => None,
                Some(_) => Some(format!("value {} should be >= {}", value, threshold)),
                None => Some(format!("value {} should be a number >= {}", value, threshold)),
            },

            CheckKind::Custom(cond) => (!cond).then(|| format!("value {} is not valid", value)),
        }
    }
}

fn render(allowed: &[Value]) -> String {
    let items: Vec<String> = allowed
        .iter()
        .map(|v| match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
        .collect();
    format!("[{}]", items.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_integer_type_accepts_whole_floats() {
        assert!(ValueType::Integer.matches(&json!(7)));
        assert!(ValueType::Integer.matches(&json!(7.0)));
        assert!(!ValueType::Integer.matches(&json!(7.5)));
        assert!(!ValueType::Integer.matches(&json!("7")));
    }

    #[test]
    fn test_in_on_scalar() {
        let check = Check::one_of(["STL", "classical"]);
        assert!(check.apply("method", &json!("STL")).is_ok());

        let err = check.apply("method", &json!("X11")).unwrap_err();
        assert_eq!(err.param(), "method");
        assert!(err.to_string().contains("X11"));
    }

    #[test]
    fn test_in_on_mapping_names_invalid_key() {
        let check = Check::one_of(["seasonal_deg", "trend_deg", "low_pass_deg"]);
        let err = check
            .apply("loess_degrees", &json!({"seasonal_deg": "1", "bogus_deg": "1"}))
            .unwrap_err();
        assert!(err.to_string().contains("bogus_deg"));
    }

    #[test]
    fn test_in_on_sequence_names_invalid_element() {
        let check = Check::one_of(["date", "sales"]);
        assert!(check.apply("target_columns", &json!(["sales"])).is_ok());

        let err = check.apply("target_columns", &json!(["sales", "profit"])).unwrap_err();
        assert!(err.to_string().contains("profit"));
    }

    #[test]
    fn test_sup_eq() {
        let check = Check::sup_eq(7.0);
        assert!(check.apply("seasonal", &json!(7)).is_ok());
        assert!(check.apply("seasonal", &json!(5)).is_err());
        assert!(check.apply("seasonal", &json!("9")).is_err());
    }

    #[test]
    fn test_custom_uses_its_message() {
        let check = Check::custom(false, "The seasonal smoother should be an odd integer.");
        let err = check.apply("seasonal", &json!(8)).unwrap_err();
        let message = "The seasonal smoother should be an odd integer.";
        assert_eq!(err, ConfigurationError::invalid("seasonal", message));
        assert!(Check::custom(true, "unused").apply("seasonal", &json!(9)).is_ok());
    }

    #[test]
    fn test_with_message_overrides_generated_text() {
        let check = Check::is_type(ValueType::Boolean).with_message("advanced must be a flag");
        let err = check.apply("advanced", &json!("yes")).unwrap_err();
        assert!(err.to_string().ends_with("advanced must be a flag"));
    }
}
