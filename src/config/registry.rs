//! Parameter registry.
//!
//! Parameters are described with a [`ParamSpec`] and validated the moment they
//! are handed to [`ParamRegistry::add_param`]. A registry therefore only ever
//! holds values that passed all of their checks.

use super::validation::Check;
use crate::error::ConfigurationError;

use serde::de::DeserializeOwned;
use serde_json::Value;

/// Declaration of a parameter prior to registration.
#[derive(Debug, Clone)]
pub struct ParamSpec {
    pub name: String,
    pub value: Option<Value>,
    pub checks: Vec<Check>,
    pub required: bool,
}

impl ParamSpec {
    /// A required parameter. Null values are treated as absent.
    pub fn new(name: &str, value: Option<Value>) -> Self {
        Self {
            name: name.to_string(),
            value: value.filter(|v| !v.is_null()),
            checks: Vec::new(),
            required: true,
        }
    }

    pub fn check(mut self, check: Check) -> Self {
        self.checks.push(check);
        self
    }

    pub fn checks(mut self, checks: impl IntoIterator<Item = Check>) -> Self {
        self.checks.extend(checks);
        self
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    /// Substitutes `default` when no value was supplied.
    pub fn default_value(mut self, default: impl Into<Value>) -> Self {
        if self.value.is_none() {
            self.value = Some(default.into());
        }
        self
    }
}

#[derive(Debug, Clone)]
struct Parameter {
    name: String,
    value: Value,
    required: bool,
}

/// Ordered store of validated parameters.
#[derive(Debug, Clone, Default)]
pub struct ParamRegistry {
    params: Vec<Parameter>,
}

impl ParamRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates `spec` and stores its value.
    ///
    /// An absent required value fails immediately. An absent optional value
    /// is stored as null without running its checks. Registering a name a
    /// second time replaces the earlier value in place.
    pub fn add_param(&mut self, spec: ParamSpec) -> Result<(), ConfigurationError> {
        let ParamSpec {
            name,
            value,
            checks,
            required,
        } = spec;

        let value = match value {
            Some(value) => {
                for check in &checks {
                    check.apply(&name, &value)?;
                }
                value
            }
            None if required => return Err(ConfigurationError::Missing { param: name }),
            None => Value::Null,
        };

        tracing::trace!(param = %name, %value, "Parameter registered");

        match self.params.iter_mut().find(|p| p.name == name) {
            Some(existing) => {
                existing.value = value;
                existing.required = required;
            }
            None => self.params.push(Parameter {
                name,
                value,
                required,
            }),
        }
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.params.iter().any(|p| p.name == name)
    }

    pub fn get(&self, name: &str) -> Result<&Value, ConfigurationError> {
        self.params
            .iter()
            .find(|p| p.name == name)
            .map(|p| &p.value)
            .ok_or_else(|| ConfigurationError::Unregistered {
                param: name.to_string(),
            })
    }

    /// Deserialises a registered value into `T`.
    pub fn get_as<T: DeserializeOwned>(&self, name: &str) -> Result<T, ConfigurationError> {
        let value = self.get(name)?;
        serde_json::from_value(value.clone())
            .map_err(|e| ConfigurationError::invalid(name, format!("cannot be read: {e}")))
    }

    pub fn get_str(&self, name: &str) -> Result<&str, ConfigurationError> {
        self.get(name)?
            .as_str()
            .ok_or_else(|| ConfigurationError::invalid(name, "is not a string"))
    }

    pub fn get_bool(&self, name: &str) -> Result<bool, ConfigurationError> {
        self.get(name)?
            .as_bool()
            .ok_or_else(|| ConfigurationError::invalid(name, "is not a boolean"))
    }

    pub fn get_u64(&self, name: &str) -> Result<u64, ConfigurationError> {
        super::validation::as_integer(self.get(name)?)
            .and_then(|i| u64::try_from(i).ok())
            .ok_or_else(|| ConfigurationError::invalid(name, "is not a non-negative integer"))
    }

    pub fn is_required(&self, name: &str) -> Result<bool, ConfigurationError> {
        self.params
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.required)
            .ok_or_else(|| ConfigurationError::Unregistered {
                param: name.to_string(),
            })
    }

    /// Parameter names in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.params.iter().map(|p| p.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::validation::ValueType;
    use serde_json::json;

    #[test]
    fn test_add_and_get() {
        let mut registry = ParamRegistry::new();
        let spec = ParamSpec::new("time_column", Some(json!("date")))
            .check(Check::is_type(ValueType::String));
        registry.add_param(spec).unwrap();

        assert_eq!(registry.get_str("time_column").unwrap(), "date");
        assert!(registry.is_required("time_column").unwrap());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_missing_required_param() {
        let mut registry = ParamRegistry::new();
        let err = registry.add_param(ParamSpec::new("time_column", None)).unwrap_err();
        assert_eq!(
            err,
            ConfigurationError::Missing {
                param: "time_column".into()
            }
        );
        assert!(!registry.contains("time_column"));
    }

    #[test]
    fn test_null_counts_as_missing() {
        let mut registry = ParamRegistry::new();
        assert!(registry.add_param(ParamSpec::new("seasonal", Some(Value::Null))).is_err());
    }

    #[test]
    fn test_optional_param_skips_checks_when_absent() {
        let mut registry = ParamRegistry::new();
        let spec = ParamSpec::new("filt", None)
            .check(Check::is_type(ValueType::Sequence))
            .optional();
        registry.add_param(spec).unwrap();
        assert!(registry.get("filt").unwrap().is_null());
        assert!(!registry.is_required("filt").unwrap());
    }

    #[test]
    fn test_first_failing_check_is_reported() {
        let mut registry = ParamRegistry::new();
        let spec = ParamSpec::new("seasonal", Some(json!(4)))
            .check(Check::is_type(ValueType::Integer))
            .check(Check::sup_eq(7.0))
            .check(Check::custom(false, "The seasonal smoother should be an odd integer."));

        let err = registry.add_param(spec).unwrap_err();
        assert!(err.to_string().contains(">= 7"));
        assert!(!registry.contains("seasonal"));
    }

    #[test]
    fn test_unregistered_lookup() {
        let registry = ParamRegistry::new();
        let err = registry.get("model").unwrap_err();
        assert_eq!(
            err,
            ConfigurationError::Unregistered {
                param: "model".into()
            }
        );
    }

    #[test]
    fn test_default_value_and_order() {
        let mut registry = ParamRegistry::new();
        registry.add_param(ParamSpec::new("advanced", None).default_value(false)).unwrap();
        registry.add_param(ParamSpec::new("model", Some(json!("additive")))).unwrap();
        registry.add_param(ParamSpec::new("advanced", Some(json!(true)))).unwrap();

        assert!(registry.get_bool("advanced").unwrap());
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["advanced", "model"]);
    }

    #[test]
    fn test_typed_access() {
        let mut registry = ParamRegistry::new();
        registry.add_param(ParamSpec::new("seasonal", Some(json!(13.0)))).unwrap();
        registry.add_param(ParamSpec::new("targets", Some(json!(["a", "b"])))).unwrap();

        assert_eq!(registry.get_u64("seasonal").unwrap(), 13);
        let targets: Vec<String> = registry.get_as("targets").unwrap();
        assert_eq!(targets, vec!["a", "b"]);
        assert!(registry.get_as::<Vec<u32>>("targets").is_err());
    }
}
