//! Transformation configuration.
//!
//! Turns the raw recipe options plus the input dataset into a validated,
//! typed [`TransformationConfig`]. Common input parameters are loaded first,
//! then the block that belongs to the selected decomposition method. Every
//! value goes through the [`ParamRegistry`], so the first violated constraint
//! aborts the whole build.

use super::frequency::{FREQUENCY_UNITS, Frequency, WEEK_DAYS};
use super::params::{RawConfig, coerce_integer, raw_value, raw_value_any, strip_blank_entries};
use super::registry::{ParamRegistry, ParamSpec};
use super::validation::{Check, ValueType, as_integer};
use crate::core::dataset::{Dataset, cell_to_string};
use crate::error::ConfigurationError;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::fmt;

pub const TRANSFORMATION_TYPES: [&str; 1] = ["seasonal_decomposition"];
pub const DECOMPOSITION_METHODS: [&str; 2] = ["STL", "classical"];
pub const MODELS: [&str; 2] = ["additive", "multiplicative"];

const LOESS_DEGREE_KEYS: [&str; 3] = ["seasonal_deg", "trend_deg", "low_pass_deg"];
const SPEED_JUMP_KEYS: [&str; 3] = ["seasonal_jump", "trend_jump", "low_pass_jump"];
const SMOOTHER_KEYS: [&str; 2] = ["trend", "low_pass"];
const CLASSICAL_KEYS: [&str; 3] = ["filt", "two_sided", "extrapolate_trend"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformationType {
    SeasonalDecomposition,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Model {
    Additive,
    Multiplicative,
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Model::Additive => f.write_str("additive"),
            Model::Multiplicative => f.write_str("multiplicative"),
        }
    }
}

/// Loess polynomial degrees; `None` keeps the algorithm default.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoessDegrees {
    pub seasonal_deg: Option<u8>,
    pub trend_deg: Option<u8>,
    pub low_pass_deg: Option<u8>,
}

/// Loess evaluation strides; `None` keeps the algorithm default.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpeedJumps {
    pub seasonal_jump: Option<usize>,
    pub trend_jump: Option<usize>,
    pub low_pass_jump: Option<usize>,
}

/// Overrides for the trend and low-pass smoother lengths.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdditionalSmoothers {
    pub trend: Option<usize>,
    pub low_pass: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StlAdvanced {
    pub robust: bool,
    pub loess_degrees: LoessDegrees,
    pub speed_jumps: SpeedJumps,
    pub smoothers: AdditionalSmoothers,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StlSettings {
    /// Length of the seasonal smoother.
    pub seasonal: usize,
    pub model: Model,
    pub advanced: Option<StlAdvanced>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtrapolateTrend {
    Points(usize),
    /// One seasonal period minus one point.
    Freq,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassicalAdvanced {
    pub filt: Option<Vec<f64>>,
    pub two_sided: bool,
    pub extrapolate_trend: ExtrapolateTrend,
}

impl Default for ClassicalAdvanced {
    fn default() -> Self {
        Self {
            filt: None,
            two_sided: true,
            extrapolate_trend: ExtrapolateTrend::Points(0),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassicalSettings {
    pub model: Model,
    pub advanced: Option<ClassicalAdvanced>,
}

/// Method-specific part of the configuration.
#[derive(Debug, Clone, PartialEq)]
pub enum DecompositionMethod {
    Stl(StlSettings),
    Classical(ClassicalSettings),
}

impl DecompositionMethod {
    pub fn name(&self) -> &'static str {
        match self {
            DecompositionMethod::Stl(_) => "STL",
            DecompositionMethod::Classical(_) => "classical",
        }
    }

    pub fn model(&self) -> Model {
        match self {
            DecompositionMethod::Stl(s) => s.model,
            DecompositionMethod::Classical(c) => c.model,
        }
    }
}

/// Fully validated configuration of one recipe run.
#[derive(Debug, Clone)]
pub struct TransformationConfig {
    pub transformation_type: TransformationType,
    pub time_column: String,
    pub target_columns: Vec<String>,
    pub frequency: Frequency,
    pub long_format: bool,
    pub timeseries_identifiers: Vec<String>,
    pub method: DecompositionMethod,
    params: ParamRegistry,
}

impl TransformationConfig {
    /// Validates `raw` against the columns and values of `input`.
    pub fn from_raw(raw: &RawConfig, input: &Dataset) -> Result<Self, ConfigurationError> {
        ConfigBuilder::new(raw, input).build()
    }

    /// Looks up a registered parameter by name.
    pub fn param(&self, name: &str) -> Result<&Value, ConfigurationError> {
        self.params.get(name)
    }

    pub fn params(&self) -> &ParamRegistry {
        &self.params
    }

    pub fn model(&self) -> Model {
        self.method.model()
    }
}

struct ConfigBuilder<'a> {
    raw: &'a RawConfig,
    input: &'a Dataset,
    registry: ParamRegistry,
}

impl<'a> ConfigBuilder<'a> {
    fn new(raw: &'a RawConfig, input: &'a Dataset) -> Self {
        Self {
            raw,
            input,
            registry: ParamRegistry::new(),
        }
    }

    fn build(mut self) -> Result<TransformationConfig, ConfigurationError> {
        self.registry.add_param(
            ParamSpec::new("transformation_type", raw_value(self.raw, "transformation_type"))
                .check(Check::one_of(TRANSFORMATION_TYPES)),
        )?;
        let transformation_type = TransformationType::SeasonalDecomposition;

        let frequency = self.load_input_parameters()?;

        let method_name = self.registry.get_str("time_decomposition_method")?.to_string();
        let method = match method_name.as_str() {
            "STL" => {
                let period = frequency.seasonal_period();
                DecompositionMethod::Stl(self.load_stl_parameters(period)?)
            }
            _ => DecompositionMethod::Classical(self.load_classical_parameters()?),
        };

        let time_column = self.registry.get_as("time_column")?;
        let target_columns = self.registry.get_as("target_columns")?;
        let long_format = self.registry.get_bool("long_format")?;
        let timeseries_identifiers = self.registry.get_as("timeseries_identifiers")?;

        let config = TransformationConfig {
            transformation_type,
            time_column,
            target_columns,
            frequency,
            long_format,
            timeseries_identifiers,
            method,
            params: self.registry,
        };

        tracing::debug!(
            method = config.method.name(),
            frequency = %config.frequency,
            targets = ?config.target_columns,
            long_format = config.long_format,
            "Configuration validated"
        );
        Ok(config)
    }

    fn column_names(&self) -> Vec<Value> {
        self.input
            .column_names()
            .iter()
            .map(|c| Value::String(c.clone()))
            .collect()
    }

    fn load_input_parameters(&mut self) -> Result<Frequency, ConfigurationError> {
        let columns = self.column_names();

        let method = raw_value(self.raw, "time_decomposition_method");
        self.registry.add_param(
            ParamSpec::new("time_decomposition_method", method)
                .check(Check::one_of(DECOMPOSITION_METHODS)),
        )?;

        self.registry.add_param(
            ParamSpec::new("time_column", raw_value(self.raw, "time_column")).checks([
                Check::is_type(ValueType::String),
                Check::one_of(columns.clone()).with_message(format!(
                    "The time column '{}' is not a column of the input dataset",
                    cell_to_string(&raw_value(self.raw, "time_column").unwrap_or_default())
                )),
            ]),
        )?;
        let time_column = self.registry.get_str("time_column")?.to_string();

        let targets = raw_value(self.raw, "target_columns");
        let target_list: Vec<Value> = targets
            .as_ref()
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        self.registry.add_param(ParamSpec::new("target_columns", targets).checks([
            Check::is_type(ValueType::Sequence),
            Check::custom(!target_list.is_empty(), "At least one target column is required"),
            Check::one_of(columns.clone()),
            Check::custom(
                !target_list.iter().any(|t| t.as_str() == Some(&time_column)),
                format!("The time column '{time_column}' cannot also be a target column"),
            ),
        ]))?;

        let frequency = self.load_frequency()?;

        let long_format = raw_value_any(self.raw, &["additional_columns", "long_format"]);
        self.registry.add_param(
            ParamSpec::new("long_format", long_format)
                .default_value(false)
                .check(Check::is_type(ValueType::Boolean)),
        )?;
        let long_format = self.registry.get_bool("long_format")?;

        let identifiers = if long_format {
            raw_value(self.raw, "timeseries_identifiers")
        } else {
            if raw_value(self.raw, "timeseries_identifiers").is_some() {
                tracing::debug!("Ignoring time series identifiers, long format is not activated");
            }
            Some(json!([]))
        };
        let identifier_list: Vec<Value> = identifiers
            .as_ref()
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        let overlaps = identifier_list
            .iter()
            .any(|id| id.as_str() == Some(&time_column) || target_list.contains(id));
        self.registry.add_param(
            ParamSpec::new("timeseries_identifiers", identifiers)
                .default_value(json!([]))
                .checks([
                    Check::is_type(ValueType::Sequence),
                    Check::custom(
                        !long_format || !identifier_list.is_empty(),
                        "Long format is activated but no time series identifiers have been \
                         provided",
                    ),
                    Check::one_of(columns),
                    Check::custom(
                        !overlaps,
                        "Time series identifiers must differ from the time column and the \
                         target columns",
                    ),
                ]),
        )?;

        Ok(frequency)
    }

    fn load_frequency(&mut self) -> Result<Frequency, ConfigurationError> {
        let unit = raw_value(self.raw, "frequency_unit");
        let unit_period = unit
            .as_ref()
            .and_then(Value::as_str)
            .and_then(|u| Frequency::from_unit(u, 1, "SUN"))
            .map(|f| f.seasonal_period());
        self.registry.add_param(ParamSpec::new("frequency_unit", unit).checks([
            Check::one_of(FREQUENCY_UNITS),
            Check::custom(
                unit_period.is_none_or(|p| p >= 2),
                "This frequency has a seasonal cycle of a single observation, \
                 decomposition needs at least two observations per cycle",
            ),
        ]))?;

        let unit = self.registry.get_str("frequency_unit")?.to_string();
        match unit.as_str() {
            "W" => {
                let end_of_week =
                    raw_value(self.raw, "frequency_end_of_week").map(|v| match coerce_integer(v) {
                        Value::String(s) => Value::String(s.trim().to_uppercase()),
                        other => other,
                    });
                let valid = match &end_of_week {
                    Some(Value::String(s)) => WEEK_DAYS.contains(&s.as_str()),
                    Some(other) => as_integer(other).is_some_and(|d| (1..=7).contains(&d)),
                    None => true,
                };
                self.registry.add_param(
                    ParamSpec::new("frequency_end_of_week", end_of_week)
                        .default_value("SUN")
                        .check(Check::custom(
                            valid,
                            "The end of week should be a day number between 1 and 7 or one \
                             of MON, TUE, WED, THU, FRI, SAT, SUN",
                        )),
                )?;
            }
            "H" => self.load_step("frequency_step_hours", 24, "hours")?,
            "min" => self.load_step("frequency_step_minutes", 24 * 60, "minutes")?,
            _ => {}
        }

        let step = match unit.as_str() {
            "H" => self.registry.get_u64("frequency_step_hours")?,
            "min" => self.registry.get_u64("frequency_step_minutes")?,
            _ => 1,
        };
        let end_of_week = match unit.as_str() {
            "W" => cell_to_string(self.registry.get("frequency_end_of_week")?),
            _ => String::new(),
        };
        let step = u32::try_from(step).map_err(|_| {
            ConfigurationError::invalid("frequency", format!("step {step} is too large"))
        })?;
        let frequency = Frequency::from_unit(&unit, step, &end_of_week).ok_or_else(|| {
            ConfigurationError::invalid("frequency_unit", format!("unknown unit '{unit}'"))
        })?;

        self.registry
            .add_param(ParamSpec::new("frequency", Some(Value::String(frequency.token()))))?;
        Ok(frequency)
    }

    /// Registers a sub-daily step. The step must divide the `cycle` units of a
    /// day and leave at least two observations per day.
    fn load_step(&mut self, name: &str, cycle: i64, units: &str) -> Result<(), ConfigurationError> {
        let value = raw_value(self.raw, name).map(coerce_integer);
        let divides = value
            .as_ref()
            .and_then(as_integer)
            .is_none_or(|step| step < 1 || (step <= cycle / 2 && cycle % step == 0));

        self.registry.add_param(ParamSpec::new(name, value).default_value(1).checks([
            Check::is_type(ValueType::Integer),
            Check::sup_eq(1.0),
            Check::custom(
                divides,
                format!(
                    "The step should divide the {cycle} {units} of a day and leave at least \
                     two observations per day"
                ),
            ),
        ]))
    }

    /// Name of the first target column holding a non-positive value.
    fn non_positive_target(&self) -> Option<String> {
        let targets: Vec<String> = self.registry.get_as("target_columns").ok()?;
        targets.into_iter().find(|target| {
            self.input
                .numeric_column(target)
                .is_some_and(|values| values.iter().flatten().any(|v| *v <= 0.0))
        })
    }

    fn load_model(
        &mut self,
        key: &str,
        default: Option<&str>,
    ) -> Result<Model, ConfigurationError> {
        let mut spec = ParamSpec::new("model", raw_value(self.raw, key));
        if let Some(default) = default {
            spec = spec.default_value(default);
        }

        let offending = match &spec.value {
            Some(Value::String(m)) if m == "multiplicative" => self.non_positive_target(),
            _ => None,
        };
        let message = match &offending {
            Some(column) => format!(
                "Target column '{column}' contains non-positive values, yet a multiplicative \
                 model only works with strictly positive time series. Choose an additive model \
                 instead."
            ),
            None => String::new(),
        };

        self.registry.add_param(
            spec.checks([Check::one_of(MODELS), Check::custom(offending.is_none(), message)]),
        )?;
        self.registry.get_as("model")
    }

    fn load_advanced_flag(&mut self, key: &str) -> Result<bool, ConfigurationError> {
        self.registry.add_param(
            ParamSpec::new("advanced", raw_value(self.raw, key))
                .default_value(false)
                .check(Check::is_type(ValueType::Boolean)),
        )?;
        self.registry.get_bool("advanced")
    }

    fn load_stl_parameters(&mut self, period: usize) -> Result<StlSettings, ConfigurationError> {
        let seasonal = raw_value(self.raw, "seasonal_stl").map(coerce_integer);
        let is_odd = seasonal.as_ref().and_then(as_integer).is_none_or(|s| s % 2 == 1);
        self.registry.add_param(ParamSpec::new("seasonal", seasonal).checks([
            Check::is_type(ValueType::Integer),
            Check::sup_eq(7.0),
            Check::custom(is_odd, "The seasonal smoother should be an odd integer."),
        ]))?;

        let model = self.load_model("model_stl", None)?;
        let advanced = if self.load_advanced_flag("expert_stl")? {
            Some(self.load_stl_advanced_parameters(period)?)
        } else {
            None
        };

        Ok(StlSettings {
            seasonal: self.registry.get_u64("seasonal")? as usize,
            model,
            advanced,
        })
    }

    fn load_stl_advanced_parameters(
        &mut self,
        period: usize,
    ) -> Result<StlAdvanced, ConfigurationError> {
        self.registry.add_param(
            ParamSpec::new("robust", raw_value(self.raw, "robust_stl"))
                .default_value(false)
                .check(Check::is_type(ValueType::Boolean))
                .optional(),
        )?;

        let degrees = self.load_mapping(
            "loess_degrees",
            "stl_degree_kwargs",
            &LOESS_DEGREE_KEYS,
            |v| as_integer(v).is_some_and(|d| d == 0 || d == 1),
            "The degrees used for Loess estimation should be equal to 0 or 1",
        )?;
        let jumps = self.load_mapping(
            "speed_jumps",
            "stl_speed_jump_kwargs",
            &SPEED_JUMP_KEYS,
            |v| as_integer(v).is_some_and(|j| j >= 0),
            "The speed jumps should be non-negative integers",
        )?;
        let smoothers = self.load_mapping(
            "additional_smoothers",
            "stl_smoothers_kwargs",
            &SMOOTHER_KEYS,
            |v| as_integer(v).is_some_and(|s| s >= 3 && s % 2 == 1 && s > period as i64),
            &format!(
                "The additional smoothers should be odd integers of at least 3 and greater than \
                 the seasonal period ({period})"
            ),
        )?;

        let int = |map: &Map<String, Value>, key: &str| map.get(key).and_then(as_integer);
        Ok(StlAdvanced {
            robust: self.registry.get_bool("robust")?,
            loess_degrees: LoessDegrees {
                seasonal_deg: int(&degrees, "seasonal_deg").map(|d| d as u8),
                trend_deg: int(&degrees, "trend_deg").map(|d| d as u8),
                low_pass_deg: int(&degrees, "low_pass_deg").map(|d| d as u8),
            },
            speed_jumps: SpeedJumps {
                seasonal_jump: int(&jumps, "seasonal_jump").map(|j| j as usize),
                trend_jump: int(&jumps, "trend_jump").map(|j| j as usize),
                low_pass_jump: int(&jumps, "low_pass_jump").map(|j| j as usize),
            },
            smoothers: AdditionalSmoothers {
                trend: int(&smoothers, "trend").map(|s| s as usize),
                low_pass: int(&smoothers, "low_pass").map(|s| s as usize),
            },
        })
    }

    /// Registers a key/value block whose keys are restricted to `keys` and
    /// whose values must satisfy `valid_value` once coerced to integers.
    fn load_mapping(
        &mut self,
        name: &str,
        key: &str,
        keys: &[&str],
        valid_value: impl Fn(&Value) -> bool,
        err_msg: &str,
    ) -> Result<Map<String, Value>, ConfigurationError> {
        let value = raw_value(self.raw, key).map(|v| match strip_blank_entries(v) {
            Value::Object(map) => {
                Value::Object(map.into_iter().map(|(k, v)| (k, coerce_integer(v))).collect())
            }
            other => other,
        });
        let values_ok = match &value {
            Some(Value::Object(map)) => map.values().all(&valid_value),
            _ => true,
        };

        self.registry.add_param(
            ParamSpec::new(name, value)
                .default_value(json!({}))
                .checks([
                    Check::is_type(ValueType::Mapping),
                    Check::one_of(keys.iter().copied()),
                    Check::custom(values_ok, err_msg),
                ])
                .optional(),
        )?;
        self.registry.get_as(name)
    }

    fn load_classical_parameters(&mut self) -> Result<ClassicalSettings, ConfigurationError> {
        let model = self.load_model("classical_model", Some("additive"))?;
        let advanced = if self.load_advanced_flag("expert_classical")? {
            Some(self.load_classical_advanced_parameters()?)
        } else {
            None
        };
        Ok(ClassicalSettings { model, advanced })
    }

    fn load_classical_advanced_parameters(
        &mut self,
    ) -> Result<ClassicalAdvanced, ConfigurationError> {
        self.registry.add_param(
            ParamSpec::new(
                "advanced_params",
                raw_value(self.raw, "advanced_params_classical").map(strip_blank_entries),
            )
            .default_value(json!({}))
            .checks([Check::is_type(ValueType::Mapping), Check::one_of(CLASSICAL_KEYS)])
            .optional(),
        )?;
        let advanced: Map<String, Value> = self.registry.get_as("advanced_params")?;

        let filt = advanced.get("filt").cloned().map(|v| match v {
            Value::String(s) => serde_json::from_str(&s).unwrap_or(Value::String(s)),
            other => other,
        });
        let filt_ok = match &filt {
            Some(Value::Array(items)) => !items.is_empty() && items.iter().all(Value::is_number),
            _ => true,
        };
        self.registry.add_param(
            ParamSpec::new("filt", filt)
                .checks([
                    Check::is_type(ValueType::Sequence)
                        .with_message("The filter should be a list of numbers"),
                    Check::custom(filt_ok, "The filter should be a non-empty list of numbers"),
                ])
                .optional(),
        )?;

        let two_sided = advanced.get("two_sided").cloned().map(|v| match v {
            Value::Bool(true) => json!("True"),
            Value::Bool(false) => json!("False"),
            other => other,
        });
        self.registry.add_param(
            ParamSpec::new("two_sided", two_sided)
                .default_value("True")
                .check(Check::one_of(["True", "False"]))
                .optional(),
        )?;

        let extrapolate = advanced.get("extrapolate_trend").cloned().map(coerce_integer);
        let extrapolate_ok = match &extrapolate {
            Some(Value::String(s)) => s == "freq",
            Some(other) => as_integer(other).is_some_and(|n| n >= 0),
            None => true,
        };
        self.registry.add_param(
            ParamSpec::new("extrapolate_trend", extrapolate)
                .default_value(0)
                .check(Check::custom(
                    extrapolate_ok,
                    "Extrapolate trend should be a non-negative integer or equal to 'freq'",
                ))
                .optional(),
        )?;

        let filt = match self.registry.get("filt")? {
            Value::Null => None,
            _ => Some(self.registry.get_as::<Vec<f64>>("filt")?),
        };
        let extrapolate_trend = match self.registry.get("extrapolate_trend")? {
            Value::String(_) => ExtrapolateTrend::Freq,
            _ => ExtrapolateTrend::Points(self.registry.get_u64("extrapolate_trend")? as usize),
        };

        Ok(ClassicalAdvanced {
            filt,
            two_sided: self.registry.get_str("two_sided")? == "True",
            extrapolate_trend,
        })
    }
}
