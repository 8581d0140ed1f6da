//! Error types shared across the crate.
//!
//! Configuration problems are raised while the recipe configuration is being
//! built and always name the offending parameter. Decomposition problems come
//! from the algorithms and are wrapped with the target column and group that
//! produced them before they leave the orchestrator.

use thiserror::Error;

/// Raised while registering or reading configuration parameters.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigurationError {
    #[error("Parameter '{param}' is required but was not provided")]
    Missing { param: String },

    #[error("Invalid parameter '{param}': {reason}")]
    Invalid { param: String, reason: String },

    #[error("Parameter '{param}' has not been registered")]
    Unregistered { param: String },
}

impl ConfigurationError {
    pub fn invalid(param: &str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            param: param.to_string(),
            reason: reason.into(),
        }
    }

    /// Name of the parameter the error refers to.
    pub fn param(&self) -> &str {
        match self {
            Self::Missing { param }
            | Self::Invalid { param, .. }
            | Self::Unregistered { param } => param,
        }
    }
}

/// Raised by a decomposition algorithm or while turning cells into a series.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecompositionError {
    #[error("Series has {len} observations but at least {required} are needed")]
    SeriesTooShort { len: usize, required: usize },

    #[error("Seasonal period must be at least 2, got {0}")]
    InvalidPeriod(usize),

    #[error("Invalid decomposition parameter: {0}")]
    InvalidParameter(String),

    #[error("Series contains a non-finite value at position {index}")]
    NonFinite { index: usize },

    #[error("Multiplicative model needs positive values, found {value} at position {index}")]
    NonPositive { index: usize, value: f64 },

    #[error("Value {value} in row {row} is not numeric")]
    NonNumeric { row: usize, value: String },
}

/// Crate-level error.
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error("Dataset error: {0}")]
    Dataset(String),

    #[error("Decomposition of '{target}' failed for {group}: {source}")]
    Decomposition {
        target: String,
        group: String,
        #[source]
        source: DecompositionError,
    },

    #[error("Worker task failed: {0}")]
    Worker(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
