//! Seasonal decomposition of tabular time series.
//!
//! A recipe (a flat map of options) is validated against the input dataset
//! into a [`TransformationConfig`](config::TransformationConfig), then every
//! target column of every series group is split into trend, seasonal and
//! residual components with STL or classical decomposition.

pub mod algorithms;
pub mod config;
pub mod core;
pub mod error;
pub mod io;
pub mod logging;
pub mod runner;
pub mod simulate;

pub use error::{ConfigurationError, DecompositionError, Error, Result};
pub use runner::{RunOptions, run_recipe};
