//! One recipe run: validate the configuration against the input, then fit.

use crate::config::params::{RawConfig, extract_param};
use crate::config::recipe::TransformationConfig;
use crate::core::{Dataset, ErrorStrategy, FitReport, TimeseriesDecomposition};
use crate::error::Result;

use std::sync::Arc;
use tracing::info;

/// Execution settings that are not part of the transformation itself.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    pub error_strategy: ErrorStrategy,
    pub parallel: bool,
}

impl RunOptions {
    /// Reads the optional `error_strategy` and `parallel` keys of a recipe.
    /// Unknown values fall back to the defaults.
    pub fn from_raw(raw: &RawConfig) -> Self {
        Self {
            error_strategy: extract_param(raw, "error_strategy", ErrorStrategy::default()),
            parallel: extract_param(raw, "parallel", false),
        }
    }
}

pub async fn run_recipe(
    raw: &RawConfig,
    input: &Dataset,
    options: RunOptions,
) -> Result<(Dataset, FitReport)> {
    let config = TransformationConfig::from_raw(raw, input)?;
    info!(
        method = config.method.name(),
        frequency = %config.frequency,
        rows = input.num_rows(),
        "Configuration loaded and validated"
    );

    let decomposition =
        TimeseriesDecomposition::new(Arc::new(config)).with_error_strategy(options.error_strategy);
    if options.parallel {
        decomposition.fit_parallel(input).await
    } else {
        decomposition.fit(input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::simulate::{SimulationOptions, sample_recipe, simulate};
    use serde_json::json;

    fn fixture() -> (RawConfig, Dataset) {
        let options = SimulationOptions {
            seed: Some(11),
            ..Default::default()
        };
        let raw = serde_json::from_value(sample_recipe(&options).unwrap()).unwrap();
        (raw, simulate(&options).unwrap())
    }

    #[test]
    fn test_options_from_raw() {
        let raw: RawConfig =
            serde_json::from_value(json!({"error_strategy": "skip", "parallel": true})).unwrap();
        assert_eq!(
            RunOptions::from_raw(&raw),
            RunOptions {
                error_strategy: ErrorStrategy::Skip,
                parallel: true
            }
        );

        let raw: RawConfig = serde_json::from_value(json!({"error_strategy": "retry"})).unwrap();
        assert_eq!(RunOptions::from_raw(&raw), RunOptions::default());
    }

    #[tokio::test]
    async fn test_run_recipe() {
        let (raw, input) = fixture();
        let (output, report) = run_recipe(&raw, &input, RunOptions::default()).await.unwrap();

        assert_eq!(output.num_rows(), input.num_rows());
        assert_eq!(report.processed, 3);
        assert!(output.has_column("value_residuals_0"));

        let parallel = RunOptions {
            parallel: true,
            ..Default::default()
        };
        let (same, _) = run_recipe(&raw, &input, parallel).await.unwrap();
        assert_eq!(same, output);
    }

    #[tokio::test]
    async fn test_invalid_recipe_fails_before_fitting() {
        let (mut raw, input) = fixture();
        raw.insert("seasonal_stl".into(), json!(6));

        let err = run_recipe(&raw, &input, RunOptions::default()).await.unwrap_err();
        assert!(matches!(err, Error::Configuration(ref e) if e.param() == "seasonal"));
    }
}
