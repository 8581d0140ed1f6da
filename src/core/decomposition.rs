//! Decomposition orchestrator.
//!
//! Given a validated [`TransformationConfig`], prepares the input rows, splits
//! them into series groups and decomposes every target column of every group.
//! The three components are appended as `{target}_trend_0`,
//! `{target}_seasonal_0` and `{target}_residuals_0`; groups are concatenated
//! back in enumeration order.

use super::dataset::{Dataset, cell_as_f64, cell_to_string};
use super::grouping::{SeriesGroup, group_rows};
use super::preparation::prepare;
use crate::algorithms::{Classical, DecompositionResult, Decomposer, Stl};
use crate::config::recipe::{DecompositionMethod, Model, TransformationConfig};
use crate::error::{DecompositionError, Error, Result};

use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What to do when one group fails to decompose.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ErrorStrategy {
    /// Stop at the first failure.
    #[default]
    Abort,
    /// Drop the failed group and carry on.
    Skip,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedGroup {
    pub group: String,
    pub reason: String,
}

/// Outcome of one fit.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FitReport {
    pub processed: usize,
    pub skipped: Vec<SkippedGroup>,
}

impl FitReport {
    pub fn is_complete(&self) -> bool {
        self.skipped.is_empty()
    }
}

pub struct TimeseriesDecomposition {
    config: Arc<TransformationConfig>,
    decomposer: Arc<dyn Decomposer>,
    error_strategy: ErrorStrategy,
}

impl TimeseriesDecomposition {
    pub fn new(config: Arc<TransformationConfig>) -> Self {
        let decomposer = build_decomposer(&config);
        Self {
            config,
            decomposer,
            error_strategy: ErrorStrategy::default(),
        }
    }

    pub fn with_error_strategy(mut self, error_strategy: ErrorStrategy) -> Self {
        self.error_strategy = error_strategy;
        self
    }

    pub fn config(&self) -> &TransformationConfig {
        &self.config
    }

    /// Output column names for one target column.
    pub fn output_columns(target: &str) -> [String; 3] {
        [
            format!("{target}_trend_0"),
            format!("{target}_seasonal_0"),
            format!("{target}_residuals_0"),
        ]
    }

    /// Decomposes every group in turn.
    pub fn fit(&self, input: &Dataset) -> Result<(Dataset, FitReport)> {
        let (prepared, groups) = self.split(input)?;
        let outcomes = groups
            .into_iter()
            .map(|group| {
                let decomposer = self.decomposer.as_ref();
                let result = decompose_group(&self.config, decomposer, &prepared, &group);
                (group.to_string(), result)
            })
            .collect();
        self.assemble(outcomes)
    }

    /// Decomposes groups concurrently on the blocking pool. The output is the
    /// same as [`fit`](Self::fit), in the same order.
    pub async fn fit_parallel(&self, input: &Dataset) -> Result<(Dataset, FitReport)> {
        let (prepared, groups) = self.split(input)?;
        let prepared = Arc::new(prepared);

        let handles = groups.into_iter().map(|group| {
            let config = Arc::clone(&self.config);
            let decomposer = Arc::clone(&self.decomposer);
            let prepared = Arc::clone(&prepared);
            let handle = tokio::task::spawn_blocking(move || {
                let result = decompose_group(&config, decomposer.as_ref(), &prepared, &group);
                (group.to_string(), result)
            });
            async move { handle.await.map_err(|e| Error::Worker(e.to_string())) }
        });

        let outcomes = try_join_all(handles).await?;
        self.assemble(outcomes)
    }

    fn split(&self, input: &Dataset) -> Result<(Dataset, Vec<SeriesGroup>)> {
        let identifiers = &self.config.timeseries_identifiers;
        let prepared = prepare(input, &self.config.time_column, identifiers)?;
        let groups = group_rows(&prepared, identifiers)?;

        info!(
            method = self.decomposer.name(),
            model = %self.config.model(),
            period = self.config.frequency.seasonal_period(),
            groups = groups.len(),
            targets = self.config.target_columns.len(),
            "Starting decomposition"
        );
        Ok((prepared, groups))
    }

    fn assemble(&self, outcomes: Vec<(String, Result<Dataset>)>) -> Result<(Dataset, FitReport)> {
        let mut parts = Vec::with_capacity(outcomes.len());
        let mut report = FitReport::default();

        for (group, outcome) in outcomes {
            match outcome {
                Ok(part) => {
                    report.processed += 1;
                    parts.push(part);
                }
                Err(e) if self.error_strategy == ErrorStrategy::Skip => {
                    warn!(%group, error = %e, "Skipping group");
                    report.skipped.push(SkippedGroup {
                        group,
                        reason: e.to_string(),
                    });
                }
                Err(e) => return Err(e),
            }
        }

        let output = Dataset::concat(parts)?;
        info!(
            rows = output.num_rows(),
            processed = report.processed,
            skipped = report.skipped.len(),
            "Decomposition finished"
        );
        Ok((output, report))
    }
}

fn build_decomposer(config: &TransformationConfig) -> Arc<dyn Decomposer> {
    let period = config.frequency.seasonal_period();
    match &config.method {
        DecompositionMethod::Stl(settings) => {
            let mut stl = Stl::new(period, settings.seasonal);
            if let Some(advanced) = &settings.advanced {
                let degrees = &advanced.loess_degrees;
                let jumps = &advanced.speed_jumps;
                stl = stl
                    .robust(advanced.robust)
                    .degrees(
                        degrees.seasonal_deg.unwrap_or(1),
                        degrees.trend_deg.unwrap_or(1),
                        degrees.low_pass_deg.unwrap_or(1),
                    )
                    .jumps(
                        jumps.seasonal_jump.unwrap_or(1),
                        jumps.trend_jump.unwrap_or(1),
                        jumps.low_pass_jump.unwrap_or(1),
                    );
                if let Some(trend) = advanced.smoothers.trend {
                    stl = stl.trend(trend);
                }
                if let Some(low_pass) = advanced.smoothers.low_pass {
                    stl = stl.low_pass(low_pass);
                }
            }
            Arc::new(stl)
        }
        DecompositionMethod::Classical(settings) => {
            let mut classical = Classical::new(period, settings.model);
            if let Some(advanced) = &settings.advanced {
                if let Some(filt) = &advanced.filt {
                    classical = classical.filter(filt.clone());
                }
                classical = classical
                    .two_sided(advanced.two_sided)
                    .extrapolate_trend(advanced.extrapolate_trend);
            }
            Arc::new(classical)
        }
    }
}

/// Decomposes every target column of one group and returns its rows with the
/// component columns appended.
fn decompose_group(
    config: &TransformationConfig,
    decomposer: &dyn Decomposer,
    prepared: &Dataset,
    group: &SeriesGroup,
) -> Result<Dataset> {
    let mut rows = prepared.take(&group.rows);
    debug!(%group, rows = rows.num_rows(), "Decomposing group");

    // STL is additive only, so a multiplicative model goes through logs.
    let log_transform = config.model() == Model::Multiplicative
        && matches!(config.method, DecompositionMethod::Stl(_));

    for target in &config.target_columns {
        let wrap = |source: DecompositionError| Error::Decomposition {
            target: target.clone(),
            group: group.to_string(),
            source,
        };

        let cells = rows
            .column(target)
            .ok_or_else(|| Error::Dataset(format!("Target column '{target}' not found")))?;
        let series = numeric_series(cells, &group.rows).map_err(wrap)?;

        let result = if log_transform {
            decompose_logged(decomposer, &series).map_err(wrap)?
        } else {
            decomposer.decompose(&series).map_err(wrap)?
        };

        let [trend, seasonal, resid] = TimeseriesDecomposition::output_columns(target);
        rows.append_numeric_column(&trend, &result.trend)?;
        rows.append_numeric_column(&seasonal, &result.seasonal)?;
        rows.append_numeric_column(&resid, &result.resid)?;
    }
    Ok(rows)
}

/// Reads cells as numbers; `rows` maps positions back to dataset rows for
/// error messages.
fn numeric_series(
    cells: &[serde_json::Value],
    rows: &[usize],
) -> Result<Vec<f64>, DecompositionError> {
    cells
        .iter()
        .enumerate()
        .map(|(i, cell)| {
            cell_as_f64(cell).ok_or_else(|| DecompositionError::NonNumeric {
                row: rows.get(i).copied().unwrap_or(i),
                value: cell_to_string(cell),
            })
        })
        .collect()
}

fn decompose_logged(
    decomposer: &dyn Decomposer,
    series: &[f64],
) -> Result<DecompositionResult, DecompositionError> {
    if let Some((index, &value)) = series.iter().enumerate().find(|(_, v)| **v <= 0.0) {
        return Err(DecompositionError::NonPositive { index, value });
    }
    let logged: Vec<f64> = series.iter().map(|v| v.ln()).collect();
    Ok(decomposer.decompose(&logged)?.map(f64::exp))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::params::RawConfig;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use serde_json::{Value, json};
    use std::f64::consts::PI;

    fn series_value(i: usize, level: f64, amplitude: f64) -> f64 {
        level + 0.5 * i as f64 + amplitude * (2.0 * PI * i as f64 / 4.0).sin()
    }

    /// Two stores of ten six-hourly observations each, interleaved.
    fn long_dataset(b_level: f64) -> Dataset {
        let mut dates = Vec::new();
        let mut stores = Vec::new();
        let mut sales = Vec::new();
        for i in 0..10 {
            for (store, level, amplitude) in [("A", 100.0, 5.0), ("B", b_level, 9.0)] {
                dates.push(json!(format!("2024-01-{:02}T{:02}:00:00", 1 + i / 4, (i % 4) * 6)));
                stores.push(json!(store));
                sales.push(json!(series_value(i, level, amplitude)));
            }
        }
        Dataset::from_columns(vec![
            ("date".into(), dates),
            ("store".into(), stores),
            ("sales".into(), sales),
        ])
        .unwrap()
    }

    fn raw(method: &str) -> RawConfig {
        let mut raw: RawConfig = serde_json::from_value(json!({
            "transformation_type": "seasonal_decomposition",
            "time_decomposition_method": method,
            "time_column": "date",
            "target_columns": ["sales"],
            "frequency_unit": "H",
            "frequency_step_hours": 6,
            "long_format": true,
            "timeseries_identifiers": ["store"],
        }))
        .unwrap();
        if method == "STL" {
            raw.insert("seasonal_stl".into(), json!(7));
            raw.insert("model_stl".into(), json!("additive"));
        }
        raw
    }

    fn orchestrator(raw: &RawConfig, input: &Dataset) -> TimeseriesDecomposition {
        let config = TransformationConfig::from_raw(raw, input).unwrap();
        TimeseriesDecomposition::new(Arc::new(config))
    }

    fn rows_of(output: &Dataset, store: &str, column: &str) -> Vec<Value> {
        let stores = output.column("store").unwrap();
        output
            .column(column)
            .unwrap()
            .iter()
            .zip(stores)
            .filter(|(_, s)| s.as_str() == Some(store))
            .map(|(v, _)| v.clone())
            .collect()
    }

    #[test]
    fn test_output_columns() {
        assert_eq!(
            TimeseriesDecomposition::output_columns("sales"),
            ["sales_trend_0", "sales_seasonal_0", "sales_residuals_0"]
        );
    }

    #[test]
    fn test_long_format_groups_are_independent() {
        let input = long_dataset(40.0);
        let (output, report) = orchestrator(&raw("STL"), &input).fit(&input).unwrap();

        assert_eq!(output.num_rows(), input.num_rows());
        assert_eq!(report.processed, 2);
        assert!(report.is_complete());
        for column in ["sales_trend_0", "sales_seasonal_0", "sales_residuals_0"] {
            assert!(output.has_column(column));
        }

        // Store A comes first and in time order.
        assert_eq!(rows_of(&output, "A", "sales").len(), 10);
        assert_eq!(output.column("store").unwrap()[..10], vec![json!("A"); 10][..]);

        let changed = long_dataset(500.0);
        let (other, _) = orchestrator(&raw("STL"), &changed).fit(&changed).unwrap();
        for column in ["sales_trend_0", "sales_seasonal_0", "sales_residuals_0"] {
            assert_eq!(rows_of(&output, "A", column), rows_of(&other, "A", column));
            assert_ne!(rows_of(&output, "B", column), rows_of(&other, "B", column));
        }
    }

    #[test]
    fn test_additive_reconstruction() {
        let input = long_dataset(40.0);
        let (output, _) = orchestrator(&raw("STL"), &input).fit(&input).unwrap();

        let value = output.numeric_column("sales").unwrap();
        let trend = output.numeric_column("sales_trend_0").unwrap();
        let seasonal = output.numeric_column("sales_seasonal_0").unwrap();
        let resid = output.numeric_column("sales_residuals_0").unwrap();
        for i in 0..output.num_rows() {
            let rebuilt = trend[i].unwrap() + seasonal[i].unwrap() + resid[i].unwrap();
            assert!((rebuilt - value[i].unwrap()).abs() < 1e-6);
        }
    }

    #[test]
    fn test_multiplicative_stl_goes_through_logs() {
        let mut raw = raw("STL");
        raw.insert("model_stl".into(), json!("multiplicative"));
        let input = long_dataset(40.0);
        let (output, _) = orchestrator(&raw, &input).fit(&input).unwrap();

        let value = output.numeric_column("sales").unwrap();
        let trend = output.numeric_column("sales_trend_0").unwrap();
        let seasonal = output.numeric_column("sales_seasonal_0").unwrap();
        let resid = output.numeric_column("sales_residuals_0").unwrap();
        for i in 0..output.num_rows() {
            let rebuilt = trend[i].unwrap() * seasonal[i].unwrap() * resid[i].unwrap();
            assert!((rebuilt - value[i].unwrap()).abs() < 1e-6);
            assert!(seasonal[i].unwrap() > 0.0);
        }
    }

    #[test]
    fn test_classical_edges_are_null() {
        let input = long_dataset(40.0);
        let (output, _) = orchestrator(&raw("classical"), &input).fit(&input).unwrap();

        let trend = rows_of(&output, "A", "sales_trend_0");
        assert_eq!(trend[0], Value::Null);
        assert_eq!(trend[1], Value::Null);
        assert!(trend[2].is_number());
        assert_eq!(trend[9], Value::Null);
    }

    #[test]
    fn test_wide_format_single_pass() {
        let input = long_dataset(40.0);
        let input = input.take(&(0..20).step_by(2).collect::<Vec<_>>());
        let mut raw = raw("classical");
        raw.insert("long_format".into(), json!(false));

        let (output, report) = orchestrator(&raw, &input).fit(&input).unwrap();
        assert_eq!(output.num_rows(), 10);
        assert_eq!(report.processed, 1);
    }

    /// Store B only has three rows, too few for two cycles of four.
    fn input_with_short_group() -> Dataset {
        let full = long_dataset(40.0);
        let rows: Vec<usize> = (0..20).filter(|&r| r % 2 == 0 || r < 6).collect();
        full.take(&rows)
    }

    #[test]
    fn test_abort_propagates_first_failure() {
        let input = input_with_short_group();
        let err = orchestrator(&raw("STL"), &input).fit(&input).unwrap_err();
        match err {
            Error::Decomposition {
                target,
                group,
                source,
            } => {
                assert_eq!(target, "sales");
                assert_eq!(group, "group [store=B]");
                assert_eq!(
                    source,
                    DecompositionError::SeriesTooShort {
                        len: 3,
                        required: 8
                    }
                );
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn test_skip_drops_failed_group() {
        let input = input_with_short_group();
        let (output, report) = orchestrator(&raw("STL"), &input)
            .with_error_strategy(ErrorStrategy::Skip)
            .fit(&input)
            .unwrap();

        assert_eq!(output.num_rows(), 10);
        assert_eq!(report.processed, 1);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].group, "group [store=B]");
        assert!(rows_of(&output, "B", "sales").is_empty());
    }

    #[test]
    fn test_non_numeric_value_names_the_row() {
        let mut input = long_dataset(40.0);
        let mut sales = input.column("sales").unwrap().to_vec();
        sales[4] = json!("n/a");
        input.append_column("sales", sales).unwrap();

        let err = orchestrator(&raw("STL"), &input).fit(&input).unwrap_err();
        assert!(matches!(
            err,
            Error::Decomposition { source: DecompositionError::NonNumeric { row: 4, .. }, .. }
        ));
    }

    #[tokio::test]
    async fn test_parallel_matches_sequential() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut input = long_dataset(40.0);
        let noisy: Vec<Value> = input
            .numeric_column("sales")
            .unwrap()
            .into_iter()
            .map(|v| json!(v.unwrap() + rng.random_range(-1.0..1.0)))
            .collect();
        input.append_column("sales", noisy).unwrap();

        let decomposition = orchestrator(&raw("STL"), &input);
        let sequential = decomposition.fit(&input).unwrap();
        let parallel = decomposition.fit_parallel(&input).await.unwrap();
        assert_eq!(sequential, parallel);
    }
}
