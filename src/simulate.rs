//! Synthetic long-format data.
//!
//! Generates several daily series sharing one seasonal period, each with its
//! own level, slope and seasonal amplitude plus Gaussian noise. The output has
//! the columns `date`, `series_id` and `value`, ready for a long-format recipe.

use crate::core::Dataset;
use crate::error::{Error, Result};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal, Uniform};
use serde_json::{Value, json};
use std::f64::consts::PI;
use tracing::info;

/// Days from 1970-01-01 to the first generated date, 2024-01-01.
const START_DAY: i64 = 19_723;

#[derive(Debug, Clone, PartialEq)]
pub struct SimulationOptions {
    pub series: usize,
    /// Number of full seasonal cycles per series.
    pub periods: usize,
    pub period: usize,
    /// Standard deviation of the noise.
    pub noise: f64,
    pub seed: Option<u64>,
}

impl Default for SimulationOptions {
    fn default() -> Self {
        Self {
            series: 3,
            periods: 8,
            period: 7,
            noise: 1.0,
            seed: None,
        }
    }
}

pub fn simulate(options: &SimulationOptions) -> Result<Dataset> {
    let mut rng = match options.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_rng(&mut rand::rng()),
    };

    let noise = Normal::new(0.0, options.noise)
        .map_err(|e| Error::Dataset(format!("Invalid noise level {}: {e}", options.noise)))?;
    let level = Uniform::new(50.0, 150.0).map_err(|e| Error::Dataset(e.to_string()))?;
    let amplitude = Uniform::new(5.0, 20.0).map_err(|e| Error::Dataset(e.to_string()))?;

    let length = options.periods * options.period;
    let mut dates = Vec::with_capacity(options.series * length);
    let mut ids = Vec::with_capacity(options.series * length);
    let mut values = Vec::with_capacity(options.series * length);

    for s in 0..options.series {
        let id = format!("S{:02}", s + 1);
        let base = level.sample(&mut rng);
        let slope = rng.random_range(-0.2..0.5);
        let amp = amplitude.sample(&mut rng);
        let phase = rng.random_range(0.0..2.0 * PI);

        for t in 0..length {
            let angle = 2.0 * PI * t as f64 / options.period.max(1) as f64 + phase;
            let value = base + slope * t as f64 + amp * angle.sin() + noise.sample(&mut rng);
            dates.push(json!(iso_date(START_DAY + t as i64)));
            ids.push(json!(id));
            values.push(json!(value.max(0.01)));
        }
    }

    info!(
        series = options.series,
        rows = values.len(),
        period = options.period,
        "Simulated dataset generated"
    );
    Dataset::from_columns(vec![
        ("date".to_string(), dates),
        ("series_id".to_string(), ids),
        ("value".to_string(), values),
    ])
}

/// `YYYY-MM-DD` for a count of days since the Unix epoch.
fn iso_date(days: i64) -> String {
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1_460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = doy - (153 * mp + 2) / 5 + 1;
    let month = if mp < 10 { mp + 3 } else { mp - 9 };
    let year = yoe + era * 400 + i64::from(month <= 2);
    format!("{year:04}-{month:02}-{day:02}")
}

/// A recipe that decomposes the output of [`simulate`] with STL, or `None`
/// when no frequency unit has the simulated period as its seasonal period.
pub fn sample_recipe(options: &SimulationOptions) -> Option<Value> {
    let (unit, step_key, step) = match options.period {
        7 => ("D", None, 1),
        5 => ("B", None, 1),
        12 => ("M", None, 1),
        4 => ("3M", None, 1),
        2 => ("6M", None, 1),
        52 => ("W", None, 1),
        p if p >= 2 && 24 % p == 0 => ("H", Some("frequency_step_hours"), 24 / p),
        p if p >= 2 && 1440 % p == 0 => ("min", Some("frequency_step_minutes"), 1440 / p),
        _ => return None,
    };

    let mut recipe = json!({
        "transformation_type": "seasonal_decomposition",
        "time_decomposition_method": "STL",
        "time_column": "date",
        "target_columns": ["value"],
        "frequency_unit": unit,
        "seasonal_stl": 7,
        "model_stl": "additive",
        "long_format": options.series > 1,
        "timeseries_identifiers": ["series_id"],
    });
    if let (Some(key), Value::Object(map)) = (step_key, &mut recipe) {
        map.insert(key.to_string(), json!(step));
    }
    Some(recipe)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iso_date() {
        assert_eq!(iso_date(0), "1970-01-01");
        assert_eq!(iso_date(START_DAY), "2024-01-01");
        assert_eq!(iso_date(START_DAY + 59), "2024-02-29");
        assert_eq!(iso_date(START_DAY + 366), "2025-01-01");
    }

    #[test]
    fn test_shape() {
        let options = SimulationOptions {
            series: 2,
            periods: 3,
            period: 4,
            noise: 0.5,
            seed: Some(1),
        };
        let ds = simulate(&options).unwrap();

        assert_eq!(ds.column_names(), &["date", "series_id", "value"]);
        assert_eq!(ds.num_rows(), 24);
        assert_eq!(ds.column("series_id").unwrap()[12], json!("S02"));
        assert_eq!(ds.column("date").unwrap()[12], json!("2024-01-01"));
        assert!(ds.numeric_column("value").unwrap().iter().all(|v| v.unwrap() > 0.0));
    }

    #[test]
    fn test_seed_is_reproducible() {
        let options = SimulationOptions {
            seed: Some(42),
            ..Default::default()
        };
        assert_eq!(simulate(&options).unwrap(), simulate(&options).unwrap());
    }

    #[test]
    fn test_sample_recipe_validates_against_output() {
        use crate::config::params::RawConfig;
        use crate::config::recipe::TransformationConfig;

        for period in [7, 6, 12] {
            let options = SimulationOptions {
                period,
                seed: Some(3),
                ..Default::default()
            };
            let ds = simulate(&options).unwrap();
            let raw: RawConfig = serde_json::from_value(sample_recipe(&options).unwrap()).unwrap();
            let config = TransformationConfig::from_raw(&raw, &ds).unwrap();
            assert_eq!(config.frequency.seasonal_period(), period);
            assert!(config.long_format);
        }
        for period in [1, 11] {
            let options = SimulationOptions {
                period,
                ..Default::default()
            };
            assert!(sample_recipe(&options).is_none());
        }
    }

    #[test]
    fn test_negative_noise_is_rejected() {
        let options = SimulationOptions {
            noise: -1.0,
            ..Default::default()
        };
        assert!(simulate(&options).is_err());
    }
}
