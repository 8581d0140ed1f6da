//! STL: Seasonal-Trend decomposition using Loess.
//!
//! Follows Cleveland et al. (1990). The inner loop alternates between
//! smoothing the cycle-subseries of the detrended series (seasonal part) and
//! smoothing the deseasonalised series (trend part). The optional outer loop
//! recomputes bisquare robustness weights from the residuals so that outliers
//! stop pulling the fit.
//!
//! Parameter names and defaults match the statsmodels `STL` class: smoother
//! lengths are odd, the trend length defaults to the smallest odd integer
//! above `1.5 * period / (1 - 1.5 / seasonal)` and the low-pass length to the
//! smallest odd integer above `period`.

use super::loess::{moving_average, smooth, estimate};
use super::{DecompositionResult, Decomposer, ensure_finite, ensure_two_cycles};
use crate::error::DecompositionError;

#[derive(Debug, Clone, PartialEq)]
pub struct Stl {
    period: usize,
    seasonal: usize,
    trend: Option<usize>,
    low_pass: Option<usize>,
    seasonal_deg: u8,
    trend_deg: u8,
    low_pass_deg: u8,
    seasonal_jump: usize,
    trend_jump: usize,
    low_pass_jump: usize,
    robust: bool,
}

impl Stl {
    /// STL with the given period and seasonal smoother length.
    pub fn new(period: usize, seasonal: usize) -> Self {
        Self {
            period,
            seasonal,
            trend: None,
            low_pass: None,
            seasonal_deg: 1,
            trend_deg: 1,
            low_pass_deg: 1,
            seasonal_jump: 1,
            trend_jump: 1,
            low_pass_jump: 1,
            robust: false,
        }
    }

    pub fn trend(mut self, length: usize) -> Self {
        self.trend = Some(length);
        self
    }

    pub fn low_pass(mut self, length: usize) -> Self {
        self.low_pass = Some(length);
        self
    }

    pub fn degrees(mut self, seasonal: u8, trend: u8, low_pass: u8) -> Self {
        self.seasonal_deg = seasonal;
        self.trend_deg = trend;
        self.low_pass_deg = low_pass;
        self
    }

    /// Loess evaluation strides. A stride of zero is treated as one.
    pub fn jumps(mut self, seasonal: usize, trend: usize, low_pass: usize) -> Self {
        self.seasonal_jump = seasonal.max(1);
        self.trend_jump = trend.max(1);
        self.low_pass_jump = low_pass.max(1);
        self
    }

    pub fn robust(mut self, robust: bool) -> Self {
        self.robust = robust;
        self
    }

    pub fn period(&self) -> usize {
        self.period
    }

    pub fn trend_length(&self) -> usize {
        self.trend.unwrap_or_else(|| {
            let raw = 1.5 * self.period as f64 / (1.0 - 1.5 / self.seasonal as f64);
            next_odd(raw.ceil() as usize)
        })
    }

    pub fn low_pass_length(&self) -> usize {
        self.low_pass.unwrap_or_else(|| next_odd(self.period + 1))
    }

    fn iterations(&self) -> (usize, usize) {
        if self.robust { (2, 15) } else { (5, 0) }
    }

    fn validate(&self) -> Result<(), DecompositionError> {
        let odd_at_least_3 = |name: &str, value: usize| {
            if value < 3 || value % 2 == 0 {
                Err(DecompositionError::InvalidParameter(format!(
                    "{name} must be an odd integer >= 3, got {value}"
                )))
            } else {
                Ok(())
            }
        };
        odd_at_least_3("seasonal", self.seasonal)?;
        odd_at_least_3("trend", self.trend_length())?;
        odd_at_least_3("low_pass", self.low_pass_length())?;

        if self.trend_length() <= self.period {
            return Err(DecompositionError::InvalidParameter(format!(
                "trend must be greater than the period {}, got {}",
                self.period,
                self.trend_length()
            )));
        }
        if self.low_pass_length() <= self.period {
            return Err(DecompositionError::InvalidParameter(format!(
                "low_pass must be greater than the period {}, got {}",
                self.period,
                self.low_pass_length()
            )));
        }
        for (name, degree) in [
            ("seasonal_deg", self.seasonal_deg),
            ("trend_deg", self.trend_deg),
            ("low_pass_deg", self.low_pass_deg),
        ] {
            if degree > 1 {
                return Err(DecompositionError::InvalidParameter(format!(
                    "{name} must be 0 or 1, got {degree}"
                )));
            }
        }
        Ok(())
    }

    /// One pass of the inner loop, updating `trend` and `season` in place.
    fn inner_step(
        &self,
        y: &[f64],
        trend: &mut [f64],
        season: &mut [f64],
        robustness: Option<&[f64]>,
    ) {
        let n = y.len();
        let period = self.period;

        let detrended: Vec<f64> = y.iter().zip(trend.iter()).map(|(v, t)| v - t).collect();
        let mut cycle = vec![0.0; n + 2 * period];
        self.smooth_cycle_subseries(&detrended, robustness, &mut cycle);

        let low = moving_average(&moving_average(&moving_average(&cycle, period), period), 3);
        let mut low_smoothed = vec![0.0; n];
        smooth(
            &low,
            self.low_pass_length(),
            self.low_pass_deg,
            self.low_pass_jump,
            None,
            &mut low_smoothed,
        );

        for i in 0..n {
            season[i] = cycle[period + i] - low_smoothed[i];
        }

        let deseasonalised: Vec<f64> = y.iter().zip(season.iter()).map(|(v, s)| v - s).collect();
        smooth(
            &deseasonalised,
            self.trend_length(),
            self.trend_deg,
            self.trend_jump,
            robustness,
            trend,
        );
    }

    /// Smooths each cycle-subseries and extends it by one point on either
    /// side, writing a series of length `n + 2 * period` into `cycle`.
    fn smooth_cycle_subseries(&self, y: &[f64], robustness: Option<&[f64]>, cycle: &mut [f64]) {
        let n = y.len();
        let period = self.period;
        let span = self.seasonal;

        for j in 0..period.min(n) {
            let k = (n - j - 1) / period + 1;
            let sub: Vec<f64> = (0..k).map(|m| y[m * period + j]).collect();
            let sub_rw: Option<Vec<f64>> =
                robustness.map(|rw| (0..k).map(|m| rw[m * period + j]).collect());
            let sub_rw = sub_rw.as_deref();

            let mut smoothed = vec![0.0; k];
            smooth(&sub, span, self.seasonal_deg, self.seasonal_jump, sub_rw, &mut smoothed);

            let mut weights = vec![0.0; k];
            let right = span.min(k) - 1;
            let degree = self.seasonal_deg;
            let before = estimate(&sub, span, degree, -1.0, 0, right, &mut weights, sub_rw)
                .unwrap_or(smoothed[0]);
            let left = k.saturating_sub(span);
            let end = k as f64;
            let after = estimate(&sub, span, degree, end, left, k - 1, &mut weights, sub_rw)
                .unwrap_or(smoothed[k - 1]);

            cycle[j] = before;
            for (m, value) in smoothed.iter().enumerate() {
                cycle[(m + 1) * period + j] = *value;
            }
            cycle[(k + 1) * period + j] = after;
        }
    }
}

impl Decomposer for Stl {
    fn decompose(&self, series: &[f64]) -> Result<DecompositionResult, DecompositionError> {
        ensure_finite(series)?;
        ensure_two_cycles(series, self.period)?;
        self.validate()?;

        let n = series.len();
        let (inner, outer) = self.iterations();
        let mut trend = vec![0.0; n];
        let mut season = vec![0.0; n];

        for _ in 0..inner {
            self.inner_step(series, &mut trend, &mut season, None);
        }

        for _ in 0..outer {
            let fit: Vec<f64> = trend.iter().zip(&season).map(|(t, s)| t + s).collect();
            let rw = robustness_weights(series, &fit);
            for _ in 0..inner {
                self.inner_step(series, &mut trend, &mut season, Some(&rw));
            }
        }

        let resid = series
            .iter()
            .zip(&trend)
            .zip(&season)
            .map(|((y, t), s)| y - t - s)
            .collect();

        Ok(DecompositionResult {
            trend,
            seasonal: season,
            resid,
        })
    }

    fn name(&self) -> &'static str {
        "STL"
    }
}

/// Bisquare weights from absolute residuals scaled by six times their median.
fn robustness_weights(y: &[f64], fit: &[f64]) -> Vec<f64> {
    let residuals: Vec<f64> = y.iter().zip(fit).map(|(a, b)| (a - b).abs()).collect();
    let mut sorted = residuals.clone();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let n = sorted.len();
    let cmad = 3.0 * (sorted[n / 2] + sorted[n - 1 - n / 2]);
    let c9 = 0.999 * cmad;
    let c1 = 0.001 * cmad;

    residuals
        .iter()
        .map(|&r| {
            if r <= c1 {
                1.0
            } else if r <= c9 {
                (1.0 - (r / cmad).powi(2)).powi(2)
            } else {
                0.0
            }
        })
        .collect()
}

fn next_odd(value: usize) -> usize {
    if value % 2 == 0 { value + 1 } else { value }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    fn seasonal_series(n: usize, period: usize) -> Vec<f64> {
        (0..n)
            .map(|i| {
                let t = i as f64;
                50.0 + 0.3 * t + 10.0 * (2.0 * PI * t / period as f64).sin()
            })
            .collect()
    }

    #[test]
    fn test_default_lengths() {
        let stl = Stl::new(12, 7);
        assert_eq!(stl.trend_length(), 23);
        assert_eq!(stl.low_pass_length(), 13);

        let stl = Stl::new(7, 7);
        assert_eq!(stl.low_pass_length(), 9);
    }

    #[test]
    fn test_additive_reconstruction() {
        let y = seasonal_series(96, 12);
        let result = Stl::new(12, 7).decompose(&y).unwrap();

        assert_eq!(result.len(), y.len());
        for i in 0..y.len() {
            let rebuilt = result.trend[i] + result.seasonal[i] + result.resid[i];
            assert!((rebuilt - y[i]).abs() < 1e-9);
        }
    }

    #[test]
    fn test_recovers_seasonal_shape() {
        let y = seasonal_series(120, 12);
        let result = Stl::new(12, 13).decompose(&y).unwrap();

        // Away from the edges the seasonal component follows the sine wave.
        for i in 24..96 {
            let expected = 10.0 * (2.0 * PI * i as f64 / 12.0).sin();
            assert!((result.seasonal[i] - expected).abs() < 1.0, "index {i}");
        }
        assert!(result.trend[100] > result.trend[20]);
    }

    #[test]
    fn test_robust_downweights_outlier() {
        let mut y = seasonal_series(96, 12);
        y[50] += 200.0;

        let plain = Stl::new(12, 7).decompose(&y).unwrap();
        let robust = Stl::new(12, 7).robust(true).decompose(&y).unwrap();

        assert!(robust.resid[50] > plain.resid[50]);
        assert!(robust.resid[50] > 150.0);
    }

    #[test]
    fn test_jumps_and_degrees_still_reconstruct() {
        let y = seasonal_series(72, 12);
        let result = Stl::new(12, 9)
            .degrees(0, 1, 1)
            .jumps(2, 3, 2)
            .trend(25)
            .decompose(&y)
            .unwrap();
        for i in 0..y.len() {
            assert!((result.trend[i] + result.seasonal[i] + result.resid[i] - y[i]).abs() < 1e-9);
        }
    }

    #[test]
    fn test_rejections() {
        let y = seasonal_series(20, 12);
        assert_eq!(
            Stl::new(12, 7).decompose(&y),
            Err(DecompositionError::SeriesTooShort {
                len: 20,
                required: 24
            })
        );

        let y = seasonal_series(48, 12);
        assert!(matches!(
            Stl::new(12, 7).trend(11).decompose(&y),
            Err(DecompositionError::InvalidParameter(_))
        ));
        assert!(matches!(
            Stl::new(12, 8).decompose(&y),
            Err(DecompositionError::InvalidParameter(_))
        ));
        assert!(matches!(
            Stl::new(12, 7).degrees(2, 1, 1).decompose(&y),
            Err(DecompositionError::InvalidParameter(_))
        ));
        assert_eq!(Stl::new(1, 7).decompose(&y), Err(DecompositionError::InvalidPeriod(1)));
    }
}
