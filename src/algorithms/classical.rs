//! Classical decomposition by moving averages.
//!
//! The trend is a convolution of the series with a moving-average filter
//! (centred by default), the seasonal component is the per-position average
//! of the detrended series, normalised to sum to zero (additive) or average
//! to one (multiplicative). Trend values the filter cannot reach are NaN
//! unless trend extrapolation is requested.

use super::{DecompositionResult, Decomposer, ensure_finite, ensure_two_cycles};
use crate::config::recipe::{ExtrapolateTrend, Model};
use crate::error::DecompositionError;

#[derive(Debug, Clone, PartialEq)]
pub struct Classical {
    period: usize,
    model: Model,
    filt: Option<Vec<f64>>,
    two_sided: bool,
    extrapolate_trend: ExtrapolateTrend,
}

impl Classical {
    pub fn new(period: usize, model: Model) -> Self {
        Self {
            period,
            model,
            filt: None,
            two_sided: true,
            extrapolate_trend: ExtrapolateTrend::Points(0),
        }
    }

    /// Custom trend filter coefficients.
    pub fn filter(mut self, filt: Vec<f64>) -> Self {
        self.filt = Some(filt);
        self
    }

    pub fn two_sided(mut self, two_sided: bool) -> Self {
        self.two_sided = two_sided;
        self
    }

    pub fn extrapolate_trend(mut self, extrapolate: ExtrapolateTrend) -> Self {
        self.extrapolate_trend = extrapolate;
        self
    }

    /// The configured filter, or the default moving average for the period.
    fn trend_filter(&self) -> Vec<f64> {
        if let Some(filt) = &self.filt {
            return filt.clone();
        }
        let p = self.period as f64;
        if self.period % 2 == 0 {
            let mut filt = vec![1.0 / p; self.period + 1];
            filt[0] = 0.5 / p;
            filt[self.period] = 0.5 / p;
            filt
        } else {
            vec![1.0 / p; self.period]
        }
    }

    fn extrapolation_points(&self) -> usize {
        match self.extrapolate_trend {
            ExtrapolateTrend::Points(points) => points,
            ExtrapolateTrend::Freq => self.period - 1,
        }
    }
}

impl Decomposer for Classical {
    fn decompose(&self, series: &[f64]) -> Result<DecompositionResult, DecompositionError> {
        ensure_finite(series)?;
        ensure_two_cycles(series, self.period)?;

        if self.model == Model::Multiplicative {
            if let Some((index, &value)) = series.iter().enumerate().find(|(_, v)| **v <= 0.0) {
                return Err(DecompositionError::NonPositive { index, value });
            }
        }

        let filt = self.trend_filter();
        if filt.is_empty() || filt.len() > series.len() {
            return Err(DecompositionError::InvalidParameter(format!(
                "filt must hold between 1 and {} coefficients, got {}",
                series.len(),
                filt.len()
            )));
        }
        if filt.iter().any(|c| !c.is_finite()) {
            return Err(DecompositionError::InvalidParameter(
                "filt coefficients must be finite".to_string(),
            ));
        }

        let mut trend = convolution_filter(series, &filt, self.two_sided);
        let points = self.extrapolation_points();
        if points > 0 {
            extrapolate(&mut trend, points + 1);
        }

        let combine = |a: f64, b: f64| match self.model {
            Model::Additive => a - b,
            Model::Multiplicative => a / b,
        };

        let detrended: Vec<f64> = series.iter().zip(&trend).map(|(&y, &t)| combine(y, t)).collect();

        let mut averages: Vec<f64> = (0..self.period)
            .map(|j| nanmean(detrended.iter().skip(j).step_by(self.period).copied()))
            .collect();
        let overall = nanmean(averages.iter().copied());
        for avg in &mut averages {
            *avg = combine(*avg, overall);
        }

        let seasonal: Vec<f64> = (0..series.len()).map(|i| averages[i % self.period]).collect();
        let resid = detrended.iter().zip(&seasonal).map(|(&d, &s)| combine(d, s)).collect();

        Ok(DecompositionResult {
            trend,
            seasonal,
            resid,
        })
    }

    fn name(&self) -> &'static str {
        "classical"
    }
}

/// Linear filter of `x`; positions the filter does not fully cover are NaN.
///
/// A two-sided filter is centred on each point, a one-sided filter only uses
/// the current and past values.
fn convolution_filter(x: &[f64], filt: &[f64], two_sided: bool) -> Vec<f64> {
    let n = x.len();
    let len = filt.len();
    let mut out = vec![f64::NAN; n];
    if len == 0 || len > n {
        return out;
    }

    let head = if two_sided { len.div_ceil(2) - 1 } else { len - 1 };
    for m in 0..=n - len {
        out[head + m] = filt
            .iter()
            .enumerate()
            .map(|(k, c)| c * x[m + len - 1 - k])
            .sum();
    }
    out
}

/// Replaces the NaN ends of `trend` with least-squares lines fitted on up to
/// `npoints` of the nearest defined values.
fn extrapolate(trend: &mut [f64], npoints: usize) {
    let Some(front) = trend.iter().position(|v| !v.is_nan()) else {
        return;
    };
    let Some(back) = trend.iter().rposition(|v| !v.is_nan()) else {
        return;
    };

    let front_last = (front + npoints).min(back);
    let (slope, intercept) = least_squares(trend, front, front_last.max(front + 1));
    for (i, value) in trend.iter_mut().enumerate().take(front) {
        *value = slope * i as f64 + intercept;
    }

    let back_first = back.saturating_sub(npoints).max(front);
    let (slope, intercept) = least_squares(trend, back_first, back.max(back_first + 1));
    for (i, value) in trend.iter_mut().enumerate().skip(back + 1) {
        *value = slope * i as f64 + intercept;
    }
}

/// Line through `(i, values[i])` for `i` in `start..end`.
fn least_squares(values: &[f64], start: usize, end: usize) -> (f64, f64) {
    let count = (end - start) as f64;
    let mean_x = (start..end).map(|i| i as f64).sum::<f64>() / count;
    let mean_y = values[start..end].iter().sum::<f64>() / count;

    let (mut sxy, mut sxx) = (0.0, 0.0);
    for i in start..end {
        let dx = i as f64 - mean_x;
        sxy += dx * (values[i] - mean_y);
        sxx += dx * dx;
    }
    let slope = if sxx > 0.0 { sxy / sxx } else { 0.0 };
    (slope, mean_y - slope * mean_x)
}

/// Mean of the non-NaN values, NaN when there are none.
fn nanmean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values
        .filter(|v| !v.is_nan())
        .fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    if count == 0 { f64::NAN } else { sum / count as f64 }
}
