//! Decomposition algorithms.
//!
//! Both algorithms implement [`Decomposer`]: they take a single, evenly spaced
//! series and return its trend, seasonal and residual components. Parameters
//! (period, smoother lengths, model) are fixed when the decomposer is built.

pub mod classical;
pub mod loess;
pub mod stl;

pub use classical::Classical;
pub use stl::Stl;

use crate::error::DecompositionError;

/// Components of a decomposed series, aligned index-for-index with the input.
#[derive(Debug, Clone, PartialEq)]
pub struct DecompositionResult {
    pub trend: Vec<f64>,
    pub seasonal: Vec<f64>,
    pub resid: Vec<f64>,
}

impl DecompositionResult {
    pub fn len(&self) -> usize {
        self.trend.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trend.is_empty()
    }

    /// Applies `f` to every value of every component, producing a new result.
    pub fn map(&self, f: impl Fn(f64) -> f64) -> Self {
        Self {
            trend: self.trend.iter().map(|&v| f(v)).collect(),
            seasonal: self.seasonal.iter().map(|&v| f(v)).collect(),
            resid: self.resid.iter().map(|&v| f(v)).collect(),
        }
    }
}

/// Splits a series into trend, seasonal and residual components.
pub trait Decomposer: Send + Sync {
    fn decompose(&self, series: &[f64]) -> Result<DecompositionResult, DecompositionError>;

    fn name(&self) -> &'static str;
}

/// Rejects series with NaN or infinite values.
pub(crate) fn ensure_finite(series: &[f64]) -> Result<(), DecompositionError> {
    match series.iter().position(|v| !v.is_finite()) {
        Some(index) => Err(DecompositionError::NonFinite { index }),
        None => Ok(()),
    }
}

/// Rejects series that do not hold two complete seasonal cycles.
pub(crate) fn ensure_two_cycles(series: &[f64], period: usize) -> Result<(), DecompositionError> {
    if period < 2 {
        return Err(DecompositionError::InvalidPeriod(period));
    }
    if series.len() < 2 * period {
        return Err(DecompositionError::SeriesTooShort {
            len: series.len(),
            required: 2 * period,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_produces_new_result() {
        let result = DecompositionResult {
            trend: vec![0.0, 1.0],
            seasonal: vec![0.0, 0.0],
            resid: vec![1.0, 0.0],
        };
        let exp = result.map(f64::exp);

        assert_eq!(result.trend, vec![0.0, 1.0]);
        assert_eq!(exp.trend, vec![1.0, std::f64::consts::E]);
        assert_eq!(exp.seasonal, vec![1.0, 1.0]);
        assert_eq!(exp.len(), 2);
    }

    #[test]
    fn test_guards() {
        assert_eq!(
            ensure_finite(&[1.0, f64::NAN]),
            Err(DecompositionError::NonFinite { index: 1 })
        );
        assert_eq!(ensure_two_cycles(&[1.0; 10], 1), Err(DecompositionError::InvalidPeriod(1)));
        assert_eq!(
            ensure_two_cycles(&[1.0; 10], 12),
            Err(DecompositionError::SeriesTooShort {
                len: 10,
                required: 24
            })
        );
        assert!(ensure_two_cycles(&[1.0; 24], 12).is_ok());
    }
}
