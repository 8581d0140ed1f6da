//! Loess primitives used by STL.
//!
//! Observations sit at integer positions `0..n`. A fit at position `xs` uses
//! the observations in `[left, right]`, weighted with the tricube kernel over
//! the window half-width and optionally multiplied by robustness weights.
//! Degree 0 is a weighted mean, degree 1 a weighted local line.

/// Estimates the smoothed value at `xs` from `y[left..=right]`.
///
/// `weights` is scratch space at least as long as `y`. Returns `None` when
/// every weight in the window is zero.
#[allow(clippy::too_many_arguments)]
pub fn estimate(
    y: &[f64],
    span: usize,
    degree: u8,
    xs: f64,
    left: usize,
    right: usize,
    weights: &mut [f64],
    robustness: Option<&[f64]>,
) -> Option<f64> {
    let n = y.len();
    let range = n as f64 - 1.0;

    let mut h = (xs - left as f64).max(right as f64 - xs);
    if span > n {
        h += ((span - n) / 2) as f64;
    }
    let h9 = 0.999 * h;
    let h1 = 0.001 * h;

    let mut total = 0.0;
    for j in left..=right {
        weights[j] = 0.0;
        let r = (j as f64 - xs).abs();
        if r <= h9 {
            weights[j] = if r <= h1 { 1.0 } else { (1.0 - (r / h).powi(3)).powi(3) };
            if let Some(rw) = robustness {
                weights[j] *= rw[j];
            }
            total += weights[j];
        }
    }
    if total <= 0.0 {
        return None;
    }

    for w in &mut weights[left..=right] {
        *w /= total;
    }

    if h > 0.0 && degree > 0 {
        let centre: f64 = (left..=right).map(|j| weights[j] * j as f64).sum();
        let spread: f64 = (left..=right)
            .map(|j| weights[j] * (j as f64 - centre).powi(2))
            .sum();
        if spread.sqrt() > 0.001 * range {
            let slope = (xs - centre) / spread;
            for j in left..=right {
                weights[j] *= slope * (j as f64 - centre) + 1.0;
            }
        }
    }

    Some((left..=right).map(|j| weights[j] * y[j]).sum())
}

/// Smooths `y` into `out` with a loess of the given span.
///
/// With `jump > 1` the fit is evaluated every `jump` points (and at the last
/// point) and linearly interpolated in between.
pub fn smooth(
    y: &[f64],
    span: usize,
    degree: u8,
    jump: usize,
    robustness: Option<&[f64]>,
    out: &mut [f64],
) {
    let n = y.len();
    if n == 0 {
        return;
    }
    if n < 2 {
        out[0] = y[0];
        return;
    }

    let mut weights = vec![0.0; n];
    let jump = jump.clamp(1, n - 1);
    let half = span.div_ceil(2).max(1);

    let mut fit_at = |i: usize, left: usize, right: usize| {
        estimate(y, span, degree, i as f64, left, right, &mut weights, robustness).unwrap_or(y[i])
    };

    if span >= n {
        for i in (0..n).step_by(jump) {
            out[i] = fit_at(i, 0, n - 1);
        }
    } else if jump == 1 {
        let (mut left, mut right) = (0, span - 1);
        for i in 0..n {
            if i + 1 > half && right != n - 1 {
                left += 1;
                right += 1;
            }
            out[i] = fit_at(i, left, right);
        }
    } else {
        for i in (0..n).step_by(jump) {
            let (left, right) = window(i, n, span, half);
            out[i] = fit_at(i, left, right);
        }
    }

    if jump == 1 {
        return;
    }

    for i in (0..n - jump).step_by(jump) {
        let delta = (out[i + jump] - out[i]) / jump as f64;
        for j in i + 1..i + jump {
            out[j] = out[i] + delta * (j - i) as f64;
        }
    }

    let last = ((n - 1) / jump) * jump;
    if last != n - 1 {
        let left = n.saturating_sub(span);
        out[n - 1] = fit_at(n - 1, left, n - 1);
        if last != n - 2 {
            let delta = (out[n - 1] - out[last]) / (n - 1 - last) as f64;
            for j in last + 1..n - 1 {
                out[j] = out[last] + delta * (j - last) as f64;
            }
        }
    }
}

/// Window of `span` points used for the fit at `i` when `span < n`.
fn window(i: usize, n: usize, span: usize, half: usize) -> (usize, usize) {
    let pos = i + 1;
    if pos < half {
        (0, span - 1)
    } else if pos >= n - half + 1 {
        (n - span, n - 1)
    } else {
        let left = pos - half;
        (left, left + span - 1)
    }
}

/// Moving average of width `len`; the output has `n - len + 1` values.
pub fn moving_average(x: &[f64], len: usize) -> Vec<f64> {
    if len == 0 || x.len() < len {
        return Vec::new();
    }
    let width = len as f64;
    let mut sum: f64 = x[..len].iter().sum();
    let mut out = Vec::with_capacity(x.len() - len + 1);
    out.push(sum / width);
    for j in len..x.len() {
        sum += x[j] - x[j - len];
        out.push(sum / width);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_data_is_reproduced() {
        let y: Vec<f64> = (0..20).map(|i| 3.0 + 0.5 * i as f64).collect();
        let mut out = vec![0.0; y.len()];
        smooth(&y, 7, 1, 1, None, &mut out);
        for (a, b) in y.iter().zip(&out) {
            assert!((a - b).abs() < 1e-9, "{a} vs {b}");
        }
    }

    #[test]
    fn test_jumps_interpolate_linear_data() {
        let y: Vec<f64> = (0..23).map(|i| 1.0 - 0.25 * i as f64).collect();
        let mut out = vec![0.0; y.len()];
        smooth(&y, 9, 1, 4, None, &mut out);
        for (a, b) in y.iter().zip(&out) {
            assert!((a - b).abs() < 1e-9, "{a} vs {b}");
        }
    }

    #[test]
    fn test_degree_zero_on_constant() {
        let y = vec![4.0; 10];
        let mut out = vec![0.0; 10];
        smooth(&y, 15, 0, 1, None, &mut out);
        assert!(out.iter().all(|v| (v - 4.0).abs() < 1e-12));
    }

    #[test]
    fn test_zero_robustness_weights_fall_back_to_data() {
        let y = vec![1.0, 2.0, 3.0];
        let rw = vec![0.0; 3];
        let mut weights = vec![0.0; 3];
        assert!(estimate(&y, 3, 1, 1.0, 0, 2, &mut weights, Some(&rw)).is_none());

        let mut out = vec![0.0; 3];
        smooth(&y, 3, 1, 1, Some(&rw), &mut out);
        assert_eq!(out, y);
    }

    #[test]
    fn test_moving_average() {
        assert_eq!(moving_average(&[1.0, 2.0, 3.0, 4.0], 2), vec![1.5, 2.5, 3.5]);
        assert!(moving_average(&[1.0], 2).is_empty());
    }
}
