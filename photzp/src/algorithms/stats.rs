//! Small statistics primitives used by the fitter and the trend estimator.
//!
//! All functions ignore nothing: callers filter non-finite values first.

use std::cmp::Ordering;

/// Spread below which a sample is treated as noise-free.
pub const SPREAD_FLOOR: f64 = 1e-9;

fn sorted(values: &[f64]) -> Vec<f64> {
    let mut v = values.to_vec();
    v.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    v
}

/// Median of a slice. Returns `None` when empty.
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let v = sorted(values);
    let mid = v.len() / 2;
    if v.len() % 2 == 0 {
        Some((v[mid - 1] + v[mid]) / 2.0)
    } else {
        Some(v[mid])
    }
}

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Population standard deviation (divides by N).
pub fn std_dev(values: &[f64]) -> Option<f64> {
    let m = mean(values)?;
    let variance = values.iter().map(|x| (x - m).powi(2)).sum::<f64>() / values.len() as f64;
    Some(variance.sqrt())
}

/// Keeps values closer than `m` standard deviations to the median.
///
/// A sample with no spread is returned unchanged.
pub fn reject_outliers(values: &[f64], m: f64) -> Vec<f64> {
    let (Some(center), Some(sigma)) = (median(values), std_dev(values)) else {
        return Vec::new();
    };
    let limit = (m * sigma).max(SPREAD_FLOOR);
    values
        .iter()
        .copied()
        .filter(|v| (v - center).abs() < limit)
        .collect()
}

/// Degree-1 ordinary least squares result, `y = slope·x + intercept`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineFit {
    pub slope: f64,
    pub intercept: f64,
}

impl LineFit {
    pub fn eval(&self, x: f64) -> f64 {
        self.slope * x + self.intercept
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum LineFitError {
    #[error("need at least 2 points, got {0}")]
    TooFewPoints(usize),
    #[error("abscissa has no variance")]
    NoVariance,
}

/// Ordinary least squares line through `(xs[i], ys[i])`.
pub fn fit_line(xs: &[f64], ys: &[f64]) -> Result<LineFit, LineFitError> {
    let n = xs.len().min(ys.len());
    if n < 2 {
        return Err(LineFitError::TooFewPoints(n));
    }
    let xs = &xs[..n];
    let ys = &ys[..n];
    let mx = xs.iter().sum::<f64>() / n as f64;
    let my = ys.iter().sum::<f64>() / n as f64;

    let mut sxx = 0.0;
    let mut sxy = 0.0;
    for (x, y) in xs.iter().zip(ys) {
        sxx += (x - mx) * (x - mx);
        sxy += (x - mx) * (y - my);
    }
    // relative to the magnitude of x so large abscissae (dates) are handled
    let scale = xs.iter().fold(0.0_f64, |acc, x| acc.max(x.abs())).max(1.0);
    if sxx <= (scale * 1e-12).powi(2) * n as f64 {
        return Err(LineFitError::NoVariance);
    }
    let slope = sxy / sxx;
    Ok(LineFit {
        slope,
        intercept: my - slope * mx,
    })
}

/// Running median with an odd `window`. Near the ends the window shrinks
/// symmetrically to the points available on both sides.
pub fn running_median(values: &[f64], window: usize) -> Vec<f64> {
    let half = window.max(1) / 2;
    let n = values.len();
    (0..n)
        .map(|i| {
            let reach = half.min(i).min(n - 1 - i);
            median(&values[i - reach..=i + reach]).unwrap_or(values[i])
        })
        .collect()
}
