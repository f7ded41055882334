//! Two-pass zeropoint and color-term fit.
//!
//! Model: `Δm = color_term · color + zeropoint`, where `Δm` is the reference
//! magnitude minus the instrumental magnitude.
//!
//! Pass one preselects pairs with a plausible color and a Δm close to the
//! median and fits a first line. Pass two keeps preselected pairs whose
//! residual against that line is both below an absolute limit and below
//! twice the residual standard deviation, then refits. The refit gives the
//! reported coefficients and scatter.

use serde::{Deserialize, Serialize};

use super::stats::{self, LineFit, LineFitError, SPREAD_FLOOR};

/// Cut values of the two-pass fit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FitPolicy {
    /// Exclusive lower bound on the reference color.
    pub color_min: f64,
    /// Exclusive upper bound on the reference color.
    pub color_max: f64,
    /// Max |Δm − median(Δm)| in preselection.
    pub preselect_window: f64,
    /// Max |residual| in pass two.
    pub residual_limit: f64,
    /// Residuals must be within this many standard deviations in pass two.
    pub sigma_clip: f64,
}

impl FitPolicy {
    pub const STANDARD: FitPolicy = FitPolicy {
        color_min: 0.0,
        color_max: 3.0,
        preselect_window: 0.75,
        residual_limit: 0.2,
        sigma_clip: 2.0,
    };
}

impl Default for FitPolicy {
    fn default() -> Self {
        Self::STANDARD
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FitPass {
    Preselection,
    Refit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum FitError {
    #[error("{pass:?} pass kept {points} points, at least 2 are needed")]
    Underdetermined { pass: FitPass, points: usize },
    #[error("{pass:?} pass has no color variance")]
    Degenerate { pass: FitPass },
}

impl FitError {
    fn from_line(pass: FitPass, err: LineFitError) -> Self {
        match err {
            LineFitError::TooFewPoints(points) => FitError::Underdetermined { pass, points },
            LineFitError::NoVariance => FitError::Degenerate { pass },
        }
    }
}

/// Outcome of a successful fit with the masks needed for diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearFit {
    pub color_term: f64,
    pub zeropoint: f64,
    /// Population standard deviation of the refit residuals.
    pub scatter: f64,
    /// First-pass coefficients as (color_term, zeropoint).
    pub first_pass: (f64, f64),
    /// Pairs that survived preselection.
    pub preselected: Vec<bool>,
    /// Pairs used in the final refit.
    pub inliers: Vec<bool>,
}

impl LinearFit {
    pub fn rejected(&self) -> usize {
        self.inliers.iter().filter(|k| !**k).count()
    }
}

fn select(values: &[f64], mask: &[bool]) -> Vec<f64> {
    values
        .iter()
        .zip(mask)
        .filter_map(|(v, keep)| keep.then_some(*v))
        .collect()
}

/// Runs the two-pass fit on parallel `colors` / `deltas` arrays.
pub fn fit(colors: &[f64], deltas: &[f64], policy: &FitPolicy) -> Result<LinearFit, FitError> {
    let n = colors.len().min(deltas.len());
    let colors = &colors[..n];
    let deltas = &deltas[..n];

    let center = stats::median(deltas).ok_or(FitError::Underdetermined {
        pass: FitPass::Preselection,
        points: 0,
    })?;
    let preselected: Vec<bool> = colors
        .iter()
        .zip(deltas)
        .map(|(c, d)| {
            *c > policy.color_min
                && *c < policy.color_max
                && (d - center).abs() < policy.preselect_window
        })
        .collect();

    let first = stats::fit_line(&select(colors, &preselected), &select(deltas, &preselected))
        .map_err(|e| FitError::from_line(FitPass::Preselection, e))?;

    let residuals: Vec<f64> = colors
        .iter()
        .zip(deltas)
        .map(|(c, d)| d - first.eval(*c))
        .collect();
    let sigma = stats::std_dev(&select(&residuals, &preselected)).unwrap_or(0.0);
    let clip = (policy.sigma_clip * sigma).max(SPREAD_FLOOR);

    let inliers: Vec<bool> = preselected
        .iter()
        .zip(&residuals)
        .map(|(pre, r)| *pre && r.abs() < policy.residual_limit && r.abs() < clip)
        .collect();

    let xs = select(colors, &inliers);
    let ys = select(deltas, &inliers);
    let second: LineFit =
        stats::fit_line(&xs, &ys).map_err(|e| FitError::from_line(FitPass::Refit, e))?;
    let final_residuals: Vec<f64> = xs.iter().zip(&ys).map(|(x, y)| y - second.eval(*x)).collect();
    let scatter = stats::std_dev(&final_residuals).unwrap_or(0.0);

    Ok(LinearFit {
        color_term: second.slope,
        zeropoint: second.intercept,
        scatter,
        first_pass: (first.slope, first.intercept),
        preselected,
        inliers,
    })
}

/// Zeropoint estimate used when the linear fit fails: the median of the
/// 3σ-clipped Δm distribution and its standard deviation.
pub fn median_zeropoint(deltas: &[f64]) -> Option<(f64, f64)> {
    let finite: Vec<f64> = deltas.iter().copied().filter(|d| d.is_finite()).collect();
    let clipped = stats::reject_outliers(&finite, 3.0);
    Some((stats::median(&clipped)?, stats::std_dev(&clipped)?))
}

#[cfg(test)]
#[path = "robust_fit_tests.rs"]
mod robust_fit_tests;
