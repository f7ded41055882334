//! Upper envelope of a zeropoint time series.
//!
//! The envelope tracks the best clear-sky throughput per night and smooths
//! it with a running median over the produced nights. Skipped nights are
//! not interpolated.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::stats;
use crate::models::{night_start, TrendPoint};

/// One airmass-corrected zeropoint measurement.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ZeropointSample {
    pub at: DateTime<Utc>,
    pub value: f64,
    pub scatter: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnvelopePolicy {
    /// Samples with scatter at or above this are ignored.
    pub noise_threshold: f64,
    /// Samples at or above this value are ignored.
    pub ceiling: Option<f64>,
    /// UTC hour at which one night ends and the next begins.
    pub night_split_hour: u32,
    /// Nights need strictly more qualifying samples than this.
    pub min_samples_per_night: usize,
    /// Samples within this distance of the night maximum are averaged.
    pub band: f64,
    /// Running median window, in nights.
    pub smoothing_window: usize,
}

impl Default for EnvelopePolicy {
    fn default() -> Self {
        Self {
            noise_threshold: 0.2,
            ceiling: None,
            night_split_hour: 12,
            min_samples_per_night: 3,
            band: 0.03,
            smoothing_window: 9,
        }
    }
}

impl EnvelopePolicy {
    fn qualifies(&self, sample: &ZeropointSample) -> bool {
        sample.value.is_finite()
            && sample.scatter.is_finite()
            && sample.scatter < self.noise_threshold
            && self.ceiling.map_or(true, |c| sample.value < c)
    }
}

/// Best value of one night: drop the single highest sample, then average
/// every remaining sample within `band` of the remaining maximum.
///
/// Returns `None` when the night has too few samples.
pub fn night_ceiling(values: &[f64], policy: &EnvelopePolicy) -> Option<f64> {
    if values.len() <= policy.min_samples_per_night {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    sorted.pop();
    let best = *sorted.last()?;
    let top: Vec<f64> = sorted
        .into_iter()
        .filter(|v| best - v <= policy.band)
        .collect();
    stats::mean(&top)
}

/// Per-night ceilings before smoothing, ordered by night.
pub fn nightly_ceilings(samples: &[ZeropointSample], policy: &EnvelopePolicy) -> Vec<TrendPoint> {
    let mut nights: BTreeMap<DateTime<Utc>, Vec<f64>> = BTreeMap::new();
    for sample in samples.iter().filter(|s| policy.qualifies(s)) {
        nights
            .entry(night_start(sample.at, policy.night_split_hour))
            .or_default()
            .push(sample.value);
    }

    nights
        .into_iter()
        .filter_map(|(night, values)| {
            night_ceiling(&values, policy).map(|value| TrendPoint::new(night, value))
        })
        .collect()
}

/// Smoothed upper envelope. Empty when no night qualifies.
pub fn upper_envelope(samples: &[ZeropointSample], policy: &EnvelopePolicy) -> Vec<TrendPoint> {
    let nightly = nightly_ceilings(samples, policy);
    let values: Vec<f64> = nightly.iter().map(|p| p.value).collect();
    let smoothed = stats::running_median(&values, policy.smoothing_window);
    nightly
        .into_iter()
        .zip(smoothed)
        .map(|(p, value)| TrendPoint::new(p.night, value))
        .collect()
}

#[cfg(test)]
#[path = "envelope_tests.rs"]
mod envelope_tests;
