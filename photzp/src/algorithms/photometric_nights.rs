//! Photometric-night classification against a throughput model.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::envelope::ZeropointSample;
use crate::models::{days_since_epoch, night_start, TrendPoint};

/// Detrended values at or below this mark a non-photometric night.
pub const DEFAULT_PHOTOMETRIC_THRESHOLD: f64 = -0.15;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NightClass {
    Photometric,
    NonPhotometric,
    /// No measurement that night.
    Unclassified,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NightReport {
    pub nights: Vec<(DateTime<Utc>, NightClass)>,
    pub photometric: usize,
    pub non_photometric: usize,
    pub unclassified: usize,
}

impl NightReport {
    /// Fraction of nights with data that were photometric.
    pub fn photometric_fraction(&self) -> Option<f64> {
        let observed = self.photometric + self.non_photometric;
        (observed > 0).then(|| self.photometric as f64 / observed as f64)
    }
}

/// Linear interpolation of the model at `t`, clamped to the end values.
pub fn interpolate(model: &[TrendPoint], t: DateTime<Utc>) -> Option<f64> {
    let first = model.first()?;
    let last = model.last()?;
    if t <= first.night {
        return Some(first.value);
    }
    if t >= last.night {
        return Some(last.value);
    }
    let idx = model.partition_point(|p| p.night <= t);
    let (a, b) = (&model[idx - 1], &model[idx]);
    let span = days_since_epoch(b.night) - days_since_epoch(a.night);
    if span <= 0.0 {
        return Some(a.value);
    }
    let frac = (days_since_epoch(t) - days_since_epoch(a.night)) / span;
    Some(a.value + frac * (b.value - a.value))
}

/// Measurement minus the model at its timestamp. Empty without a model.
pub fn detrend(samples: &[ZeropointSample], model: &[TrendPoint]) -> Vec<(DateTime<Utc>, f64)> {
    samples
        .iter()
        .filter_map(|s| interpolate(model, s.at).map(|m| (s.at, s.value - m)))
        .collect()
}

/// Classifies every night between the first and the last measurement.
pub fn classify_nights(
    samples: &[ZeropointSample],
    model: &[TrendPoint],
    threshold: f64,
    split_hour: u32,
) -> NightReport {
    let mut by_night: BTreeMap<DateTime<Utc>, Vec<f64>> = BTreeMap::new();
    for (at, residual) in detrend(samples, model) {
        by_night.entry(night_start(at, split_hour)).or_default().push(residual);
    }

    let mut report = NightReport {
        nights: Vec::new(),
        photometric: 0,
        non_photometric: 0,
        unclassified: 0,
    };
    let (Some(first), Some(last)) = (
        by_night.keys().next().copied(),
        by_night.keys().next_back().copied(),
    ) else {
        return report;
    };

    let mut night = first;
    while night <= last {
        let class = match by_night.get(&night) {
            Some(values) if values.iter().all(|v| *v > threshold) => NightClass::Photometric,
            Some(_) => NightClass::NonPhotometric,
            None => NightClass::Unclassified,
        };
        match class {
            NightClass::Photometric => report.photometric += 1,
            NightClass::NonPhotometric => report.non_photometric += 1,
            NightClass::Unclassified => report.unclassified += 1,
        }
        report.nights.push((night, class));
        night += Duration::days(1);
    }
    report
}
