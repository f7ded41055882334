//! Cross-match of image detections against a reference catalog.
//!
//! Each detection is paired with its angularly nearest reference star
//! (detection → reference only). The mapping is not injective: two
//! detections may claim the same reference star. Quality cuts are applied
//! after matching and failing pairs are dropped.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::models::{angle_from_chord, Detection, MatchedPair, ReferenceBand, ReferenceStar, SkyPosition};

/// A detection with its projected sky position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocatedDetection {
    pub detection: Detection,
    pub position: SkyPosition,
}

/// Cut values applied to matched pairs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MatchPolicy {
    /// Pairs at or beyond this separation are discarded.
    pub max_separation: qtty::Arcseconds,
    /// Reference magnitudes at or above this are unreliable.
    pub faint_limit: f64,
    /// Images with fewer surviving pairs are rejected.
    pub min_pairs: usize,
}

impl Default for MatchPolicy {
    fn default() -> Self {
        Self {
            max_separation: qtty::Arcseconds::new(5.0),
            faint_limit: 26.0,
            min_pairs: 10,
        }
    }
}

/// Too few pairs survived the quality cuts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("only {found} matched pairs, {required} required")]
pub struct InsufficientMatches {
    pub found: usize,
    pub required: usize,
}

/// Reference star unit vectors ordered by declination for windowed search.
struct DecIndex {
    vectors: Vec<[f64; 3]>,
    order: Vec<usize>,
    sorted_dec: Vec<f64>,
}

impl DecIndex {
    fn build(catalog: &[ReferenceStar]) -> Self {
        let vectors: Vec<[f64; 3]> = catalog.iter().map(|s| s.position.to_unit_vector()).collect();
        let mut order: Vec<usize> = (0..catalog.len()).collect();
        order.sort_by(|&a, &b| {
            catalog[a]
                .position
                .dec
                .value()
                .partial_cmp(&catalog[b].position.dec.value())
                .unwrap_or(Ordering::Equal)
                .then(a.cmp(&b))
        });
        let sorted_dec = order.iter().map(|&i| catalog[i].position.dec.value()).collect();
        Self {
            vectors,
            order,
            sorted_dec,
        }
    }

    /// Nearest reference star within `radius_deg` of declination, as
    /// (catalog index, chord distance). Ties go to the lower catalog index.
    fn nearest(&self, position: &SkyPosition, radius_deg: f64) -> Option<(usize, f64)> {
        let dec = position.dec.value();
        let lo = self.sorted_dec.partition_point(|d| *d < dec - radius_deg);
        let hi = self.sorted_dec.partition_point(|d| *d <= dec + radius_deg);
        let v = position.to_unit_vector();

        let mut best: Option<(usize, f64)> = None;
        for &idx in &self.order[lo..hi] {
            let r = &self.vectors[idx];
            let d2 = (v[0] - r[0]).powi(2) + (v[1] - r[1]).powi(2) + (v[2] - r[2]).powi(2);
            best = match best {
                Some((bi, bd)) if bd < d2 || (bd == d2 && bi < idx) => Some((bi, bd)),
                _ => Some((idx, d2)),
            };
        }
        best.map(|(i, d2)| (i, d2.sqrt()))
    }
}

/// Pairs every detection with its nearest reference star and applies the
/// quality cuts. Output order follows detection order.
pub fn match_catalog(
    detections: &[LocatedDetection],
    catalog: &[ReferenceStar],
    band: ReferenceBand,
    exposure: qtty::Seconds,
    policy: &MatchPolicy,
) -> Vec<MatchedPair> {
    let index = DecIndex::build(catalog);
    let max_sep = policy.max_separation.value();
    let radius_deg = policy.max_separation.to::<qtty::Degree>().value();

    let mut pairs = Vec::new();
    for (det_idx, located) in detections.iter().enumerate() {
        let Some((ref_idx, chord)) = index.nearest(&located.position, radius_deg) else {
            continue;
        };
        let separation = qtty::Degrees::new(angle_from_chord(chord).to_degrees()).to::<qtty::Arcsecond>();
        if separation.value() >= max_sep || located.detection.flux <= 0.0 {
            continue;
        }

        let star = &catalog[ref_idx];
        let Some(reference_mag) = star.mag(band) else {
            continue;
        };
        if !reference_mag.is_finite() || reference_mag <= 0.0 || reference_mag >= policy.faint_limit {
            continue;
        }
        let Some(reference_color) = star.color_gi().filter(|c| c.is_finite()) else {
            continue;
        };

        pairs.push(MatchedPair {
            detection_index: det_idx,
            reference_index: ref_idx,
            x: located.detection.x,
            y: located.detection.y,
            flux: located.detection.flux,
            position: star.position,
            instrumental_mag: located.detection.instrumental_mag(exposure),
            reference_mag,
            reference_color,
            separation,
        });
    }
    pairs
}

/// [`match_catalog`] followed by the minimum pair count check.
pub fn cross_match(
    detections: &[LocatedDetection],
    catalog: &[ReferenceStar],
    band: ReferenceBand,
    exposure: qtty::Seconds,
    policy: &MatchPolicy,
) -> Result<Vec<MatchedPair>, InsufficientMatches> {
    let pairs = match_catalog(detections, catalog, band, exposure, policy);
    if pairs.len() < policy.min_pairs {
        return Err(InsufficientMatches {
            found: pairs.len(),
            required: policy.min_pairs,
        });
    }
    Ok(pairs)
}

#[cfg(test)]
#[path = "crossmatch_tests.rs"]
mod crossmatch_tests;
