//! Per-image rejection reasons.
//!
//! A rejection ends processing of one image only; the batch continues.
//! Storage failures are [`crate::db::RepositoryError`] and abort the batch.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::models::ImageKey;

/// Stage at which an image left the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalibrationStage {
    Received,
    Validated,
    CrossMatched,
    Fitted,
    Recorded,
}

impl fmt::Display for CalibrationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CalibrationStage::Received => "received",
            CalibrationStage::Validated => "validated",
            CalibrationStage::CrossMatched => "cross-matched",
            CalibrationStage::Fitted => "fitted",
            CalibrationStage::Recorded => "recorded",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error, Serialize, Deserialize)]
pub enum RejectionReason {
    #[error("filter {0} is not supported")]
    UnsupportedFilter(String),
    #[error("exposure time {actual}s is below the minimum of {minimum}s")]
    ExposureTooShort { actual: f64, minimum: f64 },
    #[error("image is deliberately defocused by {0}")]
    DeliberateDefocus(f64),
    #[error("bad astrometry: {0}")]
    BadAstrometry(String),
    #[error("image has no detection catalog")]
    NoDetectionCatalog,
    #[error("reference catalog unavailable: {0}")]
    ReferenceCatalogUnavailable(String),
    #[error("only {found} matched pairs, {required} required")]
    InsufficientMatches { found: usize, required: usize },
    #[error("zeropoint fit failed: {0}")]
    FitDegenerate(String),
    #[error("image could not be opened: {0}")]
    ImageUnavailable(String),
}

impl RejectionReason {
    /// Stable short name, used for counting.
    pub fn kind(&self) -> &'static str {
        match self {
            RejectionReason::UnsupportedFilter(_) => "unsupported_filter",
            RejectionReason::ExposureTooShort { .. } => "exposure_too_short",
            RejectionReason::DeliberateDefocus(_) => "deliberate_defocus",
            RejectionReason::BadAstrometry(_) => "bad_astrometry",
            RejectionReason::NoDetectionCatalog => "no_detection_catalog",
            RejectionReason::ReferenceCatalogUnavailable(_) => "reference_catalog_unavailable",
            RejectionReason::InsufficientMatches { .. } => "insufficient_matches",
            RejectionReason::FitDegenerate(_) => "fit_degenerate",
            RejectionReason::ImageUnavailable(_) => "image_unavailable",
        }
    }
}

/// An image that could not be calibrated.
#[derive(Debug, Clone, PartialEq, thiserror::Error, Serialize, Deserialize)]
#[error("{image} rejected after {stage}: {reason}")]
pub struct Rejection {
    pub image: ImageKey,
    /// Last stage the image completed.
    pub stage: CalibrationStage,
    pub reason: RejectionReason,
}

impl Rejection {
    pub fn new(image: ImageKey, stage: CalibrationStage, reason: RejectionReason) -> Self {
        Self {
            image,
            stage,
            reason,
        }
    }
}
