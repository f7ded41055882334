use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::TelescopeId;

crate::define_key_type!(ImageKey);

/// Whether the zeropoint came out of the robust fit or the median fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FitQuality {
    Fitted,
    Degraded,
}

impl FitQuality {
    pub fn as_str(&self) -> &'static str {
        match self {
            FitQuality::Fitted => "fitted",
            FitQuality::Degraded => "degraded",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "fitted" => Some(FitQuality::Fitted),
            "degraded" => Some(FitQuality::Degraded),
            _ => None,
        }
    }
}

/// Photometric calibration of one image. Keyed by `image`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationResult {
    pub image: ImageKey,
    pub observed_at: DateTime<Utc>,
    pub site: String,
    pub dome: String,
    pub telescope: String,
    pub camera: String,
    pub filter: String,
    pub airmass: f64,
    pub zeropoint: f64,
    pub color_term: f64,
    pub scatter: f64,
    pub matched_pairs: usize,
    pub quality: FitQuality,
}

impl CalibrationResult {
    pub fn telescope_id(&self) -> TelescopeId {
        TelescopeId::from_parts(&self.site, &self.dome, &self.telescope)
    }
}
