use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ImageKey, SkyPosition, TelescopeId};

/// Header-level facts about one image, as reported by the image collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageMetadata {
    pub key: ImageKey,
    pub filter: String,
    pub exposure: qtty::Seconds,
    pub airmass: f64,
    pub observed_at: DateTime<Utc>,
    pub site: String,
    /// Enclosure identifier, e.g. `doma`.
    pub dome: String,
    /// Telescope identifier within the enclosure, e.g. `1m0a`.
    pub telescope: String,
    pub camera: String,
    /// Focus offset in mm; `None` when the header does not carry one.
    pub focus_offset: Option<f64>,
    /// Whether the astrometric solution succeeded.
    pub astrometry_ok: bool,
    pub pointing: SkyPosition,
}

impl ImageMetadata {
    pub fn telescope_id(&self) -> TelescopeId {
        TelescopeId::from_parts(&self.site, &self.dome, &self.telescope)
    }

    pub fn is_defocused(&self) -> bool {
        self.focus_offset.map(|f| f != 0.0).unwrap_or(false)
    }
}
