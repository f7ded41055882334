use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

crate::define_key_type!(TelescopeId);
crate::define_key_type!(TelescopeClass);

impl TelescopeId {
    /// `site-dome-telescope`, e.g. `lsc-doma-1m0a`.
    pub fn from_parts(site: &str, dome: &str, telescope: &str) -> Self {
        TelescopeId(format!("{}-{}-{}", site, dome, telescope))
    }

    pub fn site(&self) -> &str {
        self.0.split('-').next().unwrap_or("")
    }

    /// Aperture class, the first three characters of the telescope part
    /// (`1m0a` → `1m0`).
    pub fn class(&self) -> TelescopeClass {
        let telescope = self.0.rsplit('-').next().unwrap_or("");
        TelescopeClass(telescope.chars().take(3).collect())
    }
}

impl TelescopeClass {
    pub fn is_small_aperture(&self) -> bool {
        self.0 == "0m4"
    }
}

/// One night of the smoothed throughput envelope.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrendPoint {
    /// Start of the night (12:00 UTC split).
    pub night: DateTime<Utc>,
    pub value: f64,
}

impl TrendPoint {
    pub fn new(night: DateTime<Utc>, value: f64) -> Self {
        Self { night, value }
    }
}

/// A stored trend with its owning telescope and filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendModel {
    pub telescope: TelescopeId,
    pub filter: String,
    pub points: Vec<TrendPoint>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaintenanceKind {
    MirrorWash,
    MirrorReplacement,
    InstrumentChange,
}

/// A known maintenance date that bounds throughput segments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaintenanceEvent {
    pub telescope: TelescopeId,
    pub at: DateTime<Utc>,
    #[serde(default = "default_maintenance_kind")]
    pub kind: MaintenanceKind,
}

fn default_maintenance_kind() -> MaintenanceKind {
    MaintenanceKind::MirrorReplacement
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentStatus {
    Fitted,
    /// Too few points or no date spread; slope forced to zero.
    Degraded,
}

/// Linear throughput decay between two maintenance boundaries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendSegment {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub points: usize,
    /// mag/day
    pub slope: f64,
    /// mag/month (30 days)
    pub slope_per_month: f64,
    /// Value at the Unix epoch, in mag.
    pub intercept: f64,
    pub status: SegmentStatus,
}

impl TrendSegment {
    /// Model value at `t`.
    pub fn value_at(&self, t: DateTime<Utc>) -> f64 {
        self.intercept + self.slope * super::time::days_since_epoch(t)
    }
}
