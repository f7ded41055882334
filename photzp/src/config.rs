//! Pipeline configuration.
//!
//! Settings are read from a TOML file with the sections `[calibration]`,
//! `[trend]`, `[filters.*]`, `[reference_throughput.*]`,
//! `[[gain_corrections]]` and `[[maintenance_events]]`. The network's
//! defaults are bundled with the crate (see [`PhotzpConfig::bundled`]).

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::algorithms::{EnvelopePolicy, MatchPolicy};
use crate::collaborators::ApertureGeometry;
use crate::models::{MaintenanceEvent, ReferenceBand, TelescopeClass, TelescopeId};

const BUNDLED: &str = include_str!("../config/photzp.toml");

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhotzpConfig {
    #[serde(default)]
    pub calibration: CalibrationSettings,
    #[serde(default)]
    pub trend: TrendSettings,
    #[serde(default)]
    pub filters: BTreeMap<String, FilterSettings>,
    /// filter group -> telescope class -> nominal zeropoint
    #[serde(default)]
    pub reference_throughput: BTreeMap<String, BTreeMap<String, f64>>,
    #[serde(default)]
    pub gain_corrections: Vec<GainCorrection>,
    #[serde(default)]
    pub maintenance_events: Vec<MaintenanceEvent>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalibrationSettings {
    /// Seconds.
    #[serde(default = "default_min_exposure")]
    pub min_exposure: f64,
    /// Degrees.
    #[serde(default = "default_catalog_radius")]
    pub catalog_radius: f64,
    /// Arcseconds.
    #[serde(default = "default_max_separation")]
    pub max_separation: f64,
    #[serde(default = "default_faint_limit")]
    pub faint_limit: f64,
    #[serde(default = "default_min_pairs")]
    pub min_pairs: usize,
    /// Record a median zeropoint when the linear fit fails instead of
    /// rejecting the image.
    #[serde(default = "default_true")]
    pub accept_degraded_fits: bool,
    /// Convert PS1 reference photometry to SDSS before matching.
    #[serde(default = "default_true")]
    pub convert_ps1: bool,
    /// Redo aperture photometry with this geometry when set.
    #[serde(default)]
    pub aperture: Option<ApertureGeometry>,
}

fn default_min_exposure() -> f64 {
    60.0
}

fn default_catalog_radius() -> f64 {
    0.25
}

fn default_max_separation() -> f64 {
    5.0
}

fn default_faint_limit() -> f64 {
    26.0
}

fn default_min_pairs() -> usize {
    10
}

fn default_true() -> bool {
    true
}

impl Default for CalibrationSettings {
    fn default() -> Self {
        Self {
            min_exposure: default_min_exposure(),
            catalog_radius: default_catalog_radius(),
            max_separation: default_max_separation(),
            faint_limit: default_faint_limit(),
            min_pairs: default_min_pairs(),
            accept_degraded_fits: true,
            convert_ps1: true,
            aperture: None,
        }
    }
}

impl CalibrationSettings {
    pub fn min_exposure(&self) -> qtty::Seconds {
        qtty::Seconds::new(self.min_exposure)
    }

    pub fn catalog_radius(&self) -> qtty::Degrees {
        qtty::Degrees::new(self.catalog_radius)
    }

    pub fn match_policy(&self) -> MatchPolicy {
        MatchPolicy {
            max_separation: qtty::Arcseconds::new(self.max_separation),
            faint_limit: self.faint_limit,
            min_pairs: self.min_pairs,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrendSettings {
    #[serde(default = "default_night_split_hour")]
    pub night_split_hour: u32,
    #[serde(default = "default_noise_threshold")]
    pub noise_threshold: f64,
    #[serde(default = "default_small_aperture_noise_threshold")]
    pub small_aperture_noise_threshold: f64,
    /// Added to the reference throughput to form the envelope ceiling.
    #[serde(default = "default_ceiling_margin")]
    pub ceiling_margin: f64,
    #[serde(default = "default_ceiling")]
    pub default_ceiling: f64,
    #[serde(default = "default_small_aperture_ceiling")]
    pub small_aperture_default_ceiling: f64,
    #[serde(default = "default_envelope_band")]
    pub envelope_band: f64,
    #[serde(default = "default_min_samples_per_night")]
    pub min_samples_per_night: usize,
    #[serde(default = "default_smoothing_window")]
    pub smoothing_window: usize,
    #[serde(default = "default_photometric_threshold")]
    pub photometric_threshold: f64,
    #[serde(default = "default_color_term_limit")]
    pub color_term_limit: f64,
    #[serde(default = "default_color_term_max_scatter")]
    pub color_term_max_scatter: f64,
}

fn default_night_split_hour() -> u32 {
    12
}

fn default_noise_threshold() -> f64 {
    0.2
}

fn default_small_aperture_noise_threshold() -> f64 {
    0.5
}

fn default_ceiling_margin() -> f64 {
    1.0
}

fn default_ceiling() -> f64 {
    25.5
}

fn default_small_aperture_ceiling() -> f64 {
    22.5
}

fn default_envelope_band() -> f64 {
    0.03
}

fn default_min_samples_per_night() -> usize {
    3
}

fn default_smoothing_window() -> usize {
    9
}

fn default_photometric_threshold() -> f64 {
    -0.15
}

fn default_color_term_limit() -> f64 {
    0.3
}

fn default_color_term_max_scatter() -> f64 {
    0.2
}

impl Default for TrendSettings {
    fn default() -> Self {
        Self {
            night_split_hour: default_night_split_hour(),
            noise_threshold: default_noise_threshold(),
            small_aperture_noise_threshold: default_small_aperture_noise_threshold(),
            ceiling_margin: default_ceiling_margin(),
            default_ceiling: default_ceiling(),
            small_aperture_default_ceiling: default_small_aperture_ceiling(),
            envelope_band: default_envelope_band(),
            min_samples_per_night: default_min_samples_per_night(),
            smoothing_window: default_smoothing_window(),
            photometric_threshold: default_photometric_threshold(),
            color_term_limit: default_color_term_limit(),
            color_term_max_scatter: default_color_term_max_scatter(),
        }
    }
}

/// How an instrument filter is calibrated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterSettings {
    pub reference: ReferenceBand,
    /// Extinction coefficient, mag per airmass.
    pub airmass_term: f64,
    /// Filters sharing a group are trended together (`zs` with `zp`).
    #[serde(default)]
    pub group: Option<String>,
}

/// Zeropoint offset for a camera whose configured gain was wrong.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GainCorrection {
    pub camera: String,
    /// Exclusive lower bound.
    #[serde(default)]
    pub since: Option<DateTime<Utc>>,
    /// Exclusive upper bound.
    #[serde(default)]
    pub until: Option<DateTime<Utc>>,
    pub measured_gain: f64,
    pub configured_gain: f64,
}

impl GainCorrection {
    pub fn applies(&self, camera: &str, at: DateTime<Utc>) -> bool {
        self.camera == camera
            && self.since.map_or(true, |s| at > s)
            && self.until.map_or(true, |u| at < u)
    }

    /// Added to a zeropoint measured with the configured gain.
    pub fn offset(&self) -> f64 {
        -2.5 * (self.measured_gain / self.configured_gain).log10()
    }
}

impl Default for PhotzpConfig {
    fn default() -> Self {
        Self {
            calibration: CalibrationSettings::default(),
            trend: TrendSettings::default(),
            filters: BTreeMap::new(),
            reference_throughput: BTreeMap::new(),
            gain_corrections: Vec::new(),
            maintenance_events: Vec::new(),
        }
    }
}

impl PhotzpConfig {
    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: PhotzpConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// The network configuration shipped with the crate.
    pub fn bundled() -> Result<Self, ConfigError> {
        Self::from_toml_str(BUNDLED)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.trend.smoothing_window == 0 || self.trend.smoothing_window % 2 == 0 {
            return Err(ConfigError::Invalid(format!(
                "trend.smoothing_window must be odd, got {}",
                self.trend.smoothing_window
            )));
        }
        if self.trend.night_split_hour > 23 {
            return Err(ConfigError::Invalid(format!(
                "trend.night_split_hour must be 0..=23, got {}",
                self.trend.night_split_hour
            )));
        }
        if self.calibration.min_pairs < 2 {
            return Err(ConfigError::Invalid(
                "calibration.min_pairs must be at least 2".to_string(),
            ));
        }
        for gc in &self.gain_corrections {
            if gc.measured_gain <= 0.0 || gc.configured_gain <= 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "gain correction for {} needs positive gains",
                    gc.camera
                )));
            }
        }
        Ok(())
    }

    pub fn filter(&self, name: &str) -> Option<&FilterSettings> {
        self.filters.get(name)
    }

    /// Trend group of a filter; ungrouped filters are their own group.
    pub fn filter_group<'a>(&'a self, name: &'a str) -> &'a str {
        self.filters
            .get(name)
            .and_then(|f| f.group.as_deref())
            .unwrap_or(name)
    }

    /// All filters trended together with `name`, including itself.
    pub fn group_members(&self, name: &str) -> Vec<String> {
        let group = self.filter_group(name).to_string();
        let mut members: Vec<String> = self
            .filters
            .keys()
            .filter(|f| self.filter_group(f) == group)
            .cloned()
            .collect();
        if !members.iter().any(|m| m == name) {
            members.push(name.to_string());
        }
        members
    }

    /// Sum of the gain-correction offsets that apply to one measurement.
    pub fn gain_offset(&self, camera: &str, at: DateTime<Utc>) -> f64 {
        self.gain_corrections
            .iter()
            .filter(|g| g.applies(camera, at))
            .map(GainCorrection::offset)
            .sum()
    }

    pub fn reference_throughput(&self, filter: &str, class: &TelescopeClass) -> Option<f64> {
        self.reference_throughput
            .get(self.filter_group(filter))
            .and_then(|by_class| by_class.get(class.as_str()))
            .copied()
    }

    /// Envelope settings for one telescope and filter.
    pub fn envelope_policy(&self, telescope: &TelescopeId, filter: &str) -> EnvelopePolicy {
        let class = telescope.class();
        let small = class.is_small_aperture();
        let ceiling = self
            .reference_throughput(filter, &class)
            .map(|r| r + self.trend.ceiling_margin)
            .unwrap_or(if small {
                self.trend.small_aperture_default_ceiling
            } else {
                self.trend.default_ceiling
            });
        EnvelopePolicy {
            noise_threshold: if small {
                self.trend.small_aperture_noise_threshold
            } else {
                self.trend.noise_threshold
            },
            ceiling: Some(ceiling),
            night_split_hour: self.trend.night_split_hour,
            min_samples_per_night: self.trend.min_samples_per_night,
            band: self.trend.envelope_band,
            smoothing_window: self.trend.smoothing_window,
        }
    }

    /// Maintenance events of one telescope, in time order.
    pub fn events_for(&self, telescope: &TelescopeId) -> Vec<MaintenanceEvent> {
        let mut events: Vec<MaintenanceEvent> = self
            .maintenance_events
            .iter()
            .filter(|e| &e.telescope == telescope)
            .cloned()
            .collect();
        events.sort_by_key(|e| e.at);
        events
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod config_tests;
