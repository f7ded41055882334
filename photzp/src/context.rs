//! Shared state handed to every pipeline operation.

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::config::PhotzpConfig;
use crate::db::FullRepository;
use crate::models::{CalibrationResult, TelescopeId};
use crate::services::color_terms::{median_color_term, ColorTermSample};

/// Record store, configuration and the color terms gathered so far.
///
/// Cloning is cheap and clones share the store and the color-term
/// accumulator.
#[derive(Clone)]
pub struct PipelineContext {
    repo: Arc<dyn FullRepository>,
    config: Arc<PhotzpConfig>,
    color_terms: Arc<Mutex<BTreeMap<(TelescopeId, String), Vec<ColorTermSample>>>>,
}

impl PipelineContext {
    pub fn new(repo: Arc<dyn FullRepository>, config: PhotzpConfig) -> Self {
        Self {
            repo,
            config: Arc::new(config),
            color_terms: Arc::new(Mutex::new(BTreeMap::new())),
        }
    }

    pub fn repo(&self) -> &dyn FullRepository {
        self.repo.as_ref()
    }

    pub fn config(&self) -> &PhotzpConfig {
        &self.config
    }

    /// Adds the color term of a fresh calibration to the running summary.
    pub fn record_color_term(&self, result: &CalibrationResult) {
        self.color_terms
            .lock()
            .entry((result.telescope_id(), result.filter.clone()))
            .or_default()
            .push(ColorTermSample::from(result));
    }

    /// Median color term of the low-noise calibrations recorded for one
    /// telescope and filter.
    pub fn color_term(&self, telescope: &TelescopeId, filter: &str) -> Option<f64> {
        let terms = self.color_terms.lock();
        let samples = terms.get(&(telescope.clone(), filter.to_string()))?;
        median_color_term(samples, &self.config.trend)
    }

    /// Every telescope and filter with a usable color term.
    pub fn color_term_summary(&self) -> Vec<(TelescopeId, String, f64)> {
        let terms = self.color_terms.lock();
        terms
            .iter()
            .filter_map(|((telescope, filter), samples)| {
                median_color_term(samples, &self.config.trend)
                    .map(|ct| (telescope.clone(), filter.clone(), ct))
            })
            .collect()
    }
}
