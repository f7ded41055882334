//! Median color term per telescope and filter.

use crate::algorithms::stats::median;
use crate::config::TrendSettings;
use crate::context::PipelineContext;
use crate::db::{RecordQuery, RepositoryResult};
use crate::models::{CalibrationResult, TelescopeId};

/// The two fields of a calibration the summary looks at.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorTermSample {
    pub color_term: f64,
    pub scatter: f64,
}

impl From<&CalibrationResult> for ColorTermSample {
    fn from(result: &CalibrationResult) -> Self {
        Self {
            color_term: result.color_term,
            scatter: result.scatter,
        }
    }
}

/// Median of the finite color terms with `|ct| < color_term_limit` from
/// fits with scatter below `color_term_max_scatter`. `None` if nothing
/// qualifies.
pub fn median_color_term(samples: &[ColorTermSample], settings: &TrendSettings) -> Option<f64> {
    let usable: Vec<f64> = samples
        .iter()
        .filter(|s| {
            s.color_term.is_finite()
                && s.color_term.abs() < settings.color_term_limit
                && s.scatter < settings.color_term_max_scatter
        })
        .map(|s| s.color_term)
        .collect();
    median(&usable)
}

/// [`median_color_term`] over every stored calibration of one telescope
/// and filter.
pub async fn stored_color_term(
    ctx: &PipelineContext,
    telescope: &TelescopeId,
    filter: &str,
) -> RepositoryResult<Option<f64>> {
    let query = RecordQuery::for_telescope(telescope.clone()).with_filters([filter]);
    let records = ctx.repo().query(&query).await?;
    let samples: Vec<ColorTermSample> = records.iter().map(ColorTermSample::from).collect();
    Ok(median_color_term(&samples, &ctx.config().trend))
}
