//! Throughput trends from stored calibrations.
//!
//! Calibrations of one telescope are corrected for camera gain and airmass,
//! reduced to a smoothed upper envelope per filter group and stored as a
//! whole. Segments and photometric-night reports are derived from the
//! stored trend.

use chrono::{DateTime, Utc};
use log::{debug, info, warn};

use crate::algorithms::{classify_nights, segment_trend, upper_envelope, NightReport, ZeropointSample};
use crate::config::PhotzpConfig;
use crate::context::PipelineContext;
use crate::db::{RecordQuery, RepositoryResult};
use crate::models::{CalibrationResult, TelescopeId, TrendPoint, TrendSegment};

/// Gain- and airmass-corrected zeropoints. Records with a non-finite
/// zeropoint or airmass, or from a filter the table does not know, are
/// dropped.
pub fn corrected_samples(records: &[CalibrationResult], config: &PhotzpConfig) -> Vec<ZeropointSample> {
    records
        .iter()
        .filter(|r| r.zeropoint.is_finite() && r.airmass.is_finite())
        .filter_map(|r| {
            let Some(filter) = config.filter(&r.filter) else {
                debug!("{}: no airmass term for filter {}", r.image, r.filter);
                return None;
            };
            let value = r.zeropoint
                + config.gain_offset(&r.camera, r.observed_at)
                + filter.airmass_term * (r.airmass - 1.0);
            Some(ZeropointSample {
                at: r.observed_at,
                value,
                scatter: r.scatter,
            })
        })
        .collect()
}

/// Smoothed upper envelope for `telescope` in `filter`'s group. Empty when
/// no night has enough good measurements.
pub fn compute_trend(
    records: &[CalibrationResult],
    telescope: &TelescopeId,
    filter: &str,
    config: &PhotzpConfig,
) -> Vec<TrendPoint> {
    let samples = corrected_samples(records, config);
    let policy = config.envelope_policy(telescope, filter);
    upper_envelope(&samples, &policy)
}

/// Every stored calibration of `telescope` in `filter`'s group.
pub async fn group_records(
    ctx: &PipelineContext,
    telescope: &TelescopeId,
    filter: &str,
) -> RepositoryResult<Vec<CalibrationResult>> {
    let query = RecordQuery::for_telescope(telescope.clone())
        .with_filters(ctx.config().group_members(filter));
    ctx.repo().query(&query).await
}

/// Recomputes the trend of `telescope` in `filter`'s group and replaces the
/// stored one. An empty trend leaves the store untouched.
pub async fn rebuild_trend(
    ctx: &PipelineContext,
    telescope: &TelescopeId,
    filter: &str,
) -> RepositoryResult<Vec<TrendPoint>> {
    let group = ctx.config().filter_group(filter).to_string();
    let records = group_records(ctx, telescope, filter).await?;
    let trend = compute_trend(&records, telescope, filter, ctx.config());

    if trend.is_empty() {
        warn!(
            "{} {}: no trend available from {} records",
            telescope,
            group,
            records.len()
        );
        return Ok(trend);
    }

    ctx.repo().write_trend(telescope, &group, &trend).await?;
    info!(
        "{} {}: stored {} trend points from {} records",
        telescope,
        group,
        trend.len(),
        records.len()
    );
    Ok(trend)
}

/// Splits the stored trend at the telescope's maintenance events.
pub async fn trend_segments(
    ctx: &PipelineContext,
    telescope: &TelescopeId,
    filter: &str,
    now: DateTime<Utc>,
) -> RepositoryResult<Vec<TrendSegment>> {
    let group = ctx.config().filter_group(filter);
    let trend = ctx.repo().read_trend(telescope, group).await?;
    let boundaries: Vec<DateTime<Utc>> = ctx
        .config()
        .events_for(telescope)
        .into_iter()
        .map(|e| e.at)
        .collect();
    Ok(segment_trend(&trend, &boundaries, now))
}

/// Classifies the nights covered by the stored calibrations against the
/// stored trend.
pub async fn photometric_nights(
    ctx: &PipelineContext,
    telescope: &TelescopeId,
    filter: &str,
) -> RepositoryResult<NightReport> {
    let config = ctx.config();
    let group = config.filter_group(filter);
    let trend = ctx.repo().read_trend(telescope, group).await?;
    let records = group_records(ctx, telescope, filter).await?;
    let samples = corrected_samples(&records, config);
    Ok(classify_nights(
        &samples,
        &trend,
        config.trend.photometric_threshold,
        config.trend.night_split_hour,
    ))
}

#[cfg(test)]
#[path = "trends_tests.rs"]
mod trends_tests;
