//! Per-image calibration pipeline.
//!
//! An image moves through `Received → Validated → CrossMatched → Fitted →
//! Recorded`. Any stage may end it with a [`Rejection`]; only a failing
//! record store is an `Err`.

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::algorithms::transforms::{ps1_to_sdss, sdss_to_johnson};
use crate::algorithms::{cross_match, fit, median_zeropoint, FitPolicy, LocatedDetection};
use crate::collaborators::{AperturePhotometry, ObservedImage, ReferenceCatalog};
use crate::config::PhotzpConfig;
use crate::context::PipelineContext;
use crate::db::RepositoryResult;
use crate::error::{CalibrationStage, Rejection, RejectionReason};
use crate::models::{CalibrationResult, Detection, FitQuality, ImageMetadata, MatchedPair, ReferenceStar};

/// Everything a plot producer needs to show how a calibration came about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationDiagnostics {
    pub pairs: Vec<MatchedPair>,
    /// Reference minus instrumental magnitude, per pair.
    pub deltas: Vec<f64>,
    /// Per pair; empty for a degraded fit.
    pub preselected: Vec<bool>,
    /// Per pair; empty for a degraded fit.
    pub inliers: Vec<bool>,
    /// (color term, zeropoint) of the preselection line, if one was fitted.
    pub first_pass: Option<(f64, f64)>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Calibration {
    pub result: CalibrationResult,
    pub diagnostics: CalibrationDiagnostics,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CalibrationOutcome {
    Calibrated(Calibration),
    Rejected(Rejection),
}

impl CalibrationOutcome {
    pub fn is_calibrated(&self) -> bool {
        matches!(self, CalibrationOutcome::Calibrated(_))
    }

    pub fn rejection(&self) -> Option<&Rejection> {
        match self {
            CalibrationOutcome::Rejected(r) => Some(r),
            CalibrationOutcome::Calibrated(_) => None,
        }
    }
}

/// Header gates, in order. Returns the detection catalog on success.
pub fn validate<'a>(
    metadata: &ImageMetadata,
    detections: Option<&'a [Detection]>,
    config: &PhotzpConfig,
) -> Result<&'a [Detection], RejectionReason> {
    if config.filter(&metadata.filter).is_none() {
        return Err(RejectionReason::UnsupportedFilter(metadata.filter.clone()));
    }
    let minimum = config.calibration.min_exposure();
    if metadata.exposure < minimum {
        return Err(RejectionReason::ExposureTooShort {
            actual: metadata.exposure.value(),
            minimum: minimum.value(),
        });
    }
    if metadata.is_defocused() {
        return Err(RejectionReason::DeliberateDefocus(
            metadata.focus_offset.unwrap_or_default(),
        ));
    }
    if !metadata.astrometry_ok {
        return Err(RejectionReason::BadAstrometry(
            "astrometric solution failed".to_string(),
        ));
    }
    detections.ok_or(RejectionReason::NoDetectionCatalog)
}

/// Projects every detection onto the sky. Any projection failure rejects
/// the image.
pub fn locate_detections(
    image: &dyn ObservedImage,
    detections: &[Detection],
) -> Result<Vec<LocatedDetection>, RejectionReason> {
    detections
        .iter()
        .map(|d| {
            image
                .pixel_to_sky(d.x, d.y)
                .map(|position| LocatedDetection {
                    detection: *d,
                    position,
                })
                .map_err(|e| RejectionReason::BadAstrometry(format!("{:#}", e)))
        })
        .collect()
}

/// Brings reference photometry into the SDSS and Johnson-Cousins systems
/// the filter table refers to.
pub fn prepare_reference_stars(stars: &mut [ReferenceStar], convert_ps1: bool) {
    for star in stars.iter_mut() {
        if convert_ps1 {
            ps1_to_sdss(star);
        }
        sdss_to_johnson(star);
    }
}

/// Cross-match and fit, the pure core of [`calibrate_image`].
///
/// Returns the stage reached alongside any rejection.
pub fn calibrate_matches(
    metadata: &ImageMetadata,
    located: &[LocatedDetection],
    catalog: &[ReferenceStar],
    config: &PhotzpConfig,
) -> Result<Calibration, (CalibrationStage, RejectionReason)> {
    let filter = config.filter(&metadata.filter).ok_or_else(|| {
        (
            CalibrationStage::Received,
            RejectionReason::UnsupportedFilter(metadata.filter.clone()),
        )
    })?;

    let pairs = cross_match(
        located,
        catalog,
        filter.reference,
        metadata.exposure,
        &config.calibration.match_policy(),
    )
    .map_err(|e| {
        (
            CalibrationStage::Validated,
            RejectionReason::InsufficientMatches {
                found: e.found,
                required: e.required,
            },
        )
    })?;

    let colors: Vec<f64> = pairs.iter().map(|p| p.reference_color).collect();
    let deltas: Vec<f64> = pairs.iter().map(MatchedPair::mag_difference).collect();

    let (zeropoint, color_term, scatter, quality, diagnostics) =
        match fit(&colors, &deltas, &FitPolicy::STANDARD) {
            Ok(line) => {
                debug!(
                    "{}: zp={:.4} ct={:.4} scatter={:.4}, {} of {} pairs rejected",
                    metadata.key,
                    line.zeropoint,
                    line.color_term,
                    line.scatter,
                    line.rejected(),
                    pairs.len()
                );
                let diagnostics = CalibrationDiagnostics {
                    pairs: Vec::new(),
                    deltas: Vec::new(),
                    preselected: line.preselected,
                    inliers: line.inliers,
                    first_pass: Some(line.first_pass),
                };
                (line.zeropoint, line.color_term, line.scatter, FitQuality::Fitted, diagnostics)
            }
            Err(err) if config.calibration.accept_degraded_fits => {
                let (zeropoint, scatter) = median_zeropoint(&deltas).ok_or_else(|| {
                    (
                        CalibrationStage::CrossMatched,
                        RejectionReason::FitDegenerate(err.to_string()),
                    )
                })?;
                warn!(
                    "{}: linear fit failed ({}), recording median zeropoint {:.4}",
                    metadata.key, err, zeropoint
                );
                let diagnostics = CalibrationDiagnostics {
                    pairs: Vec::new(),
                    deltas: Vec::new(),
                    preselected: Vec::new(),
                    inliers: Vec::new(),
                    first_pass: None,
                };
                (zeropoint, 0.0, scatter, FitQuality::Degraded, diagnostics)
            }
            Err(err) => {
                return Err((
                    CalibrationStage::CrossMatched,
                    RejectionReason::FitDegenerate(err.to_string()),
                ))
            }
        };

    let result = CalibrationResult {
        image: metadata.key.clone(),
        observed_at: metadata.observed_at,
        site: metadata.site.clone(),
        dome: metadata.dome.clone(),
        telescope: metadata.telescope.clone(),
        camera: metadata.camera.clone(),
        filter: metadata.filter.clone(),
        airmass: metadata.airmass,
        zeropoint,
        color_term,
        scatter,
        matched_pairs: pairs.len(),
        quality,
    };

    Ok(Calibration {
        result,
        diagnostics: CalibrationDiagnostics {
            pairs,
            deltas,
            ..diagnostics
        },
    })
}

/// Runs one image through the pipeline and records the result.
///
/// `photometry` re-measures fluxes when the configuration names an
/// aperture geometry.
pub async fn calibrate_image(
    ctx: &PipelineContext,
    image: &dyn ObservedImage,
    catalog: &dyn ReferenceCatalog,
    photometry: Option<&dyn AperturePhotometry>,
) -> RepositoryResult<CalibrationOutcome> {
    let metadata = image.metadata();
    let config = ctx.config();
    let reject = |stage: CalibrationStage, reason: RejectionReason| -> RepositoryResult<CalibrationOutcome> {
        info!("{}: rejected after {} stage: {}", metadata.key, stage, reason);
        Ok(CalibrationOutcome::Rejected(Rejection::new(
            metadata.key.clone(),
            stage,
            reason,
        )))
    };

    let detections = match validate(metadata, image.detections(), config) {
        Ok(d) => d,
        Err(reason) => return reject(CalibrationStage::Received, reason),
    };

    let mut detections = detections.to_vec();
    if let (Some(geometry), Some(photometry)) = (&config.calibration.aperture, photometry) {
        let positions: Vec<(f64, f64)> = detections.iter().map(|d| (d.x, d.y)).collect();
        match photometry.measure(image, &positions, geometry) {
            Ok(fluxes) if fluxes.len() == detections.len() => {
                for (detection, flux) in detections.iter_mut().zip(fluxes) {
                    detection.flux = flux;
                }
            }
            Ok(fluxes) => warn!(
                "{}: aperture photometry returned {} fluxes for {} positions, keeping catalog fluxes",
                metadata.key,
                fluxes.len(),
                detections.len()
            ),
            Err(e) => warn!(
                "{}: aperture photometry failed, keeping catalog fluxes: {:#}",
                metadata.key, e
            ),
        }
    }

    let located = match locate_detections(image, &detections) {
        Ok(l) => l,
        Err(reason) => return reject(CalibrationStage::Validated, reason),
    };

    let mut stars = match catalog
        .query_region(metadata.pointing, config.calibration.catalog_radius())
        .await
    {
        Ok(stars) if stars.is_empty() => {
            return reject(
                CalibrationStage::Validated,
                RejectionReason::ReferenceCatalogUnavailable("no reference stars in field".to_string()),
            )
        }
        Ok(stars) => stars,
        Err(e) => {
            return reject(
                CalibrationStage::Validated,
                RejectionReason::ReferenceCatalogUnavailable(format!("{:#}", e)),
            )
        }
    };
    prepare_reference_stars(&mut stars, config.calibration.convert_ps1);

    let calibration = match calibrate_matches(metadata, &located, &stars, config) {
        Ok(c) => c,
        Err((stage, reason)) => return reject(stage, reason),
    };

    ctx.repo().upsert(&calibration.result).await?;
    ctx.record_color_term(&calibration.result);
    info!(
        "{}: recorded zp={:.3} ct={:.4} ({:?}, {} pairs)",
        metadata.key,
        calibration.result.zeropoint,
        calibration.result.color_term,
        calibration.result.quality,
        calibration.result.matched_pairs
    );
    Ok(CalibrationOutcome::Calibrated(calibration))
}

#[cfg(test)]
#[path = "calibration_tests.rs"]
mod calibration_tests;
