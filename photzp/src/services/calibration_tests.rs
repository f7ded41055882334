use super::*;
use crate::collaborators::ApertureGeometry;
use crate::db::{CalibrationRepository, LocalRepository, RecordQuery};
use crate::models::{ImageKey, ReferenceBand, SkyPosition};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use std::sync::Arc;

const ZP: f64 = 23.1;
const CT: f64 = -0.008;
const EXPOSURE: f64 = 100.0;

/// Pixel coordinates are taken as (ra, dec) in degrees.
struct IdentityImage {
    metadata: ImageMetadata,
    detections: Option<Vec<Detection>>,
    wcs_ok: bool,
}

impl ObservedImage for IdentityImage {
    fn metadata(&self) -> &ImageMetadata {
        &self.metadata
    }

    fn detections(&self) -> Option<&[Detection]> {
        self.detections.as_deref()
    }

    fn pixel_to_sky(&self, x: f64, y: f64) -> anyhow::Result<SkyPosition> {
        if !self.wcs_ok {
            anyhow::bail!("pixel ({x}, {y}) outside the WCS domain");
        }
        Ok(SkyPosition::new(x, y))
    }
}

struct StaticCatalog(Vec<ReferenceStar>);

#[async_trait]
impl ReferenceCatalog for StaticCatalog {
    async fn query_region(
        &self,
        _center: SkyPosition,
        _radius: qtty::Degrees,
    ) -> anyhow::Result<Vec<ReferenceStar>> {
        Ok(self.0.clone())
    }
}

struct FailingCatalog;

#[async_trait]
impl ReferenceCatalog for FailingCatalog {
    async fn query_region(
        &self,
        _center: SkyPosition,
        _radius: qtty::Degrees,
    ) -> anyhow::Result<Vec<ReferenceStar>> {
        anyhow::bail!("catalog service timed out")
    }
}

fn metadata() -> ImageMetadata {
    ImageMetadata {
        key: ImageKey::new("lsc1m005-fa15-20190301-0100-e91.fits.fz"),
        filter: "gp".to_string(),
        exposure: qtty::Seconds::new(EXPOSURE),
        airmass: 1.1,
        observed_at: Utc.with_ymd_and_hms(2019, 3, 2, 3, 0, 0).unwrap(),
        site: "lsc".to_string(),
        dome: "doma".to_string(),
        telescope: "1m0a".to_string(),
        camera: "fa15".to_string(),
        focus_offset: None,
        astrometry_ok: true,
        pointing: SkyPosition::new(150.0, -30.0),
    }
}

/// `n` stars on a noise-free `Δm = CT·(g−i) + ZP` line, each with a
/// detection at its exact position.
fn field(n: usize, spread_colors: bool) -> (Vec<Detection>, Vec<ReferenceStar>) {
    let mut detections = Vec::new();
    let mut stars = Vec::new();
    for k in 0..n {
        let ra = 150.0 + 0.002 * k as f64;
        let dec = -30.0;
        let color = if spread_colors { 0.3 + 0.1 * k as f64 } else { 1.0 };
        let g = 15.0 + 0.2 * k as f64;
        stars.push(
            ReferenceStar::new(SkyPosition::new(ra, dec))
                .with_band(ReferenceBand::SdssG, g, 0.01)
                .with_band(ReferenceBand::SdssI, g - color, 0.01),
        );
        let instrumental = g - (CT * color + ZP);
        let flux = EXPOSURE * 10f64.powf(-0.4 * instrumental);
        detections.push(Detection::new(ra, dec, flux));
    }
    (detections, stars)
}

fn located(detections: &[Detection]) -> Vec<LocatedDetection> {
    detections
        .iter()
        .map(|d| LocatedDetection {
            detection: *d,
            position: SkyPosition::new(d.x, d.y),
        })
        .collect()
}

fn config() -> PhotzpConfig {
    PhotzpConfig::bundled().unwrap()
}

#[test]
fn test_validation_order() {
    let config = config();
    let (detections, _) = field(12, true);

    let mut md = metadata();
    md.filter = "Hα".to_string();
    md.exposure = qtty::Seconds::new(5.0);
    assert!(matches!(
        validate(&md, Some(detections.as_slice()), &config),
        Err(RejectionReason::UnsupportedFilter(_))
    ));

    let mut md = metadata();
    md.exposure = qtty::Seconds::new(30.0);
    md.focus_offset = Some(2.0);
    assert_eq!(
        validate(&md, Some(detections.as_slice()), &config),
        Err(RejectionReason::ExposureTooShort {
            actual: 30.0,
            minimum: 60.0
        })
    );

    let mut md = metadata();
    md.focus_offset = Some(2.0);
    md.astrometry_ok = false;
    assert_eq!(
        validate(&md, Some(detections.as_slice()), &config),
        Err(RejectionReason::DeliberateDefocus(2.0))
    );

    let mut md = metadata();
    md.astrometry_ok = false;
    assert!(matches!(
        validate(&md, None, &config),
        Err(RejectionReason::BadAstrometry(_))
    ));

    assert_eq!(
        validate(&metadata(), None, &config),
        Err(RejectionReason::NoDetectionCatalog)
    );
    assert_eq!(validate(&metadata(), Some(detections.as_slice()), &config).unwrap().len(), 12);
}

#[test]
fn test_zero_focus_offset_is_accepted() {
    let mut md = metadata();
    md.focus_offset = Some(0.0);
    assert!(validate(&md, Some(&[][..]), &config()).is_ok());
}

#[test]
fn test_noise_free_field_recovers_line() {
    let (detections, stars) = field(20, true);
    let calibration = calibrate_matches(&metadata(), &located(&detections), &stars, &config()).unwrap();

    let result = &calibration.result;
    assert_eq!(result.quality, FitQuality::Fitted);
    assert_eq!(result.matched_pairs, 20);
    assert!((result.zeropoint - ZP).abs() < 1e-9);
    assert!((result.color_term - CT).abs() < 1e-9);
    assert!(result.scatter < 1e-9);

    let diagnostics = &calibration.diagnostics;
    assert_eq!(diagnostics.pairs.len(), 20);
    assert_eq!(diagnostics.deltas.len(), 20);
    assert!(diagnostics.inliers.iter().all(|k| *k));
    assert!(diagnostics.first_pass.is_some());
}

#[test]
fn test_nine_pairs_rejected_ten_accepted() {
    let config = config();
    let (detections, stars) = field(9, true);
    let err = calibrate_matches(&metadata(), &located(&detections), &stars, &config).unwrap_err();
    assert_eq!(
        err,
        (
            CalibrationStage::Validated,
            RejectionReason::InsufficientMatches {
                found: 9,
                required: 10
            }
        )
    );

    let (detections, stars) = field(10, true);
    assert!(calibrate_matches(&metadata(), &located(&detections), &stars, &config).is_ok());
}

#[test]
fn test_degenerate_colors_fall_back_to_median() {
    let (detections, stars) = field(15, false);
    let calibration = calibrate_matches(&metadata(), &located(&detections), &stars, &config()).unwrap();
    assert_eq!(calibration.result.quality, FitQuality::Degraded);
    assert_eq!(calibration.result.color_term, 0.0);
    assert!((calibration.result.zeropoint - (CT + ZP)).abs() < 1e-9);
    assert!(calibration.diagnostics.inliers.is_empty());
    assert!(calibration.diagnostics.first_pass.is_none());
}

#[test]
fn test_degenerate_colors_rejected_when_degraded_fits_disabled() {
    let mut config = config();
    config.calibration.accept_degraded_fits = false;
    let (detections, stars) = field(15, false);
    let (stage, reason) = calibrate_matches(&metadata(), &located(&detections), &stars, &config).unwrap_err();
    assert_eq!(stage, CalibrationStage::CrossMatched);
    assert!(matches!(reason, RejectionReason::FitDegenerate(_)));
}

#[test]
fn test_prepare_reference_stars_adds_johnson_bands() {
    let (_, mut stars) = field(3, true);
    for star in stars.iter_mut() {
        star.set_band(ReferenceBand::SdssR, 14.8, 0.01);
    }
    prepare_reference_stars(&mut stars, false);
    assert!(stars.iter().all(|s| s.mag(ReferenceBand::JohnsonV).is_some()));
    assert_eq!(stars[0].mag(ReferenceBand::SdssG), Some(15.0));
}

fn context(repo: Arc<LocalRepository>) -> PipelineContext {
    let mut config = config();
    config.calibration.convert_ps1 = false;
    PipelineContext::new(repo, config)
}

#[tokio::test]
async fn test_calibrate_image_records_result() {
    let repo = Arc::new(LocalRepository::new());
    let ctx = context(repo.clone());
    let (detections, stars) = field(20, true);
    let image = IdentityImage {
        metadata: metadata(),
        detections: Some(detections),
        wcs_ok: true,
    };

    let outcome = calibrate_image(&ctx, &image, &StaticCatalog(stars), None).await.unwrap();
    assert!(outcome.is_calibrated());
    assert_eq!(repo.calibration_count(), 1);

    let stored = repo.query(&RecordQuery::default()).await.unwrap();
    assert!((stored[0].zeropoint - ZP).abs() < 1e-9);
    let color_term = ctx.color_term(&stored[0].telescope_id(), "gp").unwrap();
    assert!((color_term - CT).abs() < 1e-9);
}

#[tokio::test]
async fn test_short_exposure_rejected_before_catalog_lookup() {
    let repo = Arc::new(LocalRepository::new());
    let ctx = context(repo.clone());
    let mut md = metadata();
    md.exposure = qtty::Seconds::new(10.0);
    let image = IdentityImage {
        metadata: md,
        detections: Some(field(20, true).0),
        wcs_ok: true,
    };

    let outcome = calibrate_image(&ctx, &image, &FailingCatalog, None).await.unwrap();
    let rejection = outcome.rejection().unwrap();
    assert_eq!(rejection.stage, CalibrationStage::Received);
    assert_eq!(rejection.reason.kind(), "exposure_too_short");
    assert_eq!(repo.calibration_count(), 0);
}

#[tokio::test]
async fn test_catalog_and_wcs_failures() {
    let repo = Arc::new(LocalRepository::new());
    let ctx = context(repo.clone());
    let (detections, stars) = field(20, true);

    let image = IdentityImage {
        metadata: metadata(),
        detections: Some(detections.clone()),
        wcs_ok: true,
    };
    let outcome = calibrate_image(&ctx, &image, &FailingCatalog, None).await.unwrap();
    assert!(matches!(
        outcome.rejection().unwrap().reason,
        RejectionReason::ReferenceCatalogUnavailable(_)
    ));

    let outcome = calibrate_image(&ctx, &image, &StaticCatalog(Vec::new()), None).await.unwrap();
    assert!(matches!(
        outcome.rejection().unwrap().reason,
        RejectionReason::ReferenceCatalogUnavailable(_)
    ));

    let broken = IdentityImage {
        metadata: metadata(),
        detections: Some(detections),
        wcs_ok: false,
    };
    let outcome = calibrate_image(&ctx, &broken, &StaticCatalog(stars), None).await.unwrap();
    let rejection = outcome.rejection().unwrap();
    assert_eq!(rejection.stage, CalibrationStage::Validated);
    assert!(matches!(rejection.reason, RejectionReason::BadAstrometry(_)));
}

#[tokio::test]
async fn test_storage_failure_is_an_error() {
    let repo = Arc::new(LocalRepository::new());
    repo.set_healthy(false);
    let ctx = context(repo);
    let (detections, stars) = field(20, true);
    let image = IdentityImage {
        metadata: metadata(),
        detections: Some(detections),
        wcs_ok: true,
    };
    assert!(calibrate_image(&ctx, &image, &StaticCatalog(stars), None).await.is_err());
}

/// Reports every detection twice as bright as the catalog does.
struct DoublingPhotometry {
    fluxes: Vec<f64>,
    drop_last: bool,
}

impl AperturePhotometry for DoublingPhotometry {
    fn measure(
        &self,
        _image: &dyn ObservedImage,
        positions: &[(f64, f64)],
        _geometry: &ApertureGeometry,
    ) -> anyhow::Result<Vec<f64>> {
        let n = if self.drop_last { positions.len() - 1 } else { positions.len() };
        Ok(self.fluxes.iter().take(n).map(|f| 2.0 * f).collect())
    }
}

#[tokio::test]
async fn test_aperture_photometry_replaces_catalog_fluxes() {
    let repo = Arc::new(LocalRepository::new());
    let mut config = config();
    config.calibration.convert_ps1 = false;
    config.calibration.aperture = Some(ApertureGeometry {
        radius: 6.0,
        annulus_inner: 10.0,
        annulus_outer: 15.0,
    });
    let ctx = PipelineContext::new(repo, config);
    let (detections, stars) = field(20, true);
    let fluxes: Vec<f64> = detections.iter().map(|d| d.flux).collect();
    let image = IdentityImage {
        metadata: metadata(),
        detections: Some(detections),
        wcs_ok: true,
    };

    let photometry = DoublingPhotometry {
        fluxes: fluxes.clone(),
        drop_last: false,
    };
    let catalog = StaticCatalog(stars.clone());
    let outcome = calibrate_image(&ctx, &image, &catalog, Some(&photometry as &dyn AperturePhotometry))
        .await
        .unwrap();
    let CalibrationOutcome::Calibrated(calibration) = outcome else {
        panic!("expected a calibration");
    };
    let brighter = ZP + 2.5 * 2f64.log10();
    assert!((calibration.result.zeropoint - brighter).abs() < 1e-9);

    // A short answer from the photometry service keeps the catalog fluxes.
    let photometry = DoublingPhotometry {
        fluxes,
        drop_last: true,
    };
    let catalog = StaticCatalog(stars);
    let outcome = calibrate_image(&ctx, &image, &catalog, Some(&photometry as &dyn AperturePhotometry))
        .await
        .unwrap();
    let CalibrationOutcome::Calibrated(calibration) = outcome else {
        panic!("expected a calibration");
    };
    assert!((calibration.result.zeropoint - ZP).abs() < 1e-9);
}

struct OfflinePhotometry;

impl AperturePhotometry for OfflinePhotometry {
    fn measure(
        &self,
        _image: &dyn ObservedImage,
        _positions: &[(f64, f64)],
        _geometry: &ApertureGeometry,
    ) -> anyhow::Result<Vec<f64>> {
        anyhow::bail!("photometry service unreachable")
    }
}

#[tokio::test]
async fn test_failed_aperture_photometry_keeps_catalog_fluxes() {
    let repo = Arc::new(LocalRepository::new());
    let mut config = config();
    config.calibration.convert_ps1 = false;
    config.calibration.aperture = Some(ApertureGeometry {
        radius: 6.0,
        annulus_inner: 10.0,
        annulus_outer: 15.0,
    });
    let ctx = PipelineContext::new(repo.clone(), config);
    let (detections, stars) = field(20, true);
    let image = IdentityImage {
        metadata: metadata(),
        detections: Some(detections),
        wcs_ok: true,
    };

    let outcome = calibrate_image(
        &ctx,
        &image,
        &StaticCatalog(stars),
        Some(&OfflinePhotometry as &dyn AperturePhotometry),
    )
    .await
    .unwrap();
    let CalibrationOutcome::Calibrated(calibration) = outcome else {
        panic!("expected a calibration");
    };
    assert!((calibration.result.zeropoint - ZP).abs() < 1e-9);
    assert_eq!(repo.calibration_count(), 1);
}
