#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use photzp::algorithms::transforms::ps1_to_sdss;
use photzp::collaborators::{ImageProvider, ObservedImage, ReferenceCatalog};
use photzp::db::{
    CalibrationRepository, LocalRepository, RecordQuery, RepositoryError, RepositoryResult,
    TrendRepository,
};
use photzp::models::{
    CalibrationResult, Detection, ImageKey, ImageMetadata, ReferenceBand, ReferenceStar,
    SkyPosition, TelescopeClass, TelescopeId, TrendModel, TrendPoint,
};

static ENV_LOCK: Mutex<()> = Mutex::new(());

/// Runs `f` with environment variables temporarily modified.
///
/// Restores variables on unwind and serializes access to the process
/// environment across parallel tests.
///
/// `changes` is a list of `(key, value)` pairs:
/// - `Some(v)` sets the variable to `v`
/// - `None` removes the variable
pub fn with_scoped_env<F, R>(changes: &[(&str, Option<&str>)], f: F) -> R
where
    F: FnOnce() -> R,
{
    let _lock = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let _guard = ScopedEnv::new(changes);
    f()
}

struct ScopedEnv {
    snapshot: Vec<(String, Option<String>)>,
}

impl ScopedEnv {
    fn new(changes: &[(&str, Option<&str>)]) -> Self {
        let keys: HashSet<&str> = changes.iter().map(|(k, _)| *k).collect();
        let snapshot = keys
            .into_iter()
            .map(|k| (k.to_string(), std::env::var(k).ok()))
            .collect::<Vec<_>>();

        for (k, v) in changes {
            match v {
                Some(val) => std::env::set_var(k, val),
                None => std::env::remove_var(k),
            }
        }

        Self { snapshot }
    }
}

impl Drop for ScopedEnv {
    fn drop(&mut self) {
        for (k, v) in self.snapshot.drain(..) {
            match v {
                Some(val) => std::env::set_var(&k, val),
                None => std::env::remove_var(&k),
            }
        }
    }
}

// ==================== Fixture image ====================

/// Gnomonic (TAN) projection with a square pixel grid, north up, east left.
#[derive(Debug, Clone, Copy)]
pub struct TanWcs {
    pub center: SkyPosition,
    pub crpix: (f64, f64),
    /// Arcseconds per pixel.
    pub scale: f64,
}

impl TanWcs {
    pub fn pixel_to_sky(&self, x: f64, y: f64) -> SkyPosition {
        let scale = (self.scale / 3600.0).to_radians();
        let xi = -(x - self.crpix.0) * scale;
        let eta = (y - self.crpix.1) * scale;
        let ra0 = self.center.ra.value().to_radians();
        let dec0 = self.center.dec.value().to_radians();

        let denom = dec0.cos() - eta * dec0.sin();
        let ra = ra0 + xi.atan2(denom);
        let dec = (dec0.sin() + eta * dec0.cos()).atan2((xi * xi + denom * denom).sqrt());
        SkyPosition::new(ra.to_degrees().rem_euclid(360.0), dec.to_degrees())
    }
}

pub struct FixtureImage {
    pub metadata: ImageMetadata,
    pub detections: Option<Vec<Detection>>,
    pub wcs: TanWcs,
}

impl ObservedImage for FixtureImage {
    fn metadata(&self) -> &ImageMetadata {
        &self.metadata
    }

    fn detections(&self) -> Option<&[Detection]> {
        self.detections.as_deref()
    }

    fn pixel_to_sky(&self, x: f64, y: f64) -> anyhow::Result<SkyPosition> {
        if !(0.0..4096.0).contains(&x) || !(0.0..4096.0).contains(&y) {
            anyhow::bail!("pixel ({x:.1}, {y:.1}) is off the detector");
        }
        Ok(self.wcs.pixel_to_sky(x, y))
    }
}

pub const FIXTURE_ZEROPOINT: f64 = 23.1;
pub const FIXTURE_COLOR_TERM: f64 = -0.008;

pub fn fixture_metadata(key: &str, observed_at: DateTime<Utc>) -> ImageMetadata {
    ImageMetadata {
        key: ImageKey::new(key),
        filter: "gp".to_string(),
        exposure: qtty::Seconds::new(120.0),
        airmass: 1.0,
        observed_at,
        site: "lsc".to_string(),
        dome: "doma".to_string(),
        telescope: "1m0a".to_string(),
        camera: "fa15".to_string(),
        focus_offset: None,
        astrometry_ok: true,
        pointing: SkyPosition::new(150.1, -30.2),
    }
}

/// A 60-star field with PS1 reference photometry, detections following
/// `Δm = ct·(g−i) + zp` in the SDSS system with ±0.02 mag noise, three
/// outliers and four detections without a reference counterpart.
pub fn fixture_field(
    metadata: ImageMetadata,
    zeropoint: f64,
    color_term: f64,
    seed: u64,
) -> (FixtureImage, Vec<ReferenceStar>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let wcs = TanWcs {
        center: metadata.pointing,
        crpix: (2048.0, 2048.0),
        scale: 0.389,
    };
    let exposure = metadata.exposure.value();

    let mut detections = Vec::new();
    let mut stars = Vec::new();
    for k in 0..60 {
        let x = 300.0 + 450.0 * (k % 8) as f64 + rng.random::<f64>() * 50.0;
        let y = 300.0 + 450.0 * (k / 8) as f64 + rng.random::<f64>() * 50.0;
        let gi = 0.4 + 1.6 * rng.random::<f64>();
        let g = 14.0 + 4.0 * rng.random::<f64>();
        let star = ReferenceStar::new(wcs.pixel_to_sky(x, y))
            .with_band(ReferenceBand::SdssG, g, 0.01)
            .with_band(ReferenceBand::SdssR, g - 0.4 * gi, 0.01)
            .with_band(ReferenceBand::SdssI, g - gi, 0.01)
            .with_band(ReferenceBand::SdssZ, g - 1.2 * gi, 0.02);

        let mut sdss = star.clone();
        ps1_to_sdss(&mut sdss);
        let sdss_g = sdss.mag(ReferenceBand::SdssG).unwrap_or(g);
        let sdss_gi = sdss.color_gi().unwrap_or(gi);

        let mut instrumental = sdss_g - (color_term * sdss_gi + zeropoint);
        instrumental += (rng.random::<f64>() - 0.5) * 0.04;
        if k % 20 == 7 {
            instrumental += 0.5;
        }
        detections.push(Detection::new(x, y, exposure * 10f64.powf(-0.4 * instrumental)));
        stars.push(star);
    }
    for k in 0..4 {
        detections.push(Detection::new(3900.0, 200.0 + 900.0 * k as f64, 5000.0));
    }

    (
        FixtureImage {
            metadata,
            detections: Some(detections),
            wcs,
        },
        stars,
    )
}

pub fn night(day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2019, 3, day, 3, 0, 0).unwrap()
}

// ==================== Collaborator fakes ====================

pub struct StaticCatalog(pub Vec<ReferenceStar>);

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

/// Serves fixture fields by key; unknown keys fail to open.
#[derive(Default)]
pub struct FixtureProvider {
    fields: HashMap<ImageKey, (ImageMetadata, u64)>,
    pub opened: AtomicUsize,
}

impl FixtureProvider {
    pub fn add(&mut self, metadata: ImageMetadata, seed: u64) {
        self.fields.insert(metadata.key.clone(), (metadata, seed));
    }

    /// Catalog covering every field; all fields share one star layout per
    /// seed, so this is the union of the fields' stars.
    pub fn catalog(&self) -> StaticCatalog {
        let mut stars = Vec::new();
        let mut seeds: Vec<u64> = self.fields.values().map(|(_, s)| *s).collect();
        seeds.sort_unstable();
        seeds.dedup();
        for seed in seeds {
            let (metadata, _) = self
                .fields
                .values()
                .find(|(_, s)| *s == seed)
                .cloned()
                .unwrap();
            stars.extend(fixture_field(metadata, FIXTURE_ZEROPOINT, FIXTURE_COLOR_TERM, seed).1);
        }
        StaticCatalog(stars)
    }
}

#[async_trait]
impl ImageProvider for FixtureProvider {
    async fn open(&self, key: &ImageKey) -> anyhow::Result<Box<dyn ObservedImage>> {
        self.opened.fetch_add(1, Ordering::Relaxed);
        let Some((metadata, seed)) = self.fields.get(key) else {
            anyhow::bail!("{key} not found in archive");
        };
        let (image, _) = fixture_field(metadata.clone(), FIXTURE_ZEROPOINT, FIXTURE_COLOR_TERM, *seed);
        Ok(Box::new(image))
    }
}

// ==================== Repository fakes ====================

/// Local store whose writes fail once `fail_writes` is set.
#[derive(Clone, Default)]
pub struct FlakyRepository {
    pub inner: LocalRepository,
    pub fail_writes: Arc<std::sync::atomic::AtomicBool>,
}

impl FlakyRepository {
    fn check_writes(&self) -> RepositoryResult<()> {
        if self.fail_writes.load(Ordering::Relaxed) {
            return Err(RepositoryError::connection("connection reset by peer"));
        }
        Ok(())
    }
}

#[async_trait]
impl CalibrationRepository for FlakyRepository {
    async fn health_check(&self) -> RepositoryResult<bool> {
        self.inner.health_check().await
    }

    async fn exists(&self, image: &ImageKey) -> RepositoryResult<bool> {
        self.inner.exists(image).await
    }

    async fn upsert(&self, result: &CalibrationResult) -> RepositoryResult<()> {
        self.check_writes()?;
        self.inner.upsert(result).await
    }

    async fn query(&self, query: &RecordQuery) -> RepositoryResult<Vec<CalibrationResult>> {
        self.inner.query(query).await
    }
}

#[async_trait]
impl TrendRepository for FlakyRepository {
    async fn read_trend(&self, telescope: &TelescopeId, filter: &str) -> RepositoryResult<Vec<TrendPoint>> {
        self.inner.read_trend(telescope, filter).await
    }

    async fn write_trend(
        &self,
        telescope: &TelescopeId,
        filter: &str,
        points: &[TrendPoint],
    ) -> RepositoryResult<()> {
        self.check_writes()?;
        self.inner.write_trend(telescope, filter, points).await
    }

    async fn find_trend_models(
        &self,
        class: &TelescopeClass,
        filter: &str,
    ) -> RepositoryResult<Vec<TrendModel>> {
        self.inner.find_trend_models(class, filter).await
    }
}
