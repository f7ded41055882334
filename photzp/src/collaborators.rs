//! Interfaces to the services the pipeline consumes but does not implement:
//! image access with its WCS, the reference catalog and aperture photometry.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::models::{Detection, ImageKey, ImageMetadata, ReferenceStar, SkyPosition};

/// An opened image: header metadata, the source catalog and its WCS.
pub trait ObservedImage: Send + Sync {
    fn metadata(&self) -> &ImageMetadata;

    /// The detection catalog, `None` when the image has none.
    fn detections(&self) -> Option<&[Detection]>;

    /// Projects a pixel position onto the sky.
    fn pixel_to_sky(&self, x: f64, y: f64) -> anyhow::Result<SkyPosition>;
}

/// Opens images by key.
#[async_trait]
pub trait ImageProvider: Send + Sync {
    async fn open(&self, key: &ImageKey) -> anyhow::Result<Box<dyn ObservedImage>>;
}

/// Region query against the reference star catalog.
#[async_trait]
pub trait ReferenceCatalog: Send + Sync {
    async fn query_region(
        &self,
        center: SkyPosition,
        radius: qtty::Degrees,
    ) -> anyhow::Result<Vec<ReferenceStar>>;
}

/// Circular aperture with a background annulus, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ApertureGeometry {
    pub radius: f64,
    pub annulus_inner: f64,
    pub annulus_outer: f64,
}

/// Recomputes background-subtracted fluxes at the given pixel positions.
pub trait AperturePhotometry: Send + Sync {
    fn measure(
        &self,
        image: &dyn ObservedImage,
        positions: &[(f64, f64)],
        geometry: &ApertureGeometry,
    ) -> anyhow::Result<Vec<f64>>;
}
