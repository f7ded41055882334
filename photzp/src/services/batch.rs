//! Sequential calibration of a list of images.

use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

use super::calibration::{calibrate_image, CalibrationOutcome};
use crate::collaborators::{AperturePhotometry, ImageProvider, ReferenceCatalog};
use crate::context::PipelineContext;
use crate::db::RepositoryResult;
use crate::error::{CalibrationStage, Rejection, RejectionReason};
use crate::models::{FitQuality, ImageKey};

/// The external services a batch reads from.
#[derive(Clone, Copy)]
pub struct Collaborators<'a> {
    pub images: &'a dyn ImageProvider,
    pub catalog: &'a dyn ReferenceCatalog,
    pub photometry: Option<&'a dyn AperturePhotometry>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    /// Images handed to the pipeline.
    pub attempted: usize,
    pub calibrated: usize,
    /// Calibrated with the median-zeropoint fallback. Included in `calibrated`.
    pub degraded: usize,
    /// Already in the store.
    pub skipped: usize,
    /// Rejection count per [`RejectionReason::kind`].
    pub rejections: BTreeMap<String, usize>,
    pub cancelled: bool,
}

impl BatchSummary {
    pub fn rejected(&self) -> usize {
        self.rejections.values().sum()
    }

    fn count_rejection(&mut self, rejection: &Rejection) {
        *self
            .rejections
            .entry(rejection.reason.kind().to_string())
            .or_default() += 1;
    }
}

/// Calibrates `keys` in order.
///
/// Images already stored are skipped unless `redo`. Rejections are counted
/// and the batch moves on; a store failure ends the batch with that error.
/// `cancel` is checked before each image.
pub async fn process_batch(
    ctx: &PipelineContext,
    keys: &[ImageKey],
    collaborators: Collaborators<'_>,
    redo: bool,
    cancel: &AtomicBool,
) -> RepositoryResult<BatchSummary> {
    let mut summary = BatchSummary::default();
    let total = keys.len();

    for (i, key) in keys.iter().enumerate() {
        if cancel.load(Ordering::Relaxed) {
            warn!("Batch cancelled after {} of {} images", i, total);
            summary.cancelled = true;
            break;
        }

        if !redo && ctx.repo().exists(key).await? {
            summary.skipped += 1;
            continue;
        }

        summary.attempted += 1;
        let image = match collaborators.images.open(key).await {
            Ok(image) => image,
            Err(e) => {
                let rejection = Rejection::new(
                    key.clone(),
                    CalibrationStage::Received,
                    RejectionReason::ImageUnavailable(format!("{:#}", e)),
                );
                info!("[{}/{}] {}", i + 1, total, rejection);
                summary.count_rejection(&rejection);
                continue;
            }
        };

        let outcome = calibrate_image(
            ctx,
            image.as_ref(),
            collaborators.catalog,
            collaborators.photometry,
        )
        .await?;
        match outcome {
            CalibrationOutcome::Calibrated(calibration) => {
                summary.calibrated += 1;
                if calibration.result.quality == FitQuality::Degraded {
                    summary.degraded += 1;
                }
            }
            CalibrationOutcome::Rejected(rejection) => summary.count_rejection(&rejection),
        }
    }

    info!(
        "Batch done: {} calibrated ({} degraded), {} rejected, {} skipped",
        summary.calibrated,
        summary.degraded,
        summary.rejected(),
        summary.skipped
    );
    for (telescope, filter, color_term) in ctx.color_term_summary() {
        info!("Color term {telescope} {filter}: {color_term:+.4}");
    }
    Ok(summary)
}
