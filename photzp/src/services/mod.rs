//! Pipeline operations on top of the algorithms and the record store.
//!
//! Services take a [`crate::context::PipelineContext`] and the external
//! collaborators they need; none of them hold state of their own.

pub mod archive;
pub mod batch;
pub mod calibration;
pub mod color_terms;
pub mod trends;

pub use archive::{lco_archive_path, MalformedFileName};
pub use batch::{process_batch, BatchSummary, Collaborators};
pub use calibration::{
    calibrate_image, calibrate_matches, Calibration, CalibrationDiagnostics, CalibrationOutcome,
};
pub use color_terms::{median_color_term, stored_color_term, ColorTermSample};
pub use trends::{compute_trend, corrected_samples, photometric_nights, rebuild_trend, trend_segments};
