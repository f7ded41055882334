//! Numerical core: cross-match, robust fit, upper envelope and
//! segmentation. Everything here is pure and synchronous.

pub mod crossmatch;
pub mod envelope;
pub mod photometric_nights;
pub mod robust_fit;
pub mod segmentation;
pub mod stats;
pub mod transforms;

pub use crossmatch::{cross_match, match_catalog, InsufficientMatches, LocatedDetection, MatchPolicy};
pub use envelope::{upper_envelope, EnvelopePolicy, ZeropointSample};
pub use photometric_nights::{classify_nights, NightClass, NightReport};
pub use robust_fit::{fit, median_zeropoint, FitError, FitPolicy, LinearFit};
pub use segmentation::segment_trend;
