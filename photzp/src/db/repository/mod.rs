//! Record store traits.
//!
//! - [`error`]: Error types for repository operations
//! - [`calibration`]: Per-image calibration results, keyed by image
//! - [`trend`]: Stored throughput trend models per telescope and filter
//!
//! # Convenience Trait Bound
//!
//! Services that need both capabilities take a [`FullRepository`]:
//!
//! ```ignore
//! async fn rebuild<R: FullRepository + ?Sized>(repo: &R) -> RepositoryResult<()> {
//!     let records = repo.query(&RecordQuery::default()).await?;
//!     repo.write_trend(&telescope, "gp", &points).await?;
//!     Ok(())
//! }
//! ```

pub mod calibration;
pub mod error;
pub mod trend;

pub use error::{ErrorContext, RepositoryError, RepositoryResult};

pub use calibration::CalibrationRepository;
pub use trend::TrendRepository;

/// Composite trait bound for a complete record store.
pub trait FullRepository: CalibrationRepository + TrendRepository {}

// Blanket implementation: anything implementing both traits is a FullRepository
impl<T> FullRepository for T where T: CalibrationRepository + TrendRepository {}
