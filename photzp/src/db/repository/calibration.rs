//! Calibration result storage.

use async_trait::async_trait;

use super::error::RepositoryResult;
use crate::db::models::RecordQuery;
use crate::models::{CalibrationResult, ImageKey};

/// Storage for per-image calibration results.
///
/// Results are keyed by image. Writing the same key twice keeps only the
/// second result; implementations must make that replacement atomic so
/// overlapping batches can reprocess the same image safely.
///
/// # Thread Safety
/// Implementations must be `Send + Sync` to work with async Rust.
#[async_trait]
pub trait CalibrationRepository: Send + Sync {
    /// Check if the store is reachable.
    ///
    /// # Returns
    /// - `Ok(true)` if healthy
    /// - `Ok(false)` if unhealthy but no error occurred
    /// - `Err(RepositoryError)` if the check itself failed
    async fn health_check(&self) -> RepositoryResult<bool>;

    /// Whether a result for `image` is already stored.
    async fn exists(&self, image: &ImageKey) -> RepositoryResult<bool>;

    /// Insert or replace the result for `result.image`.
    async fn upsert(&self, result: &CalibrationResult) -> RepositoryResult<()>;

    /// Results matching every set field of `query`, oldest first.
    async fn query(&self, query: &RecordQuery) -> RepositoryResult<Vec<CalibrationResult>>;
}
