//! Throughput trend model storage.

use async_trait::async_trait;

use super::error::RepositoryResult;
use crate::models::{TelescopeClass, TelescopeId, TrendModel, TrendPoint};

/// Storage for smoothed throughput trends.
///
/// A trend is identified by telescope and filter and is always written as
/// a whole: [`TrendRepository::write_trend`] replaces every stored point.
#[async_trait]
pub trait TrendRepository: Send + Sync {
    /// Stored points in night order. Empty if nothing was written.
    async fn read_trend(&self, telescope: &TelescopeId, filter: &str) -> RepositoryResult<Vec<TrendPoint>>;

    /// Replace the stored trend with `points`.
    async fn write_trend(
        &self,
        telescope: &TelescopeId,
        filter: &str,
        points: &[TrendPoint],
    ) -> RepositoryResult<()>;

    /// All trends of one telescope class in one filter, for comparing
    /// telescopes against each other.
    async fn find_trend_models(
        &self,
        class: &TelescopeClass,
        filter: &str,
    ) -> RepositoryResult<Vec<TrendModel>>;
}
