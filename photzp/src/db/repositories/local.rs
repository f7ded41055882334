//! In-memory local repository implementation.
//!
//! Suitable for unit testing and local development. Calibration results are
//! kept in a map keyed by image and trends in a map keyed by telescope and
//! filter, so every write is an atomic replace under one lock.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::db::models::RecordQuery;
use crate::db::repository::*;
use crate::models::{CalibrationResult, ImageKey, TelescopeClass, TelescopeId, TrendModel, TrendPoint};

/// In-memory local repository.
///
/// # Example
/// ```ignore
/// use photzp::db::repositories::LocalRepository;
///
/// #[tokio::test]
/// async fn test_storage() {
///     let repo = LocalRepository::new();
///     repo.upsert(&result).await.unwrap();
///     assert_eq!(repo.calibration_count(), 1);
/// }
/// ```
#[derive(Clone)]
pub struct LocalRepository {
    data: Arc<RwLock<LocalData>>,
}

struct LocalData {
    calibrations: HashMap<ImageKey, CalibrationResult>,
    trends: BTreeMap<(TelescopeId, String), Vec<TrendPoint>>,

    // Connection health
    is_healthy: bool,
}

impl Default for LocalData {
    fn default() -> Self {
        Self {
            calibrations: HashMap::new(),
            trends: BTreeMap::new(),
            is_healthy: true,
        }
    }
}

impl LocalRepository {
    /// Create a new empty local repository.
    pub fn new() -> Self {
        Self {
            data: Arc::new(RwLock::new(LocalData::default())),
        }
    }

    /// Set the health status for testing connection failures.
    pub fn set_healthy(&self, healthy: bool) {
        self.data.write().is_healthy = healthy;
    }

    /// Clear all data from the repository.
    pub fn clear(&self) {
        let mut data = self.data.write();
        *data = LocalData {
            is_healthy: data.is_healthy,
            ..Default::default()
        };
    }

    /// Get the number of calibration results stored.
    pub fn calibration_count(&self) -> usize {
        self.data.read().calibrations.len()
    }

    /// Get the number of trends stored.
    pub fn trend_count(&self) -> usize {
        self.data.read().trends.len()
    }

    /// Helper to check health and return error if unhealthy.
    fn check_health(&self, operation: &str) -> RepositoryResult<()> {
        if !self.data.read().is_healthy {
            return Err(RepositoryError::connection_with_context(
                "Record store is not healthy",
                ErrorContext::new(operation).retryable(),
            ));
        }
        Ok(())
    }
}

impl Default for LocalRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CalibrationRepository for LocalRepository {
    async fn health_check(&self) -> RepositoryResult<bool> {
        Ok(self.data.read().is_healthy)
    }

    async fn exists(&self, image: &ImageKey) -> RepositoryResult<bool> {
        self.check_health("exists")?;
        Ok(self.data.read().calibrations.contains_key(image))
    }

    async fn upsert(&self, result: &CalibrationResult) -> RepositoryResult<()> {
        self.check_health("upsert")?;
        self.data
            .write()
            .calibrations
            .insert(result.image.clone(), result.clone());
        Ok(())
    }

    async fn query(&self, query: &RecordQuery) -> RepositoryResult<Vec<CalibrationResult>> {
        self.check_health("query")?;
        let data = self.data.read();
        let mut records: Vec<CalibrationResult> = data
            .calibrations
            .values()
            .filter(|r| query.matches(r))
            .cloned()
            .collect();
        records.sort_by(|a, b| {
            a.observed_at
                .cmp(&b.observed_at)
                .then_with(|| a.image.as_str().cmp(b.image.as_str()))
        });
        Ok(records)
    }
}

#[async_trait]
impl TrendRepository for LocalRepository {
    async fn read_trend(&self, telescope: &TelescopeId, filter: &str) -> RepositoryResult<Vec<TrendPoint>> {
        self.check_health("read_trend")?;
        let data = self.data.read();
        Ok(data
            .trends
            .get(&(telescope.clone(), filter.to_string()))
            .cloned()
            .unwrap_or_default())
    }

    async fn write_trend(
        &self,
        telescope: &TelescopeId,
        filter: &str,
        points: &[TrendPoint],
    ) -> RepositoryResult<()> {
        self.check_health("write_trend")?;
        let mut sorted = points.to_vec();
        sorted.sort_by_key(|p| p.night);
        self.data
            .write()
            .trends
            .insert((telescope.clone(), filter.to_string()), sorted);
        Ok(())
    }

    async fn find_trend_models(
        &self,
        class: &TelescopeClass,
        filter: &str,
    ) -> RepositoryResult<Vec<TrendModel>> {
        self.check_health("find_trend_models")?;
        let data = self.data.read();
        Ok(data
            .trends
            .iter()
            .filter(|((telescope, f), _)| f == filter && &telescope.class() == class)
            .map(|((telescope, f), points)| TrendModel {
                telescope: telescope.clone(),
                filter: f.clone(),
                points: points.clone(),
            })
            .collect())
    }
}

#[cfg(test)]
#[path = "local_tests.rs"]
mod tests;
