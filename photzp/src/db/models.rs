//! Query types shared by the repository implementations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{CalibrationResult, TelescopeId};

/// Filter for [`crate::db::CalibrationRepository::query`]. Unset fields
/// match everything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordQuery {
    pub telescope: Option<TelescopeId>,
    /// Any of these filters.
    pub filters: Option<Vec<String>>,
    pub camera: Option<String>,
    /// Inclusive.
    pub since: Option<DateTime<Utc>>,
    /// Exclusive.
    pub until: Option<DateTime<Utc>>,
}

impl RecordQuery {
    pub fn for_telescope(telescope: TelescopeId) -> Self {
        Self {
            telescope: Some(telescope),
            ..Default::default()
        }
    }

    pub fn with_filters<I, S>(mut self, filters: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.filters = Some(filters.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_camera(mut self, camera: impl Into<String>) -> Self {
        self.camera = Some(camera.into());
        self
    }

    pub fn between(mut self, since: Option<DateTime<Utc>>, until: Option<DateTime<Utc>>) -> Self {
        self.since = since;
        self.until = until;
        self
    }

    pub fn matches(&self, record: &CalibrationResult) -> bool {
        self.telescope
            .as_ref()
            .map_or(true, |t| &record.telescope_id() == t)
            && self
                .filters
                .as_ref()
                .map_or(true, |fs| fs.iter().any(|f| f == &record.filter))
            && self.camera.as_ref().map_or(true, |c| c == &record.camera)
            && self.since.map_or(true, |s| record.observed_at >= s)
            && self.until.map_or(true, |u| record.observed_at < u)
    }
}
