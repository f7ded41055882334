use chrono::{DateTime, Utc};
use diesel::prelude::*;

use super::schema::{calibrations, trend_points};
use crate::db::repository::{RepositoryError, RepositoryResult};
use crate::models::{CalibrationResult, FitQuality, ImageKey, TrendPoint};

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = calibrations)]
#[diesel(check_for_backend(diesel::pg::Pg))]
#[allow(dead_code)] // recorded_at is maintained by the database
pub struct CalibrationRow {
    pub image: String,
    pub telescope_id: String,
    pub observed_at: DateTime<Utc>,
    pub site: String,
    pub dome: String,
    pub telescope: String,
    pub camera: String,
    pub filter: String,
    pub airmass: f64,
    pub zeropoint: f64,
    pub color_term: f64,
    pub scatter: f64,
    pub matched_pairs: i32,
    pub quality: String,
    pub recorded_at: DateTime<Utc>,
}

impl CalibrationRow {
    pub fn into_result(self) -> RepositoryResult<CalibrationResult> {
        let quality = FitQuality::parse(&self.quality).ok_or_else(|| {
            RepositoryError::internal(format!(
                "Unknown fit quality '{}' for image {}",
                self.quality, self.image
            ))
        })?;
        Ok(CalibrationResult {
            image: ImageKey::new(self.image),
            observed_at: self.observed_at,
            site: self.site,
            dome: self.dome,
            telescope: self.telescope,
            camera: self.camera,
            filter: self.filter,
            airmass: self.airmass,
            zeropoint: self.zeropoint,
            color_term: self.color_term,
            scatter: self.scatter,
            matched_pairs: usize::try_from(self.matched_pairs).unwrap_or(0),
            quality,
        })
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = calibrations)]
pub struct NewCalibrationRow {
    pub image: String,
    pub telescope_id: String,
    pub observed_at: DateTime<Utc>,
    pub site: String,
    pub dome: String,
    pub telescope: String,
    pub camera: String,
    pub filter: String,
    pub airmass: f64,
    pub zeropoint: f64,
    pub color_term: f64,
    pub scatter: f64,
    pub matched_pairs: i32,
    pub quality: String,
}

impl From<&CalibrationResult> for NewCalibrationRow {
    fn from(result: &CalibrationResult) -> Self {
        Self {
            image: result.image.to_string(),
            telescope_id: result.telescope_id().to_string(),
            observed_at: result.observed_at,
            site: result.site.clone(),
            dome: result.dome.clone(),
            telescope: result.telescope.clone(),
            camera: result.camera.clone(),
            filter: result.filter.clone(),
            airmass: result.airmass,
            zeropoint: result.zeropoint,
            color_term: result.color_term,
            scatter: result.scatter,
            matched_pairs: i32::try_from(result.matched_pairs).unwrap_or(i32::MAX),
            quality: result.quality.as_str().to_string(),
        }
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = trend_points)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct TrendPointRow {
    pub telescope_id: String,
    pub filter: String,
    pub night: DateTime<Utc>,
    pub value: f64,
}

impl From<&TrendPointRow> for TrendPoint {
    fn from(row: &TrendPointRow) -> Self {
        TrendPoint::new(row.night, row.value)
    }
}
