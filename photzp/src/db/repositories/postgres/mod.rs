//! Postgres record store using Diesel.
//!
//! Calibration results live in `calibrations`, keyed by image. Smoothed
//! trends live in `trend_points`, keyed by telescope, filter and night.
//! Pending migrations run when the store is opened.
//!
//! Settings come from the environment (see [`PostgresConfig::from_env`]):
//!
//! | variable | default |
//! |----------|---------|
//! | `DATABASE_URL` / `PG_DATABASE_URL` | required |
//! | `PG_POOL_MAX` / `PG_POOL_MIN` | 10 / 1 |
//! | `PG_CONN_TIMEOUT_SEC` / `PG_IDLE_TIMEOUT_SEC` | 30 / 600 |
//! | `PG_MAX_RETRIES` / `PG_RETRY_DELAY_MS` | 3 / 100 |

use async_trait::async_trait;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool};
use diesel::sql_query;
use diesel::upsert::excluded;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use std::collections::BTreeMap;
use std::str::FromStr;
use std::time::Duration;
use tokio::task;

use crate::db::models::RecordQuery;
use crate::db::repository::{
    CalibrationRepository, ErrorContext, RepositoryError, RepositoryResult, TrendRepository,
};
use crate::models::{
    CalibrationResult, ImageKey, TelescopeClass, TelescopeId, TrendModel, TrendPoint,
};

mod models;
mod schema;

use models::*;
use schema::*;

type PgPool = Pool<ConnectionManager<PgConnection>>;

const MIGRATIONS: EmbeddedMigrations = embed_migrations!("src/db/repositories/postgres/migrations");

#[derive(Debug, Clone)]
pub struct PostgresConfig {
    pub database_url: String,
    pub max_pool_size: u32,
    pub min_pool_size: u32,
    pub connection_timeout_sec: u64,
    pub idle_timeout_sec: u64,
    /// Extra attempts after a retryable failure.
    pub max_retries: u32,
    /// First backoff delay; doubles on each further attempt.
    pub retry_delay_ms: u64,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            database_url: String::new(),
            max_pool_size: 10,
            min_pool_size: 1,
            connection_timeout_sec: 30,
            idle_timeout_sec: 600,
            max_retries: 3,
            retry_delay_ms: 100,
        }
    }
}

/// Parses `name` from the environment, keeping `fallback` when unset or malformed.
fn env_or<T: FromStr>(name: &str, fallback: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(fallback)
}

impl PostgresConfig {
    pub fn from_env() -> Result<Self, String> {
        let database_url = std::env::var("DATABASE_URL")
            .or_else(|_| std::env::var("PG_DATABASE_URL"))
            .map_err(|_| "DATABASE_URL or PG_DATABASE_URL must be set".to_string())?;
        let defaults = Self::default();

        Ok(Self {
            database_url,
            max_pool_size: env_or("PG_POOL_MAX", defaults.max_pool_size),
            min_pool_size: env_or("PG_POOL_MIN", defaults.min_pool_size),
            connection_timeout_sec: env_or("PG_CONN_TIMEOUT_SEC", defaults.connection_timeout_sec),
            idle_timeout_sec: env_or("PG_IDLE_TIMEOUT_SEC", defaults.idle_timeout_sec),
            max_retries: env_or("PG_MAX_RETRIES", defaults.max_retries),
            retry_delay_ms: env_or("PG_RETRY_DELAY_MS", defaults.retry_delay_ms),
        })
    }

    pub fn with_url(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            ..Default::default()
        }
    }
}

/// Calibration results and trends in Postgres, behind an r2d2 pool.
///
/// Upserting one image and replacing one trend are each a single statement
/// or transaction, so a batch abort never leaves half a record behind.
#[derive(Clone, Debug)]
pub struct PostgresRepository {
    pool: PgPool,
    config: PostgresConfig,
}

impl PostgresRepository {
    /// Opens the pool and applies pending migrations.
    pub fn new(config: PostgresConfig) -> RepositoryResult<Self> {
        let manager = ConnectionManager::<PgConnection>::new(&config.database_url);
        let pool = Pool::builder()
            .max_size(config.max_pool_size)
            .min_idle(Some(config.min_pool_size))
            .connection_timeout(Duration::from_secs(config.connection_timeout_sec))
            .idle_timeout(Some(Duration::from_secs(config.idle_timeout_sec)))
            .test_on_check_out(true)
            .build(manager)
            .map_err(|e| {
                RepositoryError::connection_with_context(
                    e.to_string(),
                    ErrorContext::new("open_pool")
                        .with_details(format!("max_size={}", config.max_pool_size)),
                )
            })?;

        let mut conn = pool.get()?;
        conn.run_pending_migrations(MIGRATIONS).map_err(|e| {
            RepositoryError::internal_with_context(e.to_string(), ErrorContext::new("migrate"))
        })?;
        drop(conn);

        log::info!(
            "Postgres record store ready (pool {}..{})",
            config.min_pool_size,
            config.max_pool_size
        );
        Ok(Self { pool, config })
    }

    /// Runs `f` on a pooled connection off the async runtime, retrying
    /// retryable failures with doubling backoff.
    async fn with_conn<T, F>(&self, f: F) -> RepositoryResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut PgConnection) -> RepositoryResult<T> + Send + 'static + Clone,
    {
        let pool = self.pool.clone();
        let max_retries = self.config.max_retries;
        let mut delay = Duration::from_millis(self.config.retry_delay_ms);

        task::spawn_blocking(move || {
            let mut attempt = 0;
            loop {
                let outcome = pool
                    .get()
                    .map_err(RepositoryError::from)
                    .and_then(|mut conn| f.clone()(&mut conn));
                match outcome {
                    Err(e) if e.is_retryable() && attempt < max_retries => {
                        attempt += 1;
                        log::warn!("Retrying record store operation ({attempt}/{max_retries}): {e}");
                        std::thread::sleep(delay);
                        delay *= 2;
                    }
                    other => return other,
                }
            }
        })
        .await
        .map_err(|e| {
            RepositoryError::internal_with_context(e.to_string(), ErrorContext::new("spawn_blocking"))
        })?
    }
}

fn map_diesel_error(err: diesel::result::Error) -> RepositoryError {
    RepositoryError::from(err)
}

#[async_trait]
impl CalibrationRepository for PostgresRepository {
    async fn health_check(&self) -> RepositoryResult<bool> {
        self.with_conn(|conn| {
            sql_query("SELECT 1")
                .execute(conn)
                .map(|_| true)
                .map_err(map_diesel_error)
        })
        .await
    }

    async fn exists(&self, image: &ImageKey) -> RepositoryResult<bool> {
        let image = image.to_string();
        self.with_conn(move |conn| {
            let count: i64 = calibrations::table
                .filter(calibrations::image.eq(&image))
                .count()
                .get_result(conn)
                .map_err(map_diesel_error)?;
            Ok(count > 0)
        })
        .await
    }

    async fn upsert(&self, result: &CalibrationResult) -> RepositoryResult<()> {
        let row = NewCalibrationRow::from(result);
        self.with_conn(move |conn| {
            diesel::insert_into(calibrations::table)
                .values(&row)
                .on_conflict(calibrations::image)
                .do_update()
                .set((
                    calibrations::telescope_id.eq(excluded(calibrations::telescope_id)),
                    calibrations::observed_at.eq(excluded(calibrations::observed_at)),
                    calibrations::site.eq(excluded(calibrations::site)),
                    calibrations::dome.eq(excluded(calibrations::dome)),
                    calibrations::telescope.eq(excluded(calibrations::telescope)),
                    calibrations::camera.eq(excluded(calibrations::camera)),
                    calibrations::filter.eq(excluded(calibrations::filter)),
                    calibrations::airmass.eq(excluded(calibrations::airmass)),
                    calibrations::zeropoint.eq(excluded(calibrations::zeropoint)),
                    calibrations::color_term.eq(excluded(calibrations::color_term)),
                    calibrations::scatter.eq(excluded(calibrations::scatter)),
                    calibrations::matched_pairs.eq(excluded(calibrations::matched_pairs)),
                    calibrations::quality.eq(excluded(calibrations::quality)),
                    calibrations::recorded_at.eq(excluded(calibrations::recorded_at)),
                ))
                .execute(conn)
                .map_err(|e| {
                    map_diesel_error(e).with_operation("upsert_calibration")
                })?;
            Ok(())
        })
        .await
    }

    async fn query(&self, query: &RecordQuery) -> RepositoryResult<Vec<CalibrationResult>> {
        let query = query.clone();
        self.with_conn(move |conn| {
            let mut statement = calibrations::table
                .select(CalibrationRow::as_select())
                .into_boxed();
            if let Some(telescope) = &query.telescope {
                statement = statement.filter(calibrations::telescope_id.eq(telescope.to_string()));
            }
            if let Some(filters) = &query.filters {
                statement = statement.filter(calibrations::filter.eq_any(filters.clone()));
            }
            if let Some(camera) = &query.camera {
                statement = statement.filter(calibrations::camera.eq(camera.clone()));
            }
            if let Some(since) = query.since {
                statement = statement.filter(calibrations::observed_at.ge(since));
            }
            if let Some(until) = query.until {
                statement = statement.filter(calibrations::observed_at.lt(until));
            }

            let rows: Vec<CalibrationRow> = statement
                .order((calibrations::observed_at.asc(), calibrations::image.asc()))
                .load(conn)
                .map_err(map_diesel_error)?;

            rows.into_iter().map(CalibrationRow::into_result).collect()
        })
        .await
    }
}

#[async_trait]
impl TrendRepository for PostgresRepository {
    async fn read_trend(&self, telescope: &TelescopeId, filter: &str) -> RepositoryResult<Vec<TrendPoint>> {
        let telescope = telescope.to_string();
        let filter = filter.to_string();
        self.with_conn(move |conn| {
            let rows: Vec<TrendPointRow> = trend_points::table
                .filter(trend_points::telescope_id.eq(&telescope))
                .filter(trend_points::filter.eq(&filter))
                .order(trend_points::night.asc())
                .select(TrendPointRow::as_select())
                .load(conn)
                .map_err(map_diesel_error)?;
            Ok(rows.iter().map(TrendPoint::from).collect())
        })
        .await
    }

    async fn write_trend(
        &self,
        telescope: &TelescopeId,
        filter: &str,
        points: &[TrendPoint],
    ) -> RepositoryResult<()> {
        let telescope = telescope.to_string();
        let filter = filter.to_string();
        let rows: Vec<TrendPointRow> = points
            .iter()
            .map(|p| TrendPointRow {
                telescope_id: telescope.clone(),
                filter: filter.clone(),
                night: p.night,
                value: p.value,
            })
            .collect();

        self.with_conn(move |conn| {
            conn.transaction(|tx| {
                diesel::delete(
                    trend_points::table
                        .filter(trend_points::telescope_id.eq(&telescope))
                        .filter(trend_points::filter.eq(&filter)),
                )
                .execute(tx)
                .map_err(map_diesel_error)?;

                if !rows.is_empty() {
                    diesel::insert_into(trend_points::table)
                        .values(&rows)
                        .execute(tx)
                        .map_err(map_diesel_error)?;
                }
                Ok(())
            })
        })
        .await
        .map_err(|e| e.with_operation("write_trend"))
    }

    async fn find_trend_models(
        &self,
        class: &TelescopeClass,
        filter: &str,
    ) -> RepositoryResult<Vec<TrendModel>> {
        let filter = filter.to_string();
        let rows: Vec<TrendPointRow> = self
            .with_conn(move |conn| {
                trend_points::table
                    .filter(trend_points::filter.eq(&filter))
                    .order((trend_points::telescope_id.asc(), trend_points::night.asc()))
                    .select(TrendPointRow::as_select())
                    .load(conn)
                    .map_err(map_diesel_error)
            })
            .await?;

        let mut grouped: BTreeMap<String, TrendModel> = BTreeMap::new();
        for row in &rows {
            let telescope = TelescopeId::new(row.telescope_id.clone());
            if &telescope.class() != class {
                continue;
            }
            grouped
                .entry(row.telescope_id.clone())
                .or_insert_with(|| TrendModel {
                    telescope,
                    filter: row.filter.clone(),
                    points: Vec::new(),
                })
                .points
                .push(TrendPoint::from(row));
        }
        Ok(grouped.into_values().collect())
    }
}
