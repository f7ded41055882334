//! Record store for calibration results and throughput trends.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │  Services (calibration, trends, batch)                  │
//! └───────────────────┬─────────────────────────────────────┘
//!                     │  Arc<dyn FullRepository>
//! ┌───────────────────▼─────────────────────────────────────┐
//! │  Repository traits (repository/)                        │
//! └───────────────────┬─────────────────────────────────────┘
//!            ┌────────┴─────────┐
//!     ┌──────▼──────┐    ┌──────▼──────┐
//!     │   Local     │    │  Postgres   │
//!     │ (in-memory) │    │  (Diesel)   │
//!     └─────────────┘    └─────────────┘
//! ```
//!
//! Services never reach for a process-wide store: the repository is built
//! once by [`RepositoryFactory`] and handed to the pipeline context.

#[cfg(not(any(feature = "postgres-repo", feature = "local-repo")))]
compile_error!("Enable at least one repository backend feature.");

pub mod factory;
pub mod models;
pub mod repo_config;
pub mod repositories;
pub mod repository;

// Postgres config is colocated with the repository implementation.
#[cfg(feature = "postgres-repo")]
pub use repositories::postgres::PostgresConfig;
#[cfg(not(feature = "postgres-repo"))]
#[derive(Debug, Clone)]
pub struct PostgresConfig {
    _private: (),
}

pub use factory::{RepositoryBuilder, RepositoryFactory, RepositoryType};
pub use models::RecordQuery;
pub use repo_config::RepositoryConfig;
pub use repositories::LocalRepository;
#[cfg(feature = "postgres-repo")]
pub use repositories::PostgresRepository;
pub use repository::{
    CalibrationRepository, ErrorContext, FullRepository, RepositoryError, RepositoryResult,
    TrendRepository,
};
