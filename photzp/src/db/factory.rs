//! Record store construction from runtime configuration.

use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use super::repo_config::RepositoryConfig;
use super::repositories::LocalRepository;
#[cfg(feature = "postgres-repo")]
use super::repositories::PostgresRepository;
use super::repository::{FullRepository, RepositoryError, RepositoryResult};
use super::PostgresConfig;

/// Record store backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepositoryType {
    /// Postgres + Diesel implementation
    Postgres,
    /// In-memory local repository
    Local,
}

impl FromStr for RepositoryType {
    type Err = String;

    /// Accepts "postgres", "pg" and "local", case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "postgres" | "pg" => Ok(Self::Postgres),
            "local" => Ok(Self::Local),
            _ => Err(format!("Unknown repository type: {}", s)),
        }
    }
}

impl RepositoryType {
    /// Reads `REPOSITORY_TYPE`. Without it, Postgres if a database URL is
    /// present, otherwise Local.
    pub fn from_env() -> Self {
        if let Ok(val) = std::env::var("REPOSITORY_TYPE") {
            return val.parse().unwrap_or(Self::Local);
        }

        if std::env::var("DATABASE_URL").is_ok() || std::env::var("PG_DATABASE_URL").is_ok() {
            Self::Postgres
        } else {
            Self::Local
        }
    }
}

/// Creates record stores.
///
/// # Example
/// ```ignore
/// use photzp::db::{RepositoryFactory, RepositoryType};
///
/// let store = RepositoryFactory::create(RepositoryType::Local, None).await?;
/// let context = PipelineContext::new(store, PhotzpConfig::bundled()?);
/// ```
pub struct RepositoryFactory;

impl RepositoryFactory {
    /// Create a store of the given type. Postgres requires `postgres_config`.
    pub async fn create(
        repo_type: RepositoryType,
        postgres_config: Option<&PostgresConfig>,
    ) -> RepositoryResult<Arc<dyn FullRepository>> {
        match repo_type {
            RepositoryType::Local => Ok(Self::create_local()),
            RepositoryType::Postgres => {
                #[cfg(feature = "postgres-repo")]
                {
                    let config = postgres_config.ok_or_else(|| {
                        RepositoryError::configuration("Postgres store requires PostgresConfig")
                    })?;
                    let pg = Self::create_postgres(config).await?;
                    Ok(pg as Arc<dyn FullRepository>)
                }
                #[cfg(not(feature = "postgres-repo"))]
                {
                    let _ = postgres_config;
                    Err(RepositoryError::configuration(
                        "Postgres store feature not enabled",
                    ))
                }
            }
        }
    }

    /// Connect to Postgres and run pending migrations.
    #[cfg(feature = "postgres-repo")]
    pub async fn create_postgres(
        config: &PostgresConfig,
    ) -> RepositoryResult<Arc<PostgresRepository>> {
        let config = config.clone();
        let repo = tokio::task::spawn_blocking(move || PostgresRepository::new(config))
            .await
            .map_err(|e| RepositoryError::internal(format!("Task join error: {}", e)))??;
        log::info!("Connected Postgres record store");
        Ok(Arc::new(repo))
    }

    pub fn create_local() -> Arc<dyn FullRepository> {
        Arc::new(LocalRepository::new())
    }

    /// Create a store selected by `REPOSITORY_TYPE` and the Postgres
    /// environment variables.
    pub async fn from_env() -> RepositoryResult<Arc<dyn FullRepository>> {
        let repo_type = RepositoryType::from_env();
        let postgres_config = match repo_type {
            RepositoryType::Postgres => Some(postgres_config_from_env()?),
            RepositoryType::Local => None,
        };
        Self::create(repo_type, postgres_config.as_ref()).await
    }

    /// Create a store described by a `repository.toml` file.
    pub async fn from_config_file<P: AsRef<Path>>(
        config_path: P,
    ) -> RepositoryResult<Arc<dyn FullRepository>> {
        let config = RepositoryConfig::from_file(config_path)?;
        Self::from_repository_config(&config).await
    }

    /// Create a store from the `repository.toml` found by
    /// [`RepositoryConfig::from_default_location`].
    pub async fn from_default_config() -> RepositoryResult<Arc<dyn FullRepository>> {
        let config = RepositoryConfig::from_default_location()?;
        Self::from_repository_config(&config).await
    }

    async fn from_repository_config(
        config: &RepositoryConfig,
    ) -> RepositoryResult<Arc<dyn FullRepository>> {
        let repo_type = config.repository_type()?;
        let postgres_config = config.to_postgres_config()?;
        Self::create(repo_type, postgres_config.as_ref()).await
    }
}

#[cfg(feature = "postgres-repo")]
fn postgres_config_from_env() -> RepositoryResult<PostgresConfig> {
    PostgresConfig::from_env().map_err(RepositoryError::configuration)
}

#[cfg(not(feature = "postgres-repo"))]
fn postgres_config_from_env() -> RepositoryResult<PostgresConfig> {
    Err(RepositoryError::configuration(
        "Postgres store feature not enabled",
    ))
}

/// Fluent configuration of a record store.
///
/// ```ignore
/// let store = RepositoryBuilder::new()
///     .repository_type(RepositoryType::Postgres)
///     .postgres_config(PostgresConfig::with_url(url))
///     .build()
///     .await?;
/// ```
pub struct RepositoryBuilder {
    repo_type: RepositoryType,
    postgres_config: Option<PostgresConfig>,
}

impl RepositoryBuilder {
    /// Starts from [`RepositoryType::from_env`].
    pub fn new() -> Self {
        Self {
            repo_type: RepositoryType::from_env(),
            postgres_config: None,
        }
    }

    pub fn repository_type(mut self, repo_type: RepositoryType) -> Self {
        self.repo_type = repo_type;
        self
    }

    pub fn postgres_config(mut self, config: PostgresConfig) -> Self {
        self.postgres_config = Some(config);
        self
    }

    /// Take backend and connection settings from a `repository.toml`.
    pub fn from_config_file<P: AsRef<Path>>(mut self, config_path: P) -> RepositoryResult<Self> {
        let repo_config = RepositoryConfig::from_file(config_path)?;
        self.repo_type = repo_config.repository_type()?;
        self.postgres_config = repo_config.to_postgres_config()?;
        Ok(self)
    }

    pub async fn build(self) -> RepositoryResult<Arc<dyn FullRepository>> {
        RepositoryFactory::create(self.repo_type, self.postgres_config.as_ref()).await
    }
}

impl Default for RepositoryBuilder {
    fn default() -> Self {
        Self::new()
    }
}
