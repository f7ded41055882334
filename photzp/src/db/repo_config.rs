//! Record store selection from a TOML file.
//!
//! ```toml
//! [repository]
//! type = "postgres"
//!
//! [postgres]
//! database_url = "postgres://photzp@db/photzp"
//! max_connections = 4
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use super::factory::RepositoryType;
use super::repository::RepositoryError;
use crate::db::PostgresConfig;

/// Environment variable naming an explicit store configuration file.
pub const REPOSITORY_CONFIG_ENV: &str = "PHOTZP_REPOSITORY_CONFIG";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RepositoryConfig {
    #[serde(default)]
    pub repository: RepositorySettings,
    #[serde(default)]
    pub postgres: PostgresSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositorySettings {
    #[serde(rename = "type")]
    pub repo_type: String,
}

impl Default for RepositorySettings {
    fn default() -> Self {
        Self {
            repo_type: "local".to_string(),
        }
    }
}

/// Postgres connection settings. Defaults match [`PostgresConfig`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PostgresSettings {
    pub database_url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout: u64,
    pub idle_timeout: u64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
}

impl Default for PostgresSettings {
    fn default() -> Self {
        Self {
            database_url: String::new(),
            max_connections: 10,
            min_connections: 1,
            connect_timeout: 30,
            idle_timeout: 600,
            max_retries: 3,
            retry_delay_ms: 100,
        }
    }
}

impl RepositoryConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, RepositoryError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            RepositoryError::configuration(format!(
                "Failed to read store config {}: {}",
                path.display(),
                e
            ))
        })?;
        toml::from_str(&content).map_err(|e| {
            RepositoryError::configuration(format!(
                "Failed to parse store config {}: {}",
                path.display(),
                e
            ))
        })
    }

    /// Load from `$PHOTZP_REPOSITORY_CONFIG`, else the first of
    /// `repository.toml` or `config/repository.toml` that exists.
    pub fn from_default_location() -> Result<Self, RepositoryError> {
        if let Ok(explicit) = std::env::var(REPOSITORY_CONFIG_ENV) {
            return Self::from_file(explicit);
        }

        let search_paths = [
            PathBuf::from("repository.toml"),
            PathBuf::from("config/repository.toml"),
        ];
        for path in search_paths {
            if path.exists() {
                return Self::from_file(&path);
            }
        }

        Err(RepositoryError::configuration(
            "No repository.toml found in standard locations",
        ))
    }

    pub fn repository_type(&self) -> Result<RepositoryType, RepositoryError> {
        RepositoryType::from_str(&self.repository.repo_type).map_err(RepositoryError::configuration)
    }

    /// Postgres settings when the file selects Postgres, `None` otherwise.
    #[cfg(feature = "postgres-repo")]
    pub fn to_postgres_config(&self) -> Result<Option<PostgresConfig>, RepositoryError> {
        if self.repository_type()? != RepositoryType::Postgres {
            return Ok(None);
        }
        if self.postgres.database_url.is_empty() {
            return Err(RepositoryError::configuration(
                "Postgres store requires 'postgres.database_url'",
            ));
        }

        Ok(Some(PostgresConfig {
            database_url: self.postgres.database_url.clone(),
            max_pool_size: self.postgres.max_connections,
            min_pool_size: self.postgres.min_connections,
            connection_timeout_sec: self.postgres.connect_timeout,
            idle_timeout_sec: self.postgres.idle_timeout,
            max_retries: self.postgres.max_retries,
            retry_delay_ms: self.postgres.retry_delay_ms,
        }))
    }

    #[cfg(not(feature = "postgres-repo"))]
    pub fn to_postgres_config(&self) -> Result<Option<PostgresConfig>, RepositoryError> {
        if self.repository_type()? == RepositoryType::Postgres {
            return Err(RepositoryError::configuration(
                "Postgres store feature not enabled",
            ));
        }
        Ok(None)
    }
}
