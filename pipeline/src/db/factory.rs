//! Repository factory for dependency injection.
//!
//! Selects and constructs the metadata store behind [`ResultRepository`]
//! from runtime configuration.

use std::str::FromStr;
use std::sync::Arc;

use super::config::PostgresConfig;
use super::error::{RepositoryError, RepositoryResult};
use super::repositories::LocalRepository;
#[cfg(feature = "postgres-repo")]
use super::repositories::PostgresRepository;
use super::repository::ResultRepository;
use crate::error::ErrorContext;

/// Repository type configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepositoryType {
    /// Postgres + Diesel implementation
    Postgres,
    /// In-memory local repository
    Local,
}

impl FromStr for RepositoryType {
    type Err = String;

    /// Parse repository type from string.
    ///
    /// # Arguments
    /// * `s` - String representation ("postgres", "pg", "local")
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "postgres" | "pg" => Ok(Self::Postgres),
            "local" | "memory" => Ok(Self::Local),
            _ => Err(format!("Unknown repository type: {}", s)),
        }
    }
}

impl RepositoryType {
    /// Get repository type from environment variables.
    ///
    /// Reads `REPOSITORY_TYPE`. Without it, a database URL selects Postgres.
    /// When neither is present the metadata store is unconfigured.
    pub fn from_env() -> RepositoryResult<Self> {
        if let Ok(val) = std::env::var("REPOSITORY_TYPE") {
            return val.parse().map_err(|e: String| {
                RepositoryError::ConfigurationError {
                    message: e,
                    context: ErrorContext::new("repository_type_from_env")
                        .with_details(format!("REPOSITORY_TYPE={}", val)),
                }
            });
        }

        if std::env::var("DATABASE_URL").is_ok() || std::env::var("PG_DATABASE_URL").is_ok() {
            Ok(Self::Postgres)
        } else {
            Err(RepositoryError::configuration(
                "Metadata store not configured: set REPOSITORY_TYPE or DATABASE_URL",
            ))
        }
    }
}

/// Repository factory for creating repository instances.
///
/// # Example
/// ```ignore
/// use transit_pipeline::db::{RepositoryFactory, RepositoryType};
///
/// let repo = RepositoryFactory::create(RepositoryType::Local, None).await?;
/// ```
pub struct RepositoryFactory;

impl RepositoryFactory {
    /// Create a repository instance based on type.
    ///
    /// # Arguments
    /// * `repo_type` - Type of repository to create
    /// * `postgres_config` - Optional database configuration (required for Postgres)
    ///
    /// # Returns
    /// * `Ok(Arc<dyn ResultRepository>)` - Shared repository instance
    /// * `Err(RepositoryError)` - If creation fails
    pub async fn create(
        repo_type: RepositoryType,
        postgres_config: Option<&PostgresConfig>,
    ) -> RepositoryResult<Arc<dyn ResultRepository>> {
        match repo_type {
            RepositoryType::Postgres => {
                #[cfg(feature = "postgres-repo")]
                {
                    let config = postgres_config.ok_or_else(|| {
                        RepositoryError::configuration(
                            "Postgres repository requires PostgresConfig",
                        )
                    })?;
                    let pg = Self::create_postgres(config).await?;
                    Ok(pg as Arc<dyn ResultRepository>)
                }
                #[cfg(not(feature = "postgres-repo"))]
                {
                    let _ = postgres_config;
                    Err(RepositoryError::configuration(
                        "Postgres repository feature not enabled",
                    ))
                }
            }
            RepositoryType::Local => Ok(Self::create_local()),
        }
    }

    /// Create a Postgres repository, running pending migrations.
    #[cfg(feature = "postgres-repo")]
    pub async fn create_postgres(
        config: &PostgresConfig,
    ) -> RepositoryResult<Arc<PostgresRepository>> {
        let config = config.clone();
        let repo = tokio::task::spawn_blocking(move || PostgresRepository::new(config))
            .await
            .map_err(|e| {
                RepositoryError::internal_with_context(
                    format!("Task join error: {}", e),
                    ErrorContext::new("create_postgres"),
                )
            })??;
        Ok(Arc::new(repo))
    }

    /// Create an in-memory local repository.
    pub fn create_local() -> Arc<dyn ResultRepository> {
        Arc::new(LocalRepository::new())
    }

    /// Create repository from environment configuration.
    ///
    /// # Returns
    /// * `Ok(Arc<dyn ResultRepository>)` - Repository instance
    /// * `Err(RepositoryError)` - If the store is unconfigured or creation fails
    pub async fn from_env() -> RepositoryResult<Arc<dyn ResultRepository>> {
        match RepositoryType::from_env()? {
            RepositoryType::Postgres => {
                let config =
                    PostgresConfig::from_env().map_err(RepositoryError::configuration)?;
                Self::create(RepositoryType::Postgres, Some(&config)).await
            }
            RepositoryType::Local => Ok(Self::create_local()),
        }
    }
}
