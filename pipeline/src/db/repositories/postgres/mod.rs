//! Postgres repository implementation using Diesel.
//!
//! ## Features
//!
//! - Connection pooling with r2d2
//! - Automatic retry for transient failures
//! - Automatic migration execution
//!
//! ## Configuration
//!
//! See [`PostgresConfig::from_env`].

use async_trait::async_trait;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool};
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use std::time::Duration;
use tokio::task;

use crate::api::ObjectIdentifier;
use crate::db::config::PostgresConfig;
use crate::db::error::{RepositoryError, RepositoryResult};
use crate::db::models::{AnalysisResult, AnalysisResultId, NewAnalysisResult};
use crate::db::repository::ResultRepository;
use crate::error::ErrorContext;

mod models;
mod schema;

use models::{AnalysisResultRow, NewAnalysisResultRow};
use schema::analysis_results;

type PgPool = Pool<ConnectionManager<PgConnection>>;

const MIGRATIONS: EmbeddedMigrations = embed_migrations!("src/db/repositories/postgres/migrations");

/// Diesel-backed repository for Postgres.
#[derive(Clone)]
pub struct PostgresRepository {
    pool: PgPool,
    config: PostgresConfig,
}

impl PostgresRepository {
    /// Create a new repository and run pending migrations.
    ///
    /// # Arguments
    /// * `config` - Database configuration
    ///
    /// # Returns
    /// * `Ok(PostgresRepository)` on success
    /// * `Err(RepositoryError)` if connection or migration fails
    pub fn new(config: PostgresConfig) -> RepositoryResult<Self> {
        let manager = ConnectionManager::<PgConnection>::new(&config.database_url);

        let pool = Pool::builder()
            .max_size(config.max_pool_size)
            .connection_timeout(Duration::from_secs(config.connection_timeout_sec))
            .test_on_check_out(true)
            .build(manager)
            .map_err(|e| {
                RepositoryError::connection_with_context(
                    e.to_string(),
                    ErrorContext::new("create_pool")
                        .with_details(format!("max_size={}", config.max_pool_size)),
                )
            })?;

        {
            let mut conn = pool.get().map_err(|e| {
                RepositoryError::connection_with_context(
                    e.to_string(),
                    ErrorContext::new("get_connection_for_migrations"),
                )
            })?;
            conn.run_pending_migrations(MIGRATIONS).map_err(|e| {
                RepositoryError::internal_with_context(
                    format!("Migration failed: {}", e),
                    ErrorContext::new("run_migrations"),
                )
            })?;
        }

        Ok(Self { pool, config })
    }

    /// Execute a database operation with automatic retry for transient failures.
    async fn with_conn<T, F>(&self, operation: &'static str, f: F) -> RepositoryResult<T>
    where
        T: Send + 'static,
        F: Fn(&mut PgConnection) -> RepositoryResult<T> + Send + 'static,
    {
        let pool = self.pool.clone();
        let max_retries = self.config.max_retries;
        let retry_delay_ms = self.config.retry_delay_ms;

        task::spawn_blocking(move || {
            let mut retry_delay = Duration::from_millis(retry_delay_ms);
            let mut attempt = 0;
            loop {
                let result = pool
                    .get()
                    .map_err(|e| {
                        RepositoryError::connection_with_context(
                            e.to_string(),
                            ErrorContext::new(operation)
                                .with_details(format!("attempt={}", attempt + 1)),
                        )
                    })
                    .and_then(|mut conn| f(&mut conn));

                match result {
                    Err(e) if e.is_retryable() && attempt < max_retries => {
                        tracing::warn!(operation, attempt, error = %e, "Retrying database operation");
                        std::thread::sleep(retry_delay);
                        retry_delay *= 2;
                        attempt += 1;
                    }
                    other => return other.map_err(|e| e.with_operation(operation)),
                }
            }
        })
        .await
        .map_err(|e| {
            RepositoryError::internal_with_context(
                format!("Task join error: {}", e),
                ErrorContext::new("spawn_blocking"),
            )
        })?
    }
}

#[async_trait]
impl ResultRepository for PostgresRepository {
    async fn health_check(&self) -> RepositoryResult<bool> {
        self.with_conn("health_check", |conn| {
            diesel::sql_query("SELECT 1").execute(conn)?;
            Ok(true)
        })
        .await
    }

    async fn insert_result(&self, record: &NewAnalysisResult) -> RepositoryResult<AnalysisResultId> {
        let row = NewAnalysisResultRow::from(record);
        self.with_conn("insert_result", move |conn| {
            let id = diesel::insert_into(analysis_results::table)
                .values(&row)
                .returning(analysis_results::id)
                .get_result::<i64>(conn)?;
            Ok(id)
        })
        .await
    }

    async fn latest_result(
        &self,
        star_id: &ObjectIdentifier,
    ) -> RepositoryResult<Option<AnalysisResult>> {
        let star_id = star_id.to_string();
        let row = self
            .with_conn("latest_result", move |conn| {
                let row = analysis_results::table
                    .filter(analysis_results::star_id.eq(&star_id))
                    .order((analysis_results::recorded_at.desc(), analysis_results::id.desc()))
                    .select(AnalysisResultRow::as_select())
                    .first(conn)
                    .optional()?;
                Ok(row)
            })
            .await?;
        row.map(AnalysisResult::try_from).transpose()
    }

    async fn list_results(&self) -> RepositoryResult<Vec<AnalysisResult>> {
        let rows = self
            .with_conn("list_results", |conn| {
                let rows = analysis_results::table
                    .order(analysis_results::id.asc())
                    .select(AnalysisResultRow::as_select())
                    .load(conn)?;
                Ok(rows)
            })
            .await?;
        rows.into_iter().map(AnalysisResult::try_from).collect()
    }
}
