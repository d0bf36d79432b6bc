//! Relational metadata store for detection results.
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │  ResultPublisher (services::publishing)      │
//! └───────────────────┬──────────────────────────┘
//!                     │
//! ┌───────────────────▼──────────────────────────┐
//! │  ResultRepository trait (repository.rs)      │
//! └───────────────────┬──────────────────────────┘
//!                     │
//!     ┌───────────────┴───────────────┐
//!     │ LocalRepository  │  PostgresRepository │
//!     │  (in-memory)     │  (postgres-repo)    │
//!     └───────────────────────────────┘
//! ```
//!
//! Use [`RepositoryFactory::from_env`] to obtain the configured store.

#[cfg(not(any(feature = "postgres-repo", feature = "local-repo")))]
compile_error!("Enable at least one repository backend feature.");

pub mod config;
pub mod error;
pub mod factory;
pub mod models;
pub mod repositories;
pub mod repository;

pub use config::PostgresConfig;
pub use error::{RepositoryError, RepositoryResult};
pub use factory::{RepositoryFactory, RepositoryType};
pub use models::{AnalysisResult, AnalysisResultId, NewAnalysisResult};
pub use repositories::LocalRepository;
#[cfg(feature = "postgres-repo")]
pub use repositories::PostgresRepository;
pub use repository::ResultRepository;
