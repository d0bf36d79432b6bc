//! Repository trait for the relational metadata sink.
//!
//! Implementations are thread-safe (`Send + Sync`) and shared across the
//! publishing tasks of a run.

use async_trait::async_trait;

use super::error::RepositoryResult;
use super::models::{AnalysisResult, AnalysisResultId, NewAnalysisResult};
use crate::api::ObjectIdentifier;

#[async_trait]
pub trait ResultRepository: Send + Sync {
    /// Check if the backing store is reachable.
    async fn health_check(&self) -> RepositoryResult<bool>;

    /// Insert one detection result.
    ///
    /// Every call inserts a new row; re-publishing an identifier keeps the
    /// earlier rows.
    ///
    /// # Returns
    /// The id assigned to the new row.
    async fn insert_result(&self, record: &NewAnalysisResult) -> RepositoryResult<AnalysisResultId>;

    /// Most recent result for an identifier.
    async fn latest_result(
        &self,
        star_id: &ObjectIdentifier,
    ) -> RepositoryResult<Option<AnalysisResult>>;

    /// All results in insertion order.
    async fn list_results(&self) -> RepositoryResult<Vec<AnalysisResult>>;
}
