//! In-memory repository for tests and local runs.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::Arc;

use crate::api::ObjectIdentifier;
use crate::db::error::{RepositoryError, RepositoryResult};
use crate::db::models::{AnalysisResult, AnalysisResultId, NewAnalysisResult};
use crate::db::repository::ResultRepository;

#[derive(Default)]
struct LocalData {
    results: Vec<AnalysisResult>,
    next_id: AnalysisResultId,
}

/// Results kept in process memory; lost when the process exits.
#[derive(Clone, Default)]
pub struct LocalRepository {
    data: Arc<RwLock<LocalData>>,
}

impl LocalRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.data.read().results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.read().results.is_empty()
    }
}

#[async_trait]
impl ResultRepository for LocalRepository {
    async fn health_check(&self) -> RepositoryResult<bool> {
        Ok(true)
    }

    async fn insert_result(&self, record: &NewAnalysisResult) -> RepositoryResult<AnalysisResultId> {
        let values = [
            record.candidate.period,
            record.candidate.duration,
            record.candidate.depth,
            record.candidate.power,
        ];
        if values.iter().flatten().any(|v| !v.is_finite()) {
            return Err(RepositoryError::validation(format!(
                "non-finite value in result for {}",
                record.star_id
            ))
            .with_operation("insert_result"));
        }

        let mut data = self.data.write();
        data.next_id += 1;
        let id = data.next_id;
        data.results.push(AnalysisResult {
            id,
            star_id: record.star_id.clone(),
            candidate: record.candidate,
            visualization_uri: record.visualization_uri.clone(),
            recorded_at: record.recorded_at,
        });
        Ok(id)
    }

    async fn latest_result(
        &self,
        star_id: &ObjectIdentifier,
    ) -> RepositoryResult<Option<AnalysisResult>> {
        Ok(self
            .data
            .read()
            .results
            .iter()
            .rev()
            .find(|r| &r.star_id == star_id)
            .cloned())
    }

    async fn list_results(&self) -> RepositoryResult<Vec<AnalysisResult>> {
        Ok(self.data.read().results.clone())
    }
}
