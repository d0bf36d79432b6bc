use chrono::{DateTime, Utc};
use diesel::prelude::*;

use super::schema::analysis_results;
use crate::api::{ObjectIdentifier, TransitCandidate};
use crate::db::error::{RepositoryError, RepositoryResult};
use crate::db::models::{AnalysisResult, NewAnalysisResult};

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = analysis_results)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct AnalysisResultRow {
    pub id: i64,
    pub star_id: String,
    pub period: Option<f64>,
    pub duration: Option<f64>,
    pub depth: Option<f64>,
    pub power: Option<f64>,
    pub visualization_uri: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = analysis_results)]
pub struct NewAnalysisResultRow {
    pub star_id: String,
    pub period: Option<f64>,
    pub duration: Option<f64>,
    pub depth: Option<f64>,
    pub power: Option<f64>,
    pub visualization_uri: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

impl From<&NewAnalysisResult> for NewAnalysisResultRow {
    fn from(record: &NewAnalysisResult) -> Self {
        Self {
            star_id: record.star_id.to_string(),
            period: record.candidate.period,
            duration: record.candidate.duration,
            depth: record.candidate.depth,
            power: record.candidate.power,
            visualization_uri: record.visualization_uri.clone(),
            recorded_at: record.recorded_at,
        }
    }
}

impl TryFrom<AnalysisResultRow> for AnalysisResult {
    type Error = RepositoryError;

    fn try_from(row: AnalysisResultRow) -> RepositoryResult<Self> {
        let star_id = ObjectIdentifier::new(row.star_id)
            .map_err(|e| RepositoryError::internal(format!("Stored star_id is invalid: {}", e)))?;
        Ok(Self {
            id: row.id,
            star_id,
            candidate: TransitCandidate {
                period: row.period,
                duration: row.duration,
                depth: row.depth,
                power: row.power,
            },
            visualization_uri: row.visualization_uri,
            recorded_at: row.recorded_at,
        })
    }
}
