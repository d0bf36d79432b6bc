//! Records stored by the metadata sink.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::api::{ObjectIdentifier, TransitCandidate};

/// Row identifier assigned by the repository.
pub type AnalysisResultId = i64;

/// A detection result ready to be recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAnalysisResult {
    pub star_id: ObjectIdentifier,
    pub candidate: TransitCandidate,
    /// Where the metrics chart was published, if anywhere
    pub visualization_uri: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

impl NewAnalysisResult {
    pub fn new(star_id: ObjectIdentifier, candidate: TransitCandidate) -> Self {
        Self {
            star_id,
            candidate,
            visualization_uri: None,
            recorded_at: Utc::now(),
        }
    }

    pub fn with_visualization_uri(mut self, uri: Option<String>) -> Self {
        self.visualization_uri = uri;
        self
    }
}

/// A recorded detection result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub id: AnalysisResultId,
    pub star_id: ObjectIdentifier,
    pub candidate: TransitCandidate,
    pub visualization_uri: Option<String>,
    pub recorded_at: DateTime<Utc>,
}
