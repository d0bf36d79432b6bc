//! Batch and stage outcome reporting.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

use crate::api::{ObjectIdentifier, Stage};
use crate::error::HandoffError;

/// Result of one stage for one item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ItemStatus {
    /// The stage wrote `artifact`.
    Succeeded { artifact: PathBuf },
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemOutcome {
    pub identifier: ObjectIdentifier,
    pub status: ItemStatus,
}

impl ItemOutcome {
    pub fn succeeded(identifier: ObjectIdentifier, artifact: PathBuf) -> Self {
        Self {
            identifier,
            status: ItemStatus::Succeeded { artifact },
        }
    }

    pub fn failed(identifier: ObjectIdentifier, error: impl Into<String>) -> Self {
        Self {
            identifier,
            status: ItemStatus::Failed {
                error: error.into(),
            },
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.status, ItemStatus::Succeeded { .. })
    }

    pub fn artifact(&self) -> Option<&PathBuf> {
        match &self.status {
            ItemStatus::Succeeded { artifact } => Some(artifact),
            ItemStatus::Failed { .. } => None,
        }
    }
}

/// Success/failure counts for a batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub success: usize,
    pub failure: usize,
}

impl BatchSummary {
    pub fn total(&self) -> usize {
        self.success + self.failure
    }

    pub fn status(&self) -> BatchStatus {
        if self.success > 0 {
            BatchStatus::Success
        } else {
            BatchStatus::Failure
        }
    }
}

/// A batch succeeds when at least one item made it through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchStatus {
    Success,
    Failure,
}

/// Outcomes of one stage, in input order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageReport {
    pub stage: Stage,
    pub outcomes: Vec<ItemOutcome>,
}

impl StageReport {
    pub fn new(stage: Stage, outcomes: Vec<ItemOutcome>) -> Self {
        Self { stage, outcomes }
    }

    pub fn summary(&self) -> BatchSummary {
        let success = self.outcomes.iter().filter(|o| o.is_success()).count();
        BatchSummary {
            success,
            failure: self.outcomes.len() - success,
        }
    }

    /// Identifiers that succeeded, in input order.
    pub fn successes(&self) -> Vec<ObjectIdentifier> {
        self.outcomes
            .iter()
            .filter(|o| o.is_success())
            .map(|o| o.identifier.clone())
            .collect()
    }

    pub fn outcome(&self, identifier: &ObjectIdentifier) -> Option<&ItemOutcome> {
        self.outcomes.iter().find(|o| &o.identifier == identifier)
    }
}

/// Everything a driver invocation produced.
#[derive(Debug)]
pub struct BatchReport {
    pub run_id: Uuid,
    /// Stages that ran, in order
    pub stages: Vec<StageReport>,
    /// Chained stages that could not be started or completed
    pub handoff_errors: Vec<HandoffError>,
    pub summary: BatchSummary,
}

impl BatchReport {
    pub fn status(&self) -> BatchStatus {
        self.summary.status()
    }

    pub fn is_success(&self) -> bool {
        self.status() == BatchStatus::Success
    }

    pub fn stage(&self, stage: Stage) -> Option<&StageReport> {
        self.stages.iter().find(|r| r.stage == stage)
    }

    /// Process exit code: 0 for a successful batch, 1 otherwise.
    pub fn exit_code(&self) -> u8 {
        match self.status() {
            BatchStatus::Success => 0,
            BatchStatus::Failure => 1,
        }
    }

    /// Emit the summary as tracing events.
    pub fn log_summary(&self) {
        for report in &self.stages {
            let summary = report.summary();
            tracing::info!(
                run_id = %self.run_id,
                stage = %report.stage,
                success = summary.success,
                failure = summary.failure,
                "Stage complete"
            );
        }
        for error in &self.handoff_errors {
            tracing::warn!(run_id = %self.run_id, error = %error, "Stage handoff failed");
        }
        tracing::info!(
            run_id = %self.run_id,
            success = self.summary.success,
            failure = self.summary.failure,
            status = ?self.status(),
            "Batch summary"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(value: &str) -> ObjectIdentifier {
        ObjectIdentifier::new(value).unwrap()
    }

    #[test]
    fn test_stage_summary_and_successes() {
        let report = StageReport::new(
            Stage::Acquisition,
            vec![
                ItemOutcome::succeeded(id("TIC 1"), PathBuf::from("a")),
                ItemOutcome::failed(id("TIC 2"), "boom"),
                ItemOutcome::succeeded(id("TIC 3"), PathBuf::from("c")),
            ],
        );
        assert_eq!(report.summary(), BatchSummary { success: 2, failure: 1 });
        assert_eq!(report.successes(), vec![id("TIC 1"), id("TIC 3")]);
        assert!(report.outcome(&id("TIC 2")).unwrap().artifact().is_none());
    }

    #[test]
    fn test_zero_success_is_failure() {
        let summary = BatchSummary { success: 0, failure: 3 };
        assert_eq!(summary.status(), BatchStatus::Failure);
        let report = BatchReport {
            run_id: Uuid::new_v4(),
            stages: vec![],
            handoff_errors: vec![],
            summary,
        };
        assert_eq!(report.exit_code(), 1);
    }

    #[test]
    fn test_item_status_serializes_with_tag() {
        let json = serde_json::to_value(ItemOutcome::failed(id("TIC 2"), "boom")).unwrap();
        assert_eq!(json["status"]["status"], "failed");
        assert_eq!(json["status"]["error"], "boom");
    }
}
