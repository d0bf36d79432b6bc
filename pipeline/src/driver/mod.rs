//! Batch orchestration.
//!
//! The driver runs stages over a batch of identifiers, stage by stage. Each
//! stage receives only the items the previous stage succeeded for; a failed
//! item is recorded and dropped from the batch without affecting the others.
//! When a stage succeeds for no item the batch fails and later stages are not
//! started.

pub mod handoff;
pub mod report;

use futures::stream::{self, StreamExt};
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::api::{DetectionParameters, ObjectIdentifier, Stage};
use crate::artifacts::ArtifactLayout;
use crate::config::{ExecutionSettings, PipelineConfig};
use crate::error::PipelineError;
use crate::services::acquisition::{LightCurveProvider, SeriesAcquirer};
use crate::services::detection::DetectionStage;
use crate::services::preprocessing::SeriesPreprocessor;
use crate::services::publishing::ResultPublisher;
use crate::services::run_tracker::RunTracker;

pub use handoff::StageHandoff;
pub use report::{BatchReport, BatchStatus, BatchSummary, ItemOutcome, ItemStatus, StageReport};

/// Read-only state of one driver invocation.
#[derive(Clone)]
pub struct PipelineRun {
    pub run_id: Uuid,
    pub identifiers: Vec<ObjectIdentifier>,
    pub layout: ArtifactLayout,
    pub parameters: DetectionParameters,
    pub min_samples: usize,
    pub execution: ExecutionSettings,
    pub tracker: RunTracker,
}

impl PipelineRun {
    pub fn from_config(config: &PipelineConfig, identifiers: Vec<ObjectIdentifier>) -> Self {
        let tracker = RunTracker::new();
        Self {
            run_id: tracker.run_id(),
            identifiers,
            layout: config.artifact_layout(),
            parameters: config.bls_parameters.clone(),
            min_samples: config.analyze_transits.min_samples,
            execution: config.pipeline.clone(),
            tracker,
        }
    }
}

/// The four item stages, wired to their collaborators.
#[derive(Clone)]
pub struct StageSet {
    pub acquirer: SeriesAcquirer,
    pub preprocessor: SeriesPreprocessor,
    pub detector: DetectionStage,
    pub publisher: ResultPublisher,
}

impl StageSet {
    pub fn new(
        acquirer: SeriesAcquirer,
        preprocessor: SeriesPreprocessor,
        detector: DetectionStage,
        publisher: ResultPublisher,
    ) -> Self {
        Self {
            acquirer,
            preprocessor,
            detector,
            publisher,
        }
    }

    /// Stages sharing the run's artifact layout.
    pub fn for_run(
        run: &PipelineRun,
        provider: Arc<dyn LightCurveProvider>,
        publisher: ResultPublisher,
    ) -> Self {
        Self::new(
            SeriesAcquirer::new(provider, run.layout.clone()),
            SeriesPreprocessor::new(run.layout.clone()),
            DetectionStage::new(run.layout.clone(), run.parameters.clone(), run.min_samples),
            publisher,
        )
    }

    /// Read processed series for detection from `dir`.
    pub fn with_detection_input(mut self, dir: impl Into<PathBuf>) -> Self {
        self.detector = self.detector.with_input_dir(dir);
        self
    }
}

#[derive(Clone)]
pub struct PipelineDriver {
    run: Arc<PipelineRun>,
    stages: Arc<StageSet>,
}

impl PipelineDriver {
    pub fn new(run: PipelineRun, stages: StageSet) -> Self {
        Self {
            run: Arc::new(run),
            stages: Arc::new(stages),
        }
    }

    pub fn run_info(&self) -> &PipelineRun {
        &self.run
    }

    pub fn tracker(&self) -> &RunTracker {
        &self.run.tracker
    }

    /// Run every item stage over the run's identifiers.
    ///
    /// The summary counts published items as successes and every other item
    /// as a failure.
    pub async fn run(&self) -> BatchReport {
        let identifiers = self.run.identifiers.clone();
        self.run.tracker.register(&identifiers);
        tracing::info!(
            run_id = %self.run.run_id,
            items = identifiers.len(),
            "Starting pipeline run"
        );

        let mut stages = Vec::new();
        let mut current = identifiers.clone();
        for stage in Stage::ITEM_STAGES {
            let report = self.run_stage(stage, &current).await;
            current = report.successes();
            stages.push(report);
            if current.is_empty() {
                tracing::error!(stage = %stage, "No item succeeded; stopping the batch");
                break;
            }
        }

        let published = stages
            .iter()
            .find(|r| r.stage == Stage::Publishing)
            .map(|r| r.summary().success)
            .unwrap_or(0);
        let report = BatchReport {
            run_id: self.run.run_id,
            stages,
            handoff_errors: Vec::new(),
            summary: BatchSummary {
                success: published,
                failure: identifiers.len() - published,
            },
        };
        report.log_summary();
        report
    }

    /// Run one stage over `identifiers`, optionally chaining to the next.
    ///
    /// The batch status is that of `stage`; a chained stage is reported in
    /// `stages` and its failure in `handoff_errors`.
    pub async fn run_single(
        &self,
        stage: Stage,
        identifiers: &[ObjectIdentifier],
        chain: bool,
    ) -> BatchReport {
        self.run.tracker.register(identifiers);
        let first = self.run_stage(stage, identifiers).await;
        let summary = first.summary();

        let mut stages = vec![first];
        let mut handoff_errors = Vec::new();
        if chain && summary.success > 0 {
            let (next, error) = StageHandoff::new(stage).trigger(self, &stages[0]).await;
            stages.extend(next);
            handoff_errors.extend(error);
        }

        let report = BatchReport {
            run_id: self.run.run_id,
            stages,
            handoff_errors,
            summary,
        };
        report.log_summary();
        report
    }

    /// Run `stage` for each identifier on the bounded worker pool.
    ///
    /// Outcomes come back in input order.
    pub async fn run_stage(&self, stage: Stage, identifiers: &[ObjectIdentifier]) -> StageReport {
        let width = self.run.execution.max_concurrency.max(1);
        let mut results: Vec<(usize, ItemOutcome)> = stream::iter(identifiers.iter().cloned().enumerate())
            .map(|(index, identifier)| async move {
                let outcome = match self.run_item(stage, &identifier).await {
                    Ok(artifact) => {
                        self.run.tracker.advance(&identifier, stage);
                        ItemOutcome::succeeded(identifier, artifact)
                    }
                    Err(e) => {
                        self.run.tracker.fail(&identifier, stage, e.to_string());
                        ItemOutcome::failed(identifier, e.to_string())
                    }
                };
                (index, outcome)
            })
            .buffer_unordered(width)
            .collect()
            .await;
        results.sort_by_key(|(index, _)| *index);

        StageReport::new(stage, results.into_iter().map(|(_, o)| o).collect())
    }

    async fn run_item(
        &self,
        stage: Stage,
        identifier: &ObjectIdentifier,
    ) -> Result<PathBuf, PipelineError> {
        let tracker = &self.run.tracker;
        match stage {
            Stage::Catalog => Err(PipelineError::Worker {
                stage,
                message: "the catalog stage does not run per item".to_string(),
            }),
            Stage::Acquisition => {
                self.with_timeout(stage, async {
                    let raw = self.stages.acquirer.acquire(identifier, tracker).await?;
                    Ok::<_, PipelineError>(raw)
                })
                .await
            }
            Stage::Preprocessing => {
                let stages = Arc::clone(&self.stages);
                let id = identifier.clone();
                let tracker = tracker.clone();
                self.blocking(stage, move || {
                    Ok(stages.preprocessor.process(&id, &tracker)?)
                })
                .await
            }
            Stage::Detection => {
                let stages = Arc::clone(&self.stages);
                let id = identifier.clone();
                let tracker = tracker.clone();
                self.blocking(stage, move || {
                    let (_, results) = stages.detector.analyze(&id, &tracker)?;
                    Ok(results)
                })
                .await
            }
            Stage::Publishing => {
                self.with_timeout(stage, async {
                    let results = self.run.layout.results(identifier);
                    let outcome = self
                        .stages
                        .publisher
                        .publish_results(&results, identifier, tracker)
                        .await?;
                    Ok::<_, PipelineError>(outcome.visualization.unwrap_or(results))
                })
                .await
            }
        }
    }

    async fn blocking<F>(&self, stage: Stage, work: F) -> Result<PathBuf, PipelineError>
    where
        F: FnOnce() -> Result<PathBuf, PipelineError> + Send + 'static,
    {
        self.with_timeout(stage, async move {
            tokio::task::spawn_blocking(work)
                .await
                .map_err(|e| PipelineError::Worker {
                    stage,
                    message: e.to_string(),
                })?
        })
        .await
    }

    async fn with_timeout<F>(&self, stage: Stage, work: F) -> Result<PathBuf, PipelineError>
    where
        F: Future<Output = Result<PathBuf, PipelineError>>,
    {
        let seconds = self.run.execution.stage_timeout_secs;
        tokio::time::timeout(Duration::from_secs(seconds), work)
            .await
            .map_err(|_| PipelineError::Timeout { stage, seconds })?
    }
}
