//! Result publishing stage.
//!
//! Renders the metrics chart for a candidate and forwards it, together with
//! the result record, to the object store and the metadata store. The two
//! sinks are attempted independently; publishing fails only when both do.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::api::{ObjectIdentifier, Stage, TransitCandidate};
use crate::artifacts::ArtifactLayout;
use crate::db::{NewAnalysisResult, RepositoryError, RepositoryFactory, ResultRepository};
use crate::error::{PublishError, SinkError};
use crate::render::{render_metrics_chart, save_png};
use crate::services::detection::read_candidate;
use crate::services::run_tracker::{LogLevel, RunTracker};
use crate::storage::{self, create_object_store, ObjectStore, ObjectStoreConfig};

/// Sink name used in errors and logs.
pub const METADATA_SINK: &str = "metadata store";

const PNG_CONTENT_TYPE: &str = "image/png";

/// Object store plus the two target buckets.
#[derive(Clone)]
pub struct ObjectSink {
    store: Arc<dyn ObjectStore>,
    bucket_processed: String,
    bucket_visualize: String,
}

impl ObjectSink {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        bucket_processed: impl Into<String>,
        bucket_visualize: impl Into<String>,
    ) -> Self {
        Self {
            store,
            bucket_processed: bucket_processed.into(),
            bucket_visualize: bucket_visualize.into(),
        }
    }

    /// Build from `OBJECT_STORE_*` environment variables.
    pub fn from_env() -> Result<Self, SinkError> {
        let config = ObjectStoreConfig::from_env()?;
        let store = create_object_store(&config)?;
        Ok(Self::new(store, config.bucket_processed, config.bucket_visualize))
    }
}

/// Result of one sink attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum SinkStatus {
    /// Written; `location` is the object URI or the row id.
    Stored { location: String },
    Failed(SinkError),
}

impl SinkStatus {
    pub fn is_stored(&self) -> bool {
        matches!(self, SinkStatus::Stored { .. })
    }

    pub fn error(&self) -> Option<&SinkError> {
        match self {
            SinkStatus::Failed(e) => Some(e),
            SinkStatus::Stored { .. } => None,
        }
    }
}

/// What happened when publishing one candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct PublishOutcome {
    pub identifier: ObjectIdentifier,
    /// Local metrics chart, when rendering succeeded
    pub visualization: Option<PathBuf>,
    pub render_error: Option<String>,
    pub object_store: SinkStatus,
    pub metadata_store: SinkStatus,
}

impl PublishOutcome {
    /// At least one sink accepted the result.
    pub fn is_success(&self) -> bool {
        self.object_store.is_stored() || self.metadata_store.is_stored()
    }

    pub fn into_result(self) -> Result<Self, PublishError> {
        if self.is_success() {
            return Ok(self);
        }
        let failures = [&self.object_store, &self.metadata_store]
            .into_iter()
            .filter_map(|status| status.error().cloned())
            .collect();
        Err(PublishError::AllSinksFailed { failures })
    }
}

/// Publishes detection results to the configured sinks.
///
/// Sinks are resolved once; a sink that could not be configured is kept as
/// its error and reported for every item it would have received.
#[derive(Clone)]
pub struct ResultPublisher {
    layout: ArtifactLayout,
    object_sink: Result<ObjectSink, SinkError>,
    repository: Result<Arc<dyn ResultRepository>, SinkError>,
}

impl ResultPublisher {
    pub fn new(
        layout: ArtifactLayout,
        object_sink: Result<ObjectSink, SinkError>,
        repository: Result<Arc<dyn ResultRepository>, SinkError>,
    ) -> Self {
        Self {
            layout,
            object_sink,
            repository,
        }
    }

    /// Publisher for commands that never reach the publishing stage.
    pub fn disabled(layout: ArtifactLayout) -> Self {
        let reason = "publishing is not part of this command";
        Self::new(
            layout,
            Err(SinkError::configuration(storage::SINK_NAME, reason)),
            Err(SinkError::configuration(METADATA_SINK, reason)),
        )
    }

    /// Resolve both sinks from the environment.
    ///
    /// Never fails: missing configuration surfaces as a `SinkError` when
    /// publishing.
    pub async fn from_env(layout: ArtifactLayout) -> Self {
        let object_sink = ObjectSink::from_env();
        let repository = RepositoryFactory::from_env()
            .await
            .map_err(|e| repository_sink_error(&e));
        Self::new(layout, object_sink, repository)
    }

    /// Publish the results file written by the detection stage.
    ///
    /// The identifier is recovered from the file name.
    pub async fn publish_file(
        &self,
        results: &Path,
        tracker: &RunTracker,
    ) -> Result<PublishOutcome, PublishError> {
        let identifier = ArtifactLayout::identifier_from_path(results).ok_or_else(|| {
            PublishError::Input(format!(
                "cannot derive an identifier from {}",
                results.display()
            ))
        })?;
        self.publish_results(results, &identifier, tracker).await
    }

    /// Publish a results file on behalf of `identifier`.
    pub async fn publish_results(
        &self,
        results: &Path,
        identifier: &ObjectIdentifier,
        tracker: &RunTracker,
    ) -> Result<PublishOutcome, PublishError> {
        let path = results.to_path_buf();
        let candidate = tokio::task::spawn_blocking(move || read_candidate(&path))
            .await
            .map_err(|e| PublishError::Input(e.to_string()))?
            .map_err(PublishError::Input)?;
        self.publish(&candidate, identifier, tracker)
            .await
            .into_result()
    }

    pub fn layout(&self) -> &ArtifactLayout {
        &self.layout
    }

    /// Render the metrics chart and attempt both sinks.
    pub async fn publish(
        &self,
        candidate: &TransitCandidate,
        identifier: &ObjectIdentifier,
        tracker: &RunTracker,
    ) -> PublishOutcome {
        let (visualization, render_error) = match self.render(candidate, identifier).await {
            Ok(path) => {
                tracker.log(
                    identifier,
                    Stage::Publishing,
                    LogLevel::Info,
                    format!("Metrics chart saved to {}", path.display()),
                );
                (Some(path), None)
            }
            Err(message) => {
                tracker.log(
                    identifier,
                    Stage::Publishing,
                    LogLevel::Error,
                    format!("Failed to render metrics chart: {}", message),
                );
                (None, Some(message))
            }
        };

        let object_store = self
            .upload(identifier, visualization.as_deref(), tracker)
            .await;
        let visualization_uri = match &object_store {
            SinkStatus::Stored { location } => Some(location.clone()),
            SinkStatus::Failed(_) => visualization.as_ref().map(|p| p.display().to_string()),
        };
        let metadata_store = self
            .record(identifier, candidate, visualization_uri, tracker)
            .await;

        let outcome = PublishOutcome {
            identifier: identifier.clone(),
            visualization,
            render_error,
            object_store,
            metadata_store,
        };
        if outcome.is_success() {
            tracker.log(identifier, Stage::Publishing, LogLevel::Success, "Published");
        }
        outcome
    }

    async fn render(
        &self,
        candidate: &TransitCandidate,
        identifier: &ObjectIdentifier,
    ) -> Result<PathBuf, String> {
        let path = self.layout.metrics_plot(identifier);
        let candidate = *candidate;
        tokio::task::spawn_blocking(move || {
            save_png(&render_metrics_chart(&candidate), &path)
                .map(|_| path)
                .map_err(|e| e.to_string())
        })
        .await
        .map_err(|e| e.to_string())?
    }

    /// Upload the metrics chart, and the preview when there is one.
    ///
    /// The status reflects the metrics chart; a failed preview upload is
    /// only logged.
    async fn upload(
        &self,
        identifier: &ObjectIdentifier,
        visualization: Option<&Path>,
        tracker: &RunTracker,
    ) -> SinkStatus {
        let sink = match &self.object_sink {
            Ok(sink) => sink,
            Err(e) => return self.sink_failed(identifier, e.clone(), tracker),
        };
        let Some(chart) = visualization else {
            let error = SinkError::io(storage::SINK_NAME, "no metrics chart to upload");
            return self.sink_failed(identifier, error, tracker);
        };

        let status = match put_file(sink.store.as_ref(), &sink.bucket_visualize, chart).await {
            Ok(uri) => {
                tracker.log(
                    identifier,
                    Stage::Publishing,
                    LogLevel::Info,
                    format!("Uploaded metrics chart to {}", uri),
                );
                SinkStatus::Stored { location: uri }
            }
            Err(e) => return self.sink_failed(identifier, e, tracker),
        };

        let preview = self.layout.processed_preview(identifier);
        if preview.exists() {
            match put_file(sink.store.as_ref(), &sink.bucket_processed, &preview).await {
                Ok(uri) => tracker.log(
                    identifier,
                    Stage::Publishing,
                    LogLevel::Info,
                    format!("Uploaded preview to {}", uri),
                ),
                Err(e) => tracker.log(
                    identifier,
                    Stage::Publishing,
                    LogLevel::Warning,
                    format!("Preview upload failed: {}", e),
                ),
            }
        }
        status
    }

    async fn record(
        &self,
        identifier: &ObjectIdentifier,
        candidate: &TransitCandidate,
        visualization_uri: Option<String>,
        tracker: &RunTracker,
    ) -> SinkStatus {
        let repository = match &self.repository {
            Ok(repository) => repository,
            Err(e) => return self.sink_failed(identifier, e.clone(), tracker),
        };
        let record = NewAnalysisResult::new(identifier.clone(), *candidate)
            .with_visualization_uri(visualization_uri);
        match repository.insert_result(&record).await {
            Ok(id) => {
                tracker.log(
                    identifier,
                    Stage::Publishing,
                    LogLevel::Info,
                    format!("Recorded result row {}", id),
                );
                SinkStatus::Stored {
                    location: id.to_string(),
                }
            }
            Err(e) => self.sink_failed(identifier, repository_sink_error(&e), tracker),
        }
    }

    fn sink_failed(
        &self,
        identifier: &ObjectIdentifier,
        error: SinkError,
        tracker: &RunTracker,
    ) -> SinkStatus {
        tracker.log(identifier, Stage::Publishing, LogLevel::Error, error.to_string());
        SinkStatus::Failed(error)
    }
}

async fn put_file(store: &dyn ObjectStore, bucket: &str, path: &Path) -> Result<String, SinkError> {
    let key = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| SinkError::io(storage::SINK_NAME, format!("bad file name {}", path.display())))?
        .to_string();
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| SinkError::io(storage::SINK_NAME, format!("{}: {}", path.display(), e)))?;
    let receipt = store.put_object(bucket, &key, PNG_CONTENT_TYPE, bytes).await?;
    Ok(receipt.uri)
}

fn repository_sink_error(error: &RepositoryError) -> SinkError {
    match error {
        RepositoryError::ConfigurationError { .. } => {
            SinkError::configuration(METADATA_SINK, error.to_string())
        }
        RepositoryError::ConnectionError { .. } => {
            SinkError::unreachable(METADATA_SINK, error.to_string())
        }
        _ => SinkError::rejected(METADATA_SINK, error.to_string()),
    }
}
