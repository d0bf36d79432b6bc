//! Error taxonomy for the pipeline stages.
//!
//! Each stage has its own error enum. Item-level errors are caught by the
//! driver and recorded against the item; only [`ConfigError`] and
//! [`HandoffError`] escape to the process level.

use std::fmt;
use std::path::PathBuf;

use crate::api::{ObjectIdentifier, Stage};

/// Structured context attached to stage errors.
///
/// Provides additional information about where and why an error occurred.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ErrorContext {
    /// The operation being performed (e.g., "fetch_light_curve", "insert_result")
    pub operation: Option<String>,
    /// The stage the operation belongs to
    pub stage: Option<Stage>,
    /// The object identifier being processed, if any
    pub identifier: Option<String>,
    /// Additional details about the error
    pub details: Option<String>,
    /// Whether this error is retryable
    pub retryable: bool,
}

impl ErrorContext {
    /// Create a new error context with an operation name.
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: Some(operation.into()),
            ..Default::default()
        }
    }

    pub fn with_stage(mut self, stage: Stage) -> Self {
        self.stage = Some(stage);
        self
    }

    pub fn with_identifier(mut self, identifier: &ObjectIdentifier) -> Self {
        self.identifier = Some(identifier.to_string());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Mark this error as retryable.
    pub fn retryable(mut self) -> Self {
        self.retryable = true;
        self
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if let Some(ref op) = self.operation {
            parts.push(format!("operation={}", op));
        }
        if let Some(stage) = self.stage {
            parts.push(format!("stage={}", stage));
        }
        if let Some(ref id) = self.identifier {
            parts.push(format!("id={}", id));
        }
        if let Some(ref details) = self.details {
            parts.push(format!("details={}", details));
        }
        if self.retryable {
            parts.push("retryable=true".to_string());
        }
        write!(f, "[{}]", parts.join(", "))
    }
}

// =========================================================
// Configuration
// =========================================================

/// Startup errors. These abort the process before any stage runs.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("No configuration file found (searched: {})", searched.join(", "))]
    NoDefault { searched: Vec<String> },

    #[error("Failed to read configuration {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse configuration {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

// =========================================================
// Stage errors
// =========================================================

#[derive(Debug, thiserror::Error)]
pub enum AcquisitionError {
    /// The provider has no light curve for the identifier.
    #[error("No light curve found: {message} {context}")]
    NotFound {
        message: String,
        context: ErrorContext,
    },

    /// The provider or catalog service failed or returned garbage.
    #[error("Provider error: {message} {context}")]
    Provider {
        message: String,
        context: ErrorContext,
    },

    #[error("I/O error: {message} {context}")]
    Io {
        message: String,
        context: ErrorContext,
    },
}

impl AcquisitionError {
    pub fn not_found(message: impl Into<String>, context: ErrorContext) -> Self {
        Self::NotFound {
            message: message.into(),
            context,
        }
    }

    pub fn provider(message: impl Into<String>, context: ErrorContext) -> Self {
        Self::Provider {
            message: message.into(),
            context,
        }
    }

    pub fn io(message: impl Into<String>, context: ErrorContext) -> Self {
        Self::Io {
            message: message.into(),
            context,
        }
    }

    pub fn context(&self) -> &ErrorContext {
        match self {
            Self::NotFound { context, .. } | Self::Provider { context, .. } | Self::Io { context, .. } => {
                context
            }
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.context().retryable
    }
}

impl From<reqwest::Error> for AcquisitionError {
    fn from(err: reqwest::Error) -> Self {
        let context = ErrorContext::new("http_request").with_stage(Stage::Acquisition);
        let context = if err.is_timeout() || err.is_connect() {
            context.retryable()
        } else {
            context
        };
        AcquisitionError::provider(err.to_string(), context)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PreprocessError {
    /// No sample survived the validity mask.
    #[error("No valid samples remain after filtering for {identifier}")]
    EmptyAfterFiltering { identifier: ObjectIdentifier },

    #[error(
        "Column lengths differ for {identifier}: time={time}, flux={flux}, flux_err={flux_err}"
    )]
    ShapeMismatch {
        identifier: ObjectIdentifier,
        time: usize,
        flux: usize,
        flux_err: usize,
    },

    #[error("Required column '{column}' missing from {}", path.display())]
    MissingColumn { column: String, path: PathBuf },

    #[error("FITS error: {0}")]
    Fits(String),

    #[error("Failed to write preview: {0}")]
    Render(String),
}

#[derive(Debug, thiserror::Error)]
pub enum DetectionError {
    #[error("Failed to read processed series: {message} {context}")]
    Read {
        message: String,
        context: ErrorContext,
    },

    #[error("Failed to write results: {message} {context}")]
    Write {
        message: String,
        context: ErrorContext,
    },
}

/// A sink that could not accept a published result.
///
/// Cloneable so that a sink misconfiguration found once can be reported for
/// every item that tries to use it.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SinkError {
    /// Required settings are missing or malformed.
    #[error("{sink} is not configured: {message}")]
    Configuration { sink: String, message: String },

    #[error("{sink} is unreachable: {message}")]
    Unreachable { sink: String, message: String },

    #[error("{sink} rejected the write: {message}")]
    Rejected { sink: String, message: String },

    #[error("{sink} I/O error: {message}")]
    Io { sink: String, message: String },
}

impl SinkError {
    pub fn configuration(sink: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Configuration {
            sink: sink.into(),
            message: message.into(),
        }
    }

    pub fn unreachable(sink: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Unreachable {
            sink: sink.into(),
            message: message.into(),
        }
    }

    pub fn rejected(sink: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Rejected {
            sink: sink.into(),
            message: message.into(),
        }
    }

    pub fn io(sink: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Io {
            sink: sink.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("Failed to read detection results: {0}")]
    Input(String),

    /// Every configured sink failed for this item.
    #[error("All sinks failed: {}", failures.iter().map(|f| f.to_string()).collect::<Vec<_>>().join("; "))]
    AllSinksFailed { failures: Vec<SinkError> },
}

/// The next stage could not be started after this stage completed.
///
/// Reported without altering the outcomes of the stage that triggered it.
#[derive(Debug, thiserror::Error)]
pub enum HandoffError {
    #[error("Cannot hand off from {from} to {to}: {message}")]
    Unavailable {
        from: Stage,
        to: Stage,
        message: String,
    },

    #[error("{to} stage failed for every item handed off from {from}")]
    NoSuccess { from: Stage, to: Stage },
}

// =========================================================
// Umbrella
// =========================================================

/// Any item-level failure, tagged by stage.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Acquisition(#[from] AcquisitionError),

    #[error(transparent)]
    Preprocess(#[from] PreprocessError),

    #[error(transparent)]
    Detection(#[from] DetectionError),

    #[error(transparent)]
    Publish(#[from] PublishError),

    #[error(transparent)]
    Handoff(#[from] HandoffError),

    #[error("{stage} stage exceeded its {seconds}s timeout")]
    Timeout { stage: Stage, seconds: u64 },

    /// A blocking worker panicked or was cancelled.
    #[error("{stage} worker failed: {message}")]
    Worker { stage: Stage, message: String },
}

impl PipelineError {
    /// The stage the error belongs to, if it is item-level.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::Config(_) | Self::Handoff(_) => None,
            Self::Acquisition(_) => Some(Stage::Acquisition),
            Self::Preprocess(_) => Some(Stage::Preprocessing),
            Self::Detection(_) => Some(Stage::Detection),
            Self::Publish(_) => Some(Stage::Publishing),
            Self::Timeout { stage, .. } | Self::Worker { stage, .. } => Some(*stage),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_context_display() {
        let id = ObjectIdentifier::new("TIC 1").unwrap();
        let context = ErrorContext::new("fetch_light_curve")
            .with_stage(Stage::Acquisition)
            .with_identifier(&id)
            .retryable();
        assert_eq!(
            context.to_string(),
            "[operation=fetch_light_curve, stage=acquisition, id=TIC 1, retryable=true]"
        );
        assert_eq!(ErrorContext::default().to_string(), "[]");
    }

    #[test]
    fn test_pipeline_error_stage() {
        let err: PipelineError = PreprocessError::Fits("bad".into()).into();
        assert_eq!(err.stage(), Some(Stage::Preprocessing));

        let err: PipelineError = ConfigError::Invalid("x".into()).into();
        assert_eq!(err.stage(), None);

        let err = PipelineError::Timeout {
            stage: Stage::Detection,
            seconds: 5,
        };
        assert_eq!(err.stage(), Some(Stage::Detection));
        assert!(err.to_string().contains("5s"));
    }

    #[test]
    fn test_all_sinks_failed_lists_each_failure() {
        let err = PublishError::AllSinksFailed {
            failures: vec![
                SinkError::unreachable("object store", "connection refused"),
                SinkError::configuration("metadata store", "DATABASE_URL not set"),
            ],
        };
        let message = err.to_string();
        assert!(message.contains("connection refused"));
        assert!(message.contains("DATABASE_URL not set"));
    }

    #[test]
    fn test_acquisition_retryable_flag() {
        let err = AcquisitionError::provider("503", ErrorContext::new("query").retryable());
        assert!(err.is_retryable());
        let err = AcquisitionError::not_found("none", ErrorContext::default());
        assert!(!err.is_retryable());
    }
}
