//! Transit detection stage.
//!
//! Loads a processed series, applies the minimum-sample policy, runs the box
//! search and writes the candidate as `{results_dir}/ID_processed_results.json`.

use std::fs;
use std::path::{Path, PathBuf};

use crate::algorithms::bls;
use crate::api::{DetectionParameters, ObjectIdentifier, ProcessedSeries, Stage, TransitCandidate};
use crate::artifacts::{write_atomic, ArtifactLayout, PROCESSED_SUFFIX};
use crate::error::{DetectionError, ErrorContext};
use crate::fits;
use crate::services::run_tracker::{LogLevel, RunTracker};

/// Series shorter than this are not searched unless configured otherwise.
pub const DEFAULT_MIN_SAMPLES: usize = 10;

/// Outcome of the minimum-sample check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleGate {
    Accepted,
    TooShort { samples: usize, required: usize },
}

/// Apply the minimum-sample policy to a series length.
pub fn sample_gate(samples: usize, required: usize) -> SampleGate {
    if samples < required {
        SampleGate::TooShort { samples, required }
    } else {
        SampleGate::Accepted
    }
}

#[derive(Debug, Clone)]
pub struct DetectionStage {
    layout: ArtifactLayout,
    /// Where processed series are read from; may differ from the layout's
    /// processed directory
    input_dir: PathBuf,
    parameters: DetectionParameters,
    min_samples: usize,
}

impl DetectionStage {
    pub fn new(layout: ArtifactLayout, parameters: DetectionParameters, min_samples: usize) -> Self {
        let input_dir = layout.processed_dir.clone();
        Self {
            layout,
            input_dir,
            parameters,
            min_samples,
        }
    }

    pub fn with_input_dir(mut self, input_dir: impl Into<PathBuf>) -> Self {
        self.input_dir = input_dir.into();
        self
    }

    /// Search one series.
    ///
    /// A series below the minimum length yields an absent candidate.
    pub fn search(&self, series: &ProcessedSeries, tracker: &RunTracker) -> TransitCandidate {
        match sample_gate(series.len(), self.min_samples) {
            SampleGate::TooShort { samples, required } => {
                tracker.log(
                    &series.identifier,
                    Stage::Detection,
                    LogLevel::Warning,
                    format!(
                        "Series has {} samples, at least {} required; no search run",
                        samples, required
                    ),
                );
                TransitCandidate::absent()
            }
            SampleGate::Accepted => bls::detect(series, &self.parameters),
        }
    }

    /// Analyze the processed artifact of `identifier`. Blocking.
    ///
    /// # Returns
    /// The candidate and the path of the results file.
    pub fn analyze(
        &self,
        identifier: &ObjectIdentifier,
        tracker: &RunTracker,
    ) -> Result<(TransitCandidate, PathBuf), DetectionError> {
        let input = self
            .input_dir
            .join(format!("{}{}", identifier.file_stem(), PROCESSED_SUFFIX));
        self.analyze_file(&input, identifier, tracker)
    }

    /// Analyze an explicit processed file.
    pub fn analyze_file(
        &self,
        input: &Path,
        identifier: &ObjectIdentifier,
        tracker: &RunTracker,
    ) -> Result<(TransitCandidate, PathBuf), DetectionError> {
        let series = fits::read_processed_series(input, identifier).map_err(|e| DetectionError::Read {
            message: e.to_string(),
            context: ErrorContext::new("read_processed_series")
                .with_stage(Stage::Detection)
                .with_identifier(identifier),
        })?;

        let candidate = self.search(&series, tracker);
        let message = match (candidate.period, candidate.power) {
            (Some(period), Some(power)) => {
                format!("Best candidate: period={:.5} power={:.5e}", period, power)
            }
            _ => "No candidate found".to_string(),
        };
        tracker.log(identifier, Stage::Detection, LogLevel::Info, message);

        let output = self.layout.results(identifier);
        write_candidate(&output, &candidate).map_err(|message| DetectionError::Write {
            message,
            context: ErrorContext::new("write_results")
                .with_stage(Stage::Detection)
                .with_identifier(identifier)
                .with_details(output.display().to_string()),
        })?;
        Ok((candidate, output))
    }
}

/// Serialize a candidate as pretty JSON with explicit `null`s.
pub fn write_candidate(path: &Path, candidate: &TransitCandidate) -> Result<(), String> {
    let json = serde_json::to_vec_pretty(candidate).map_err(|e| e.to_string())?;
    write_atomic(path, &json).map_err(|e| e.to_string())
}

/// Read a results file written by [`write_candidate`].
pub fn read_candidate(path: &Path) -> Result<TransitCandidate, String> {
    let content = fs::read_to_string(path).map_err(|e| format!("{}: {}", path.display(), e))?;
    serde_json::from_str(&content).map_err(|e| format!("{}: {}", path.display(), e))
}
