//! Domain types shared by every pipeline stage.
//!
//! All types derive Serialize/Deserialize so they can be written as artifacts
//! or logged as structured records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// =========================================================
// Identifiers and stages
// =========================================================

/// Opaque token naming one observed object, e.g. `TIC 12345`.
///
/// The identifier is the join key of every artifact in the pipeline. Its
/// [`file_stem`](ObjectIdentifier::file_stem) is what appears in artifact
/// file names.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectIdentifier(String);

impl ObjectIdentifier {
    /// Create an identifier from a raw token.
    ///
    /// Leading and trailing whitespace is trimmed. Empty tokens and tokens
    /// containing path separators are rejected.
    pub fn new(value: impl Into<String>) -> Result<Self, String> {
        let value = value.into();
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err("Object identifier must not be empty".to_string());
        }
        if trimmed.contains(['/', '\\']) {
            return Err(format!(
                "Object identifier '{}' must not contain path separators",
                trimmed
            ));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// File-name form of the identifier: runs of whitespace become `_`.
    ///
    /// `TIC 12345` and `TIC_12345` share the stem `TIC_12345`.
    pub fn file_stem(&self) -> String {
        self.0.split_whitespace().collect::<Vec<_>>().join("_")
    }
}

impl fmt::Display for ObjectIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ObjectIdentifier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// The stages of the pipeline, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Catalog,
    Acquisition,
    Preprocessing,
    Detection,
    Publishing,
}

impl Stage {
    /// Stages that run once per identifier.
    pub const ITEM_STAGES: [Stage; 4] = [
        Stage::Acquisition,
        Stage::Preprocessing,
        Stage::Detection,
        Stage::Publishing,
    ];

    /// The stage that consumes this stage's artifacts.
    pub fn next(self) -> Option<Stage> {
        match self {
            Stage::Catalog => Some(Stage::Acquisition),
            Stage::Acquisition => Some(Stage::Preprocessing),
            Stage::Preprocessing => Some(Stage::Detection),
            Stage::Detection => Some(Stage::Publishing),
            Stage::Publishing => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Stage::Catalog => "catalog",
            Stage::Acquisition => "acquisition",
            Stage::Preprocessing => "preprocessing",
            Stage::Detection => "detection",
            Stage::Publishing => "publishing",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// =========================================================
// Series
// =========================================================

/// A numeric column with a fixed number of values per row.
///
/// Values are stored row-major. A width of 1 is an ordinary one-dimensional
/// column; wider columns come from FITS vector columns (repeat count > 1).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleColumn {
    values: Vec<f64>,
    width: usize,
}

impl SampleColumn {
    /// One-dimensional column.
    pub fn from_values(values: Vec<f64>) -> Self {
        Self { values, width: 1 }
    }

    /// Column with `width` values per row.
    ///
    /// # Errors
    /// Returns an error if `width` is zero or the value count is not a
    /// multiple of `width`.
    pub fn with_width(values: Vec<f64>, width: usize) -> Result<Self, String> {
        if width == 0 {
            return Err("Column width must be at least 1".to_string());
        }
        if values.len() % width != 0 {
            return Err(format!(
                "Column holds {} values, not a multiple of its width {}",
                values.len(),
                width
            ));
        }
        Ok(Self { values, width })
    }

    pub fn rows(&self) -> usize {
        self.values.len() / self.width
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn is_multi_dimensional(&self) -> bool {
        self.width > 1
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// The first value of every row.
    ///
    /// Sibling sub-columns are discarded.
    pub fn first_subcolumn(&self) -> Vec<f64> {
        self.values.iter().step_by(self.width).copied().collect()
    }
}

/// Where a raw series came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    /// Catalog the identifier was resolved against (e.g. `TIC`)
    pub source_catalog: String,
    /// Mission that produced the light curve (e.g. `TESS`)
    pub mission: String,
    pub acquired_at: DateTime<Utc>,
    /// SHA-256 of the downloaded product, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
}

impl Provenance {
    pub fn unknown() -> Self {
        Self {
            source_catalog: "unknown".to_string(),
            mission: "unknown".to_string(),
            acquired_at: Utc::now(),
            checksum: None,
        }
    }
}

/// A light curve exactly as acquired: timestamp, brightness and brightness
/// uncertainty columns, possibly multi-dimensional, possibly holding NaNs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawSeries {
    pub identifier: ObjectIdentifier,
    pub time: SampleColumn,
    pub flux: SampleColumn,
    pub flux_err: SampleColumn,
    pub provenance: Provenance,
}

/// A cleaned light curve: one-dimensional, finite timestamps and brightness.
///
/// Fields are public so that callers can hand the detector arbitrary input;
/// [`is_consistent`](ProcessedSeries::is_consistent) reports whether the
/// equal-length invariant holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedSeries {
    pub identifier: ObjectIdentifier,
    pub time: Vec<f64>,
    pub flux: Vec<f64>,
    pub flux_err: Vec<f64>,
}

impl ProcessedSeries {
    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    pub fn is_consistent(&self) -> bool {
        self.time.len() == self.flux.len() && self.flux.len() == self.flux_err.len()
    }

    /// Time span covered by the series, if it has at least one sample.
    pub fn baseline(&self) -> Option<f64> {
        let min = self.time.iter().copied().fold(f64::INFINITY, f64::min);
        let max = self.time.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        (min.is_finite() && max.is_finite()).then(|| max - min)
    }
}

// =========================================================
// Detection
// =========================================================

fn default_period_range() -> [f64; 2] {
    [0.5, 30.0]
}

fn default_duration_range() -> [f64; 2] {
    [0.01, 0.1]
}

fn default_period_steps() -> usize {
    2000
}

fn default_duration_steps() -> usize {
    10
}

fn default_phase_oversample() -> usize {
    10
}

/// Search ranges and grid resolution for the box search.
///
/// Both ranges are `[lower, upper)`: the lower bound is on the grid, the
/// upper bound is not. Durations are fractions of the trial period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionParameters {
    /// Trial periods, in the time unit of the series (days for TESS)
    #[serde(default = "default_period_range")]
    pub period_range: [f64; 2],
    /// Transit duration as a fraction of the trial period
    #[serde(default = "default_duration_range")]
    pub duration_range: [f64; 2],
    #[serde(default = "default_period_steps")]
    pub period_steps: usize,
    #[serde(default = "default_duration_steps")]
    pub duration_steps: usize,
    /// Phase bins per shortest trial duration
    #[serde(default = "default_phase_oversample")]
    pub phase_oversample: usize,
}

impl DetectionParameters {
    pub fn new(period_range: [f64; 2], duration_range: [f64; 2]) -> Self {
        Self {
            period_range,
            duration_range,
            ..Default::default()
        }
    }

    pub fn with_steps(mut self, period_steps: usize, duration_steps: usize) -> Self {
        self.period_steps = period_steps;
        self.duration_steps = duration_steps;
        self
    }

    pub fn min_period(&self) -> f64 {
        self.period_range[0]
    }

    pub fn max_period(&self) -> f64 {
        self.period_range[1]
    }

    pub fn min_duration_fraction(&self) -> f64 {
        self.duration_range[0]
    }

    pub fn max_duration_fraction(&self) -> f64 {
        self.duration_range[1]
    }

    /// Spacing of the period grid.
    pub fn period_step(&self) -> f64 {
        (self.max_period() - self.min_period()) / self.period_steps.max(1) as f64
    }
}

impl Default for DetectionParameters {
    fn default() -> Self {
        Self {
            period_range: default_period_range(),
            duration_range: default_duration_range(),
            period_steps: default_period_steps(),
            duration_steps: default_duration_steps(),
            phase_oversample: default_phase_oversample(),
        }
    }
}

/// The single best transit hypothesis for one series.
///
/// Every field is `None` when detection could not run. Serialized as a flat
/// record whose fields are numbers or explicit `null`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TransitCandidate {
    pub period: Option<f64>,
    /// Transit duration in the time unit of the series
    pub duration: Option<f64>,
    pub depth: Option<f64>,
    pub power: Option<f64>,
}

impl TransitCandidate {
    /// Candidate with every field absent.
    pub fn absent() -> Self {
        Self::default()
    }

    pub fn is_absent(&self) -> bool {
        self.period.is_none()
            && self.duration.is_none()
            && self.depth.is_none()
            && self.power.is_none()
    }

    /// Values for charting, in `[period, duration, depth, power]` order.
    ///
    /// Absent fields are shown as 0. This is a display convention only and
    /// must not feed any computation.
    pub fn display_values(&self) -> [f64; 4] {
        [self.period, self.duration, self.depth, self.power].map(|v| v.unwrap_or(0.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifier_trims_and_rejects_blank() {
        let id = ObjectIdentifier::new("  TIC 12345 ").unwrap();
        assert_eq!(id.as_str(), "TIC 12345");
        assert!(ObjectIdentifier::new("   ").is_err());
        assert!(ObjectIdentifier::new("TIC/1").is_err());
    }

    #[test]
    fn test_identifier_file_stem() {
        let spaced: ObjectIdentifier = "TIC  12345".parse().unwrap();
        let underscored: ObjectIdentifier = "TIC_12345".parse().unwrap();
        assert_eq!(spaced.file_stem(), "TIC_12345");
        assert_eq!(underscored.file_stem(), "TIC_12345");
    }

    #[test]
    fn test_sample_column_first_subcolumn() {
        let col = SampleColumn::with_width(vec![1.0, 10.0, 2.0, 20.0, 3.0, 30.0], 2).unwrap();
        assert_eq!(col.rows(), 3);
        assert!(col.is_multi_dimensional());
        assert_eq!(col.first_subcolumn(), vec![1.0, 2.0, 3.0]);
        assert!(SampleColumn::with_width(vec![1.0, 2.0, 3.0], 2).is_err());
        assert!(SampleColumn::with_width(vec![], 0).is_err());
    }

    #[test]
    fn test_stage_order() {
        assert_eq!(Stage::Acquisition.next(), Some(Stage::Preprocessing));
        assert_eq!(Stage::Publishing.next(), None);
        assert_eq!(Stage::ITEM_STAGES.len(), 4);
    }

    #[test]
    fn test_candidate_serializes_explicit_nulls() {
        let json = serde_json::to_value(TransitCandidate::absent()).unwrap();
        let obj = json.as_object().unwrap();
        assert_eq!(obj.len(), 4);
        for key in ["period", "duration", "depth", "power"] {
            assert!(obj.get(key).unwrap().is_null(), "{} should be null", key);
        }
    }

    #[test]
    fn test_candidate_display_values_substitute_zero() {
        let candidate = TransitCandidate {
            period: Some(3.0),
            duration: None,
            depth: Some(0.01),
            power: None,
        };
        assert_eq!(candidate.display_values(), [3.0, 0.0, 0.01, 0.0]);
        assert!(!candidate.is_absent());
        assert!(TransitCandidate::absent().is_absent());
    }

    #[test]
    fn test_detection_parameters_defaults_from_partial_toml() {
        let params: DetectionParameters = toml::from_str("period_range = [1.0, 5.0]").unwrap();
        assert_eq!(params.period_range, [1.0, 5.0]);
        assert_eq!(params.duration_range, [0.01, 0.1]);
        assert_eq!(params.period_steps, 2000);
        assert!((params.period_step() - 0.002).abs() < 1e-12);
    }
}
