//! Pipeline configuration file support.
//!
//! One configuration document drives every stage. It is read from TOML or
//! JSON (chosen by file extension), validated once and shared read-only for
//! the rest of the run.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::api::{DetectionParameters, Stage};
use crate::artifacts::ArtifactLayout;
use crate::error::ConfigError;

/// Files searched, in order, when no `--config` is given.
pub const DEFAULT_CONFIG_LOCATIONS: [&str; 3] =
    ["config.toml", "config.json", "config/config.json"];

/// Full pipeline configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_catalog")]
    pub catalog: String,
    #[serde(default)]
    pub query_parameters: QueryParameters,
    #[serde(default = "default_num_star_ids")]
    pub num_star_ids: usize,
    /// Identifier list written by the catalog stage
    pub output_path: PathBuf,
    #[serde(default = "default_fetch_star_ids_log")]
    pub fetch_star_ids_log: PathBuf,
    pub raw_data_dir: PathBuf,
    /// Identifier list read by the acquisition stage
    pub star_ids_file: PathBuf,
    #[serde(default = "default_fetch_star_data_log")]
    pub fetch_star_data_log: PathBuf,
    pub process_lightcurve: ProcessLightcurveSettings,
    pub analyze_transits: AnalyzeTransitsSettings,
    #[serde(default)]
    pub bls_parameters: DetectionParameters,
    pub visualize: VisualizeSettings,
    #[serde(default)]
    pub pipeline: ExecutionSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryParameters {
    /// Catalog magnitude window `[brightest, faintest]`
    #[serde(default = "default_brightness_range")]
    pub brightness_range: [f64; 2],
}

impl Default for QueryParameters {
    fn default() -> Self {
        Self {
            brightness_range: default_brightness_range(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessLightcurveSettings {
    pub processed_data_dir: PathBuf,
    #[serde(default = "default_process_lightcurve_log")]
    pub process_lightcurve_log: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzeTransitsSettings {
    /// Where the detection stage looks for processed series; defaults to
    /// `process_lightcurve.processed_data_dir`
    #[serde(default)]
    pub processed_fits_path: Option<PathBuf>,
    pub output_dir: PathBuf,
    #[serde(default = "default_analyze_transits_log")]
    pub log_file: PathBuf,
    /// Series shorter than this are not searched
    #[serde(default = "default_min_samples")]
    pub min_samples: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisualizeSettings {
    pub output_dir: PathBuf,
    #[serde(default = "default_visualize_log")]
    pub log_file: PathBuf,
}

/// Scheduling knobs for the batch driver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionSettings {
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    #[serde(default = "default_stage_timeout_secs")]
    pub stage_timeout_secs: u64,
}

impl Default for ExecutionSettings {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            stage_timeout_secs: default_stage_timeout_secs(),
        }
    }
}

fn default_catalog() -> String {
    "TIC".to_string()
}

fn default_num_star_ids() -> usize {
    10
}

fn default_brightness_range() -> [f64; 2] {
    [8.0, 10.0]
}

fn default_fetch_star_ids_log() -> PathBuf {
    PathBuf::from("logs/fetch_star_ids.log")
}

fn default_fetch_star_data_log() -> PathBuf {
    PathBuf::from("logs/fetch_star_data.log")
}

fn default_process_lightcurve_log() -> PathBuf {
    PathBuf::from("logs/process_lightcurve.log")
}

fn default_analyze_transits_log() -> PathBuf {
    PathBuf::from("logs/analyze_transits.log")
}

fn default_visualize_log() -> PathBuf {
    PathBuf::from("logs/visualize_transits.log")
}

fn default_min_samples() -> usize {
    10
}

fn default_max_concurrency() -> usize {
    1
}

fn default_stage_timeout_secs() -> u64 {
    300
}

impl PipelineConfig {
    /// Load and validate configuration from a TOML or JSON file.
    ///
    /// # Arguments
    /// * `path` - Path to the configuration file (`.json` is parsed as JSON,
    ///   anything else as TOML)
    ///
    /// # Returns
    /// * `Ok(PipelineConfig)` with every relative path resolved against the
    ///   file's directory
    /// * `Err(ConfigError)` if the file is missing, malformed or invalid
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::NotFound {
                path: path.to_path_buf(),
            });
        }

        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

        let mut config = if is_json {
            Self::parse_json(&content)
        } else {
            Self::parse_toml(&content)
        }
        .map_err(|message| ConfigError::Parse {
            path: path.to_path_buf(),
            message,
        })?;

        if let Some(base) = path.parent() {
            config.resolve_relative_to(base);
        }
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from the first default location that exists.
    pub fn from_default_location() -> Result<Self, ConfigError> {
        for candidate in DEFAULT_CONFIG_LOCATIONS {
            let path = PathBuf::from(candidate);
            if path.exists() {
                return Self::from_file(&path);
            }
        }

        Err(ConfigError::NoDefault {
            searched: DEFAULT_CONFIG_LOCATIONS.iter().map(|s| s.to_string()).collect(),
        })
    }

    /// Load from an explicit path when given, otherwise from the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::from_file(path),
            None => Self::from_default_location(),
        }
    }

    fn parse_toml(content: &str) -> Result<Self, String> {
        toml::from_str(content).map_err(|e| e.to_string())
    }

    fn parse_json(content: &str) -> Result<Self, String> {
        serde_json::from_str(content).map_err(|e| e.to_string())
    }

    /// Check cross-field constraints.
    ///
    /// An inverted BLS period range is accepted: the detector reports an
    /// absent candidate for it instead.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let [bright, faint] = self.query_parameters.brightness_range;
        if !(bright.is_finite() && faint.is_finite()) || bright >= faint {
            return Err(ConfigError::Invalid(format!(
                "query_parameters.brightness_range must be [min, max) with min < max, got [{}, {}]",
                bright, faint
            )));
        }
        if self.num_star_ids == 0 {
            return Err(ConfigError::Invalid(
                "num_star_ids must be at least 1".to_string(),
            ));
        }
        if self.catalog.trim().is_empty() {
            return Err(ConfigError::Invalid("catalog must not be empty".to_string()));
        }
        if self.pipeline.max_concurrency == 0 {
            return Err(ConfigError::Invalid(
                "pipeline.max_concurrency must be at least 1".to_string(),
            ));
        }
        if self.pipeline.stage_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "pipeline.stage_timeout_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    fn resolve_relative_to(&mut self, base: &Path) {
        let resolve = |path: &mut PathBuf| {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        };

        resolve(&mut self.output_path);
        resolve(&mut self.fetch_star_ids_log);
        resolve(&mut self.raw_data_dir);
        resolve(&mut self.star_ids_file);
        resolve(&mut self.fetch_star_data_log);
        resolve(&mut self.process_lightcurve.processed_data_dir);
        resolve(&mut self.process_lightcurve.process_lightcurve_log);
        if let Some(path) = self.analyze_transits.processed_fits_path.as_mut() {
            resolve(path);
        }
        resolve(&mut self.analyze_transits.output_dir);
        resolve(&mut self.analyze_transits.log_file);
        resolve(&mut self.visualize.output_dir);
        resolve(&mut self.visualize.log_file);
    }

    /// Directory the detection stage reads processed series from.
    pub fn processed_input_dir(&self) -> &Path {
        self.analyze_transits
            .processed_fits_path
            .as_deref()
            .unwrap_or(&self.process_lightcurve.processed_data_dir)
    }

    /// Artifact layout for this configuration.
    pub fn artifact_layout(&self) -> ArtifactLayout {
        ArtifactLayout::new(
            &self.raw_data_dir,
            &self.process_lightcurve.processed_data_dir,
            &self.analyze_transits.output_dir,
            &self.visualize.output_dir,
        )
    }

    /// Log file for a stage.
    pub fn log_file(&self, stage: Stage) -> &Path {
        match stage {
            Stage::Catalog => &self.fetch_star_ids_log,
            Stage::Acquisition => &self.fetch_star_data_log,
            Stage::Preprocessing => &self.process_lightcurve.process_lightcurve_log,
            Stage::Detection => &self.analyze_transits.log_file,
            Stage::Publishing => &self.visualize.log_file,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) const MINIMAL_TOML: &str = r#"
output_path = "data/star_ids.txt"
raw_data_dir = "data/raw"
star_ids_file = "data/star_ids.txt"

[process_lightcurve]
processed_data_dir = "data/processed"

[analyze_transits]
output_dir = "results"

[visualize]
output_dir = "visualize/data"
"#;

    #[test]
    fn test_parse_minimal_toml_uses_defaults() {
        let config = PipelineConfig::parse_toml(MINIMAL_TOML).unwrap();
        assert_eq!(config.catalog, "TIC");
        assert_eq!(config.num_star_ids, 10);
        assert_eq!(config.query_parameters.brightness_range, [8.0, 10.0]);
        assert_eq!(config.analyze_transits.min_samples, 10);
        assert_eq!(config.pipeline.max_concurrency, 1);
        assert_eq!(config.pipeline.stage_timeout_secs, 300);
        assert_eq!(config.bls_parameters, DetectionParameters::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_json_layout() {
        let json = r#"{
            "catalog": "TIC",
            "query_parameters": {"brightness_range": [9.0, 11.0]},
            "num_star_ids": 3,
            "output_path": "ids.txt",
            "fetch_star_ids_log": "logs/a.log",
            "raw_data_dir": "raw",
            "star_ids_file": "ids.txt",
            "fetch_star_data_log": "logs/b.log",
            "process_lightcurve": {"processed_data_dir": "processed", "process_lightcurve_log": "logs/c.log"},
            "analyze_transits": {"processed_fits_path": "processed", "output_dir": "results", "log_file": "logs/d.log"},
            "bls_parameters": {"period_range": [1.0, 10.0], "duration_range": [0.02, 0.08]},
            "visualize": {"output_dir": "viz", "log_file": "logs/e.log"}
        }"#;
        let config = PipelineConfig::parse_json(json).unwrap();
        assert_eq!(config.num_star_ids, 3);
        assert_eq!(config.bls_parameters.period_range, [1.0, 10.0]);
        assert_eq!(config.bls_parameters.period_steps, 2000);
        assert_eq!(config.processed_input_dir(), Path::new("processed"));
    }

    #[test]
    fn test_missing_required_key_fails_to_parse() {
        let toml = MINIMAL_TOML.replace("raw_data_dir = \"data/raw\"", "");
        let err = PipelineConfig::parse_toml(&toml).unwrap_err();
        assert!(err.contains("raw_data_dir"), "{}", err);
    }

    #[test]
    fn test_validate_rejects_inverted_brightness_range() {
        let mut config = PipelineConfig::parse_toml(MINIMAL_TOML).unwrap();
        config.query_parameters.brightness_range = [10.0, 8.0];
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_validate_rejects_zero_concurrency_and_ids() {
        let mut config = PipelineConfig::parse_toml(MINIMAL_TOML).unwrap();
        config.pipeline.max_concurrency = 0;
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::parse_toml(MINIMAL_TOML).unwrap();
        config.num_star_ids = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_allows_inverted_period_range() {
        let mut config = PipelineConfig::parse_toml(MINIMAL_TOML).unwrap();
        config.bls_parameters.period_range = [30.0, 0.5];
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_relative_paths_resolve_against_base() {
        let mut config = PipelineConfig::parse_toml(MINIMAL_TOML).unwrap();
        config.resolve_relative_to(Path::new("/srv/pipeline"));
        assert_eq!(config.raw_data_dir, PathBuf::from("/srv/pipeline/data/raw"));
        assert_eq!(
            config.log_file(Stage::Detection),
            Path::new("/srv/pipeline/logs/analyze_transits.log")
        );
        assert_eq!(
            config.processed_input_dir(),
            Path::new("/srv/pipeline/data/processed")
        );
    }
}
