//! Loading configuration files from disk.

use std::fs;
use std::path::Path;

use transit_pipeline::api::Stage;
use transit_pipeline::config::PipelineConfig;
use transit_pipeline::error::ConfigError;

const JSON_CONFIG: &str = r#"{
    "catalog": "TIC",
    "query_parameters": {"brightness_range": [9.0, 11.0]},
    "num_star_ids": 5,
    "output_path": "data/star_ids.txt",
    "fetch_star_ids_log": "logs/fetch_star_ids.log",
    "raw_data_dir": "data/raw",
    "star_ids_file": "data/star_ids.txt",
    "fetch_star_data_log": "logs/fetch_star_data.log",
    "process_lightcurve": {
        "processed_data_dir": "data/processed",
        "process_lightcurve_log": "logs/process_lightcurve.log"
    },
    "analyze_transits": {
        "processed_fits_path": "data/processed",
        "output_dir": "results",
        "log_file": "logs/analyze_transits.log"
    },
    "bls_parameters": {"period_range": [1.0, 10.0], "duration_range": [0.02, 0.08]},
    "visualize": {"output_dir": "visualize/data", "log_file": "logs/visualize_transits.log"}
}"#;

#[test]
fn test_bundled_config_loads() {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("config.toml");
    let config = PipelineConfig::from_file(&path).unwrap();

    assert_eq!(config.catalog, "TIC");
    assert_eq!(config.pipeline.max_concurrency, 4);
    assert!(config.raw_data_dir.is_absolute());
    assert!(config.raw_data_dir.ends_with("data/raw"));
}

#[test]
fn test_json_paths_resolve_against_file_directory() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    fs::write(&path, JSON_CONFIG).unwrap();

    let config = PipelineConfig::from_file(&path).unwrap();
    assert_eq!(config.num_star_ids, 5);
    assert_eq!(config.bls_parameters.period_range, [1.0, 10.0]);
    assert_eq!(config.star_ids_file, dir.path().join("data/star_ids.txt"));
    assert_eq!(
        config.log_file(Stage::Publishing),
        dir.path().join("logs/visualize_transits.log")
    );

    let layout = config.artifact_layout();
    assert_eq!(layout.processed_dir, dir.path().join("data/processed"));
}

#[test]
fn test_missing_file_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let err = PipelineConfig::from_file(dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, ConfigError::NotFound { .. }));
}

#[test]
fn test_malformed_file_is_a_parse_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(&path, "output_path = [").unwrap();

    let err = PipelineConfig::from_file(&path).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }), "{}", err);
}

#[test]
fn test_invalid_values_are_rejected_on_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    fs::write(
        &path,
        JSON_CONFIG.replace("\"num_star_ids\": 5", "\"num_star_ids\": 0"),
    )
    .unwrap();

    let err = PipelineConfig::from_file(&path).unwrap_err();
    assert!(matches!(err, ConfigError::Invalid(_)));
}
