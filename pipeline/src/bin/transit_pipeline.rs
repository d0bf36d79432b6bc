//! Transit pipeline command-line entry point.
//!
//! # Usage
//!
//! ```bash
//! # Resolve identifiers from the catalog into `output_path`
//! transit-pipeline fetch-ids
//!
//! # Download light curves, then preprocess what was downloaded
//! transit-pipeline acquire --chain
//!
//! # Search one processed series and publish the result
//! transit-pipeline detect data/processed/TIC_12345_processed.fits --chain
//!
//! # Everything, for the identifiers in `star_ids_file`
//! transit-pipeline --config config.toml run
//! ```
//!
//! # Environment Variables
//!
//! - `LIGHTCURVE_SOURCE_DIR`: serve light curves from this directory instead of MAST
//! - `MAST_API_URL`: MAST `invoke` endpoint
//! - `OBJECT_STORE_*`, `REPOSITORY_TYPE`, `DATABASE_URL`: publishing sinks
//! - `RUST_LOG`: Log filter (default: info)

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, warn};

use transit_pipeline::api::{ObjectIdentifier, Stage};
use transit_pipeline::artifacts::{list_raw_series, list_with_suffix, ArtifactLayout, PROCESSED_SUFFIX};
use transit_pipeline::clients::{DirectoryProvider, MastCatalogClient, MastLightCurveProvider};
use transit_pipeline::config::PipelineConfig;
use transit_pipeline::driver::{BatchReport, PipelineDriver, PipelineRun, StageSet};
use transit_pipeline::logging;
use transit_pipeline::services::acquisition::LightCurveProvider;
use transit_pipeline::services::catalog::{load_identifiers, CatalogQuery, IdentifierCatalog};
use transit_pipeline::services::{ResultPublisher, RunTracker};

#[derive(Parser, Debug)]
#[command(name = "transit-pipeline")]
#[command(about = "Light-curve ingestion and periodic transit search", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file (TOML or JSON); defaults to config.toml, config.json
    /// or config/config.json in the working directory
    #[arg(short, long, global = true, env = "TRANSIT_PIPELINE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Query the catalog and append identifiers to the identifier list
    FetchIds,
    /// Download the raw series for every listed identifier
    Acquire {
        /// Preprocess the downloaded series afterwards
        #[arg(long)]
        chain: bool,
    },
    /// Clean every raw series in the raw data directory
    Preprocess,
    /// Search processed series for transits
    Detect {
        /// A processed FITS file, or a directory of them
        path: PathBuf,
        /// Publish the results afterwards
        #[arg(long)]
        chain: bool,
    },
    /// Publish one detection results file
    Publish {
        /// Path to an `*_processed_results.json` file
        path: PathBuf,
    },
    /// Run every stage for the listed identifiers
    Run {
        /// Refresh the identifier list from the catalog first
        #[arg(long)]
        fetch_ids: bool,
    },
}

impl Command {
    /// Stage whose log file the command writes to.
    fn log_stage(&self) -> Stage {
        match self {
            Command::FetchIds => Stage::Catalog,
            Command::Acquire { .. } | Command::Run { .. } => Stage::Acquisition,
            Command::Preprocess => Stage::Preprocessing,
            Command::Detect { .. } => Stage::Detection,
            Command::Publish { .. } => Stage::Publishing,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match PipelineConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::from(1);
        }
    };

    let _guard = match logging::init_logging(config.log_file(cli.command.log_stage())) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            return ExitCode::from(1);
        }
    };

    match execute(cli.command, &config).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            error!("{:#}", e);
            ExitCode::from(1)
        }
    }
}

async fn execute(command: Command, config: &PipelineConfig) -> Result<u8> {
    match command {
        Command::FetchIds => {
            let ids = fetch_ids(config).await?;
            Ok(if ids.is_empty() { 1 } else { 0 })
        }
        Command::Acquire { chain } => {
            let ids = listed_identifiers(config)?;
            let driver = build_driver(config, ids.clone(), None, false).await?;
            Ok(finish(driver.run_single(Stage::Acquisition, &ids, chain).await))
        }
        Command::Preprocess => {
            let ids = raw_identifiers(&config.raw_data_dir)?;
            let driver = build_driver(config, ids.clone(), None, false).await?;
            Ok(finish(driver.run_single(Stage::Preprocessing, &ids, false).await))
        }
        Command::Detect { path, chain } => {
            let (input_dir, ids) = processed_inputs(&path)?;
            let driver = build_driver(config, ids.clone(), Some(input_dir), chain).await?;
            Ok(finish(driver.run_single(Stage::Detection, &ids, chain).await))
        }
        Command::Publish { path } => {
            let publisher = ResultPublisher::from_env(config.artifact_layout()).await;
            let outcome = publisher.publish_file(&path, &RunTracker::new()).await?;
            info!(
                identifier = %outcome.identifier,
                object_store = outcome.object_store.is_stored(),
                metadata_store = outcome.metadata_store.is_stored(),
                "Published"
            );
            Ok(0)
        }
        Command::Run { fetch_ids: refresh } => {
            if refresh {
                fetch_ids(config).await?;
            }
            let ids = listed_identifiers(config)?;
            let driver = build_driver(config, ids, None, true).await?;
            Ok(finish(driver.run().await))
        }
    }
}

async fn fetch_ids(config: &PipelineConfig) -> Result<Vec<ObjectIdentifier>> {
    let client = MastCatalogClient::from_env()?;
    let catalog = IdentifierCatalog::new(Arc::new(client));
    let ids = catalog
        .resolve_into(&CatalogQuery::from_config(config), &config.output_path)
        .await?;
    info!(count = ids.len(), path = %config.output_path.display(), "Saved identifiers");
    Ok(ids)
}

fn light_curve_provider() -> Result<Arc<dyn LightCurveProvider>> {
    match std::env::var("LIGHTCURVE_SOURCE_DIR") {
        Ok(dir) if !dir.trim().is_empty() => {
            info!(dir = %dir, "Serving light curves from a local directory");
            Ok(Arc::new(DirectoryProvider::new(dir)))
        }
        _ => Ok(Arc::new(MastLightCurveProvider::from_env()?)),
    }
}

/// Wire the stages for this run. Sinks are only resolved when the command
/// can reach the publishing stage.
async fn build_driver(
    config: &PipelineConfig,
    identifiers: Vec<ObjectIdentifier>,
    detection_input: Option<PathBuf>,
    publishes: bool,
) -> Result<PipelineDriver> {
    let run = PipelineRun::from_config(config, identifiers);
    let publisher = if publishes {
        ResultPublisher::from_env(run.layout.clone()).await
    } else {
        ResultPublisher::disabled(run.layout.clone())
    };
    let detection_input =
        detection_input.unwrap_or_else(|| config.processed_input_dir().to_path_buf());
    let stages = StageSet::for_run(&run, light_curve_provider()?, publisher)
        .with_detection_input(detection_input);
    run.layout
        .ensure_dirs()
        .context("Failed to create artifact directories")?;
    Ok(PipelineDriver::new(run, stages))
}

fn listed_identifiers(config: &PipelineConfig) -> Result<Vec<ObjectIdentifier>> {
    let ids = load_identifiers(&config.star_ids_file).with_context(|| {
        format!(
            "Failed to read identifier list {}",
            config.star_ids_file.display()
        )
    })?;
    if ids.is_empty() {
        bail!("No identifiers in {}", config.star_ids_file.display());
    }
    Ok(ids)
}

fn raw_identifiers(raw_dir: &Path) -> Result<Vec<ObjectIdentifier>> {
    let paths = list_raw_series(raw_dir)
        .with_context(|| format!("Failed to list {}", raw_dir.display()))?;
    let ids: Vec<_> = paths
        .iter()
        .filter_map(|p| ArtifactLayout::identifier_from_path(p))
        .collect();
    if ids.is_empty() {
        bail!("No raw series found in {}", raw_dir.display());
    }
    Ok(ids)
}

/// Input directory and identifiers for `detect <PATH>`.
fn processed_inputs(path: &Path) -> Result<(PathBuf, Vec<ObjectIdentifier>)> {
    if path.is_dir() {
        let ids: Vec<_> = list_with_suffix(path, PROCESSED_SUFFIX)
            .with_context(|| format!("Failed to list {}", path.display()))?
            .iter()
            .filter_map(|p| ArtifactLayout::identifier_from_path(p))
            .collect();
        if ids.is_empty() {
            bail!("No processed series found in {}", path.display());
        }
        return Ok((path.to_path_buf(), ids));
    }

    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
    if !name.ends_with(PROCESSED_SUFFIX) {
        bail!(
            "{} is not a processed series (expected *{})",
            path.display(),
            PROCESSED_SUFFIX
        );
    }
    let id = ArtifactLayout::identifier_from_path(path)
        .with_context(|| format!("Cannot derive an identifier from {}", path.display()))?;
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
        .to_path_buf();
    Ok((dir, vec![id]))
}

fn finish(report: BatchReport) -> u8 {
    match serde_json::to_string(&report.summary) {
        Ok(summary) => println!("{}", summary),
        Err(e) => warn!(error = %e, "Failed to serialize batch summary"),
    }
    if !report.is_success() {
        error!(run_id = %report.run_id, "Batch failed: no item succeeded");
    }
    report.exit_code()
}
