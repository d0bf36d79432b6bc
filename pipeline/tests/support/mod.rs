#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use transit_pipeline::api::{
    DetectionParameters, ObjectIdentifier, ProcessedSeries, Provenance, RawSeries, SampleColumn,
};
use transit_pipeline::artifacts::ArtifactLayout;
use transit_pipeline::config::ExecutionSettings;
use transit_pipeline::db::{
    AnalysisResult, AnalysisResultId, NewAnalysisResult, RepositoryError, RepositoryResult,
    ResultRepository,
};
use transit_pipeline::driver::PipelineRun;
use transit_pipeline::error::{AcquisitionError, SinkError};
use transit_pipeline::fits::write_raw_series;
use transit_pipeline::services::acquisition::{LightCurveDownload, LightCurveProvider};
use transit_pipeline::services::RunTracker;
use transit_pipeline::storage::{ObjectReceipt, ObjectStore, SINK_NAME};

static ENV_LOCK: Mutex<()> = Mutex::new(());

/// Runs `f` with environment variables temporarily modified.
///
/// Restores the previous values on unwind and serializes access to the
/// process environment across parallel tests.
///
/// `changes` is a list of `(key, value)` pairs:
/// - `Some(v)` sets the variable to `v`
/// - `None` removes the variable
pub fn with_scoped_env<F, R>(changes: &[(&str, Option<&str>)], f: F) -> R
where
    F: FnOnce() -> R,
{
    let _lock = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let _guard = ScopedEnv::new(changes);
    f()
}

struct ScopedEnv {
    snapshot: Vec<(String, Option<String>)>,
}

impl ScopedEnv {
    fn new(changes: &[(&str, Option<&str>)]) -> Self {
        let keys: HashSet<&str> = changes.iter().map(|(k, _)| *k).collect();
        let snapshot = keys
            .into_iter()
            .map(|k| (k.to_string(), std::env::var(k).ok()))
            .collect::<Vec<_>>();

        for (k, v) in changes {
            match v {
                Some(val) => std::env::set_var(k, val),
                None => std::env::remove_var(k),
            }
        }

        Self { snapshot }
    }
}

impl Drop for ScopedEnv {
    fn drop(&mut self) {
        for (k, v) in self.snapshot.drain(..) {
            match v {
                Some(val) => std::env::set_var(&k, val),
                None => std::env::remove_var(&k),
            }
        }
    }
}

/// Every environment variable that selects a publishing sink, cleared.
pub const NO_SINK_ENV: &[(&str, Option<&str>)] = &[
    ("OBJECT_STORE_ENDPOINT", None),
    ("OBJECT_STORE_ACCESS_KEY", None),
    ("OBJECT_STORE_SECRET_KEY", None),
    ("OBJECT_STORE_BUCKET_PROCESSED", None),
    ("OBJECT_STORE_BUCKET_VISUALIZE", None),
    ("REPOSITORY_TYPE", None),
    ("DATABASE_URL", None),
    ("PG_DATABASE_URL", None),
];

pub fn id(value: &str) -> ObjectIdentifier {
    ObjectIdentifier::new(value).unwrap()
}

/// 20 days at 0.02 d cadence with a 1% box dip every `period` days.
pub fn synthetic_series(identifier: ObjectIdentifier, period: f64) -> ProcessedSeries {
    let n = 1000;
    let time: Vec<f64> = (0..n).map(|i| i as f64 * 0.02).collect();
    let flux = time
        .iter()
        .enumerate()
        .map(|(i, &t)| {
            let noise = 1e-4 * ((i as f64) * 1.3).sin();
            let dip = if (t - 0.4).rem_euclid(period) < 0.05 * period {
                0.01
            } else {
                0.0
            };
            1.0 + noise - dip
        })
        .collect();
    ProcessedSeries {
        identifier,
        time,
        flux,
        flux_err: vec![1e-3; n],
    }
}

/// Write `{dir}/{stem}.fits` the way a light-curve archive would serve it,
/// with a few NaN samples for the preprocessor to drop.
pub fn write_source_fits(dir: &Path, identifier: &ObjectIdentifier, period: f64) {
    let series = synthetic_series(identifier.clone(), period);
    let mut flux = series.flux.clone();
    flux[3] = f64::NAN;
    flux[500] = f64::NAN;
    let raw = RawSeries {
        identifier: identifier.clone(),
        time: SampleColumn::from_values(series.time),
        flux: SampleColumn::from_values(flux),
        flux_err: SampleColumn::from_values(series.flux_err),
        provenance: Provenance::unknown(),
    };
    std::fs::create_dir_all(dir).unwrap();
    write_raw_series(&dir.join(format!("{}.fits", identifier.file_stem())), &raw).unwrap();
}

/// Small search grid so end-to-end tests stay fast.
pub fn quick_parameters() -> DetectionParameters {
    DetectionParameters::new([1.0, 5.0], [0.02, 0.1]).with_steps(120, 4)
}

pub fn test_run(root: &Path, identifiers: Vec<ObjectIdentifier>, max_concurrency: usize) -> PipelineRun {
    let tracker = RunTracker::new();
    PipelineRun {
        run_id: tracker.run_id(),
        identifiers,
        layout: ArtifactLayout::under(root),
        parameters: quick_parameters(),
        min_samples: 10,
        execution: ExecutionSettings {
            max_concurrency,
            stage_timeout_secs: 120,
        },
        tracker,
    }
}

/// Object store that is always down.
pub struct UnreachableObjectStore;

#[async_trait]
impl ObjectStore for UnreachableObjectStore {
    async fn put_object(
        &self,
        _bucket: &str,
        _key: &str,
        _content_type: &str,
        _bytes: Vec<u8>,
    ) -> Result<ObjectReceipt, SinkError> {
        Err(SinkError::unreachable(SINK_NAME, "connection refused"))
    }

    fn describe(&self) -> String {
        "unreachable".to_string()
    }
}

/// Metadata store that is always down.
pub struct UnreachableRepository;

#[async_trait]
impl ResultRepository for UnreachableRepository {
    async fn health_check(&self) -> RepositoryResult<bool> {
        Err(RepositoryError::connection("connection refused"))
    }

    async fn insert_result(&self, _record: &NewAnalysisResult) -> RepositoryResult<AnalysisResultId> {
        Err(RepositoryError::connection("connection refused"))
    }

    async fn latest_result(
        &self,
        _star_id: &ObjectIdentifier,
    ) -> RepositoryResult<Option<AnalysisResult>> {
        Err(RepositoryError::connection("connection refused"))
    }

    async fn list_results(&self) -> RepositoryResult<Vec<AnalysisResult>> {
        Err(RepositoryError::connection("connection refused"))
    }
}

/// Provider that never answers within a test's patience.
pub struct StalledProvider {
    pub delay: Duration,
}

#[async_trait]
impl LightCurveProvider for StalledProvider {
    fn name(&self) -> &str {
        "stalled"
    }

    async fn fetch(
        &self,
        identifier: &ObjectIdentifier,
    ) -> Result<LightCurveDownload, AcquisitionError> {
        tokio::time::sleep(self.delay).await;
        Err(AcquisitionError::not_found(
            format!("nothing for {}", identifier),
            Default::default(),
        ))
    }
}
