//! End-to-end batch tests over a temporary artifact tree.

mod support;

use std::sync::Arc;
use std::time::Duration;

use support::{id, test_run, write_source_fits, StalledProvider};
use transit_pipeline::api::{Stage, TransitCandidate};
use transit_pipeline::artifacts::ArtifactLayout;
use transit_pipeline::clients::DirectoryProvider;
use transit_pipeline::db::{LocalRepository, ResultRepository};
use transit_pipeline::driver::{BatchStatus, BatchSummary, PipelineDriver, StageSet};
use transit_pipeline::error::HandoffError;
use transit_pipeline::services::detection::read_candidate;
use transit_pipeline::services::{ItemState, ObjectSink, ResultPublisher};
use transit_pipeline::storage::MemoryObjectStore;

struct Harness {
    _dir: tempfile::TempDir,
    layout: ArtifactLayout,
    store: MemoryObjectStore,
    repo: Arc<LocalRepository>,
    driver: PipelineDriver,
}

/// Driver over three items where only `TIC 1` and `TIC 3` exist at the source.
fn harness(max_concurrency: usize) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("source");
    write_source_fits(&source, &id("TIC 1"), 2.5);
    write_source_fits(&source, &id("TIC 3"), 3.5);

    let run = test_run(
        &dir.path().join("out"),
        vec![id("TIC 1"), id("TIC 2"), id("TIC 3")],
        max_concurrency,
    );
    let layout = run.layout.clone();
    let store = MemoryObjectStore::new();
    let repo = Arc::new(LocalRepository::new());
    let publisher = ResultPublisher::new(
        layout.clone(),
        Ok(ObjectSink::new(Arc::new(store.clone()), "processed", "visualize")),
        Ok(repo.clone() as Arc<dyn ResultRepository>),
    );
    let stages = StageSet::for_run(&run, Arc::new(DirectoryProvider::new(source)), publisher);

    Harness {
        _dir: dir,
        layout,
        store,
        repo,
        driver: PipelineDriver::new(run, stages),
    }
}

#[tokio::test]
async fn test_failed_item_does_not_stop_the_batch() {
    let h = harness(1);
    let report = h.driver.run().await;

    assert_eq!(report.summary, BatchSummary { success: 2, failure: 1 });
    assert_eq!(report.status(), BatchStatus::Success);
    assert_eq!(report.exit_code(), 0);

    let acquisition = report.stage(Stage::Acquisition).unwrap();
    assert_eq!(acquisition.summary(), BatchSummary { success: 2, failure: 1 });
    assert!(!acquisition.outcome(&id("TIC 2")).unwrap().is_success());
    // later stages only ever saw the two acquired items
    assert_eq!(report.stage(Stage::Publishing).unwrap().outcomes.len(), 2);

    let tracker = h.driver.tracker();
    assert_eq!(tracker.state(&id("TIC 1")), Some(ItemState::Published));
    assert_eq!(tracker.state(&id("TIC 3")), Some(ItemState::Published));
    assert!(matches!(
        tracker.state(&id("TIC 2")),
        Some(ItemState::Failed { stage: Stage::Acquisition, .. })
    ));

    assert_eq!(h.repo.len(), 2);
    assert_eq!(
        h.store.keys("visualize"),
        vec!["TIC_1_processed_metrics.png", "TIC_3_processed_metrics.png"]
    );
    assert_eq!(
        h.store.keys("processed"),
        vec!["TIC_1_processed.png", "TIC_3_processed.png"]
    );
}

#[tokio::test]
async fn test_artifacts_follow_the_naming_chain() {
    let h = harness(1);
    h.driver.run().await;

    let item = id("TIC 1");
    for path in [
        h.layout.raw_series(&item),
        h.layout.processed_series(&item),
        h.layout.processed_preview(&item),
        h.layout.results(&item),
        h.layout.metrics_plot(&item),
    ] {
        assert!(path.exists(), "missing {}", path.display());
        assert_eq!(ArtifactLayout::identifier_from_path(&path), Some(id("TIC_1")));
    }
    assert!(!h.layout.raw_series(&id("TIC 2")).exists());

    let candidate: TransitCandidate = read_candidate(&h.layout.results(&item)).unwrap();
    let period = candidate.period.unwrap();
    assert!((period - 2.5).abs() < 0.1, "period {}", period);
}

#[tokio::test]
async fn test_concurrent_workers_keep_input_order() {
    let h = harness(3);
    let report = h.driver.run().await;

    assert_eq!(report.summary, BatchSummary { success: 2, failure: 1 });
    let order: Vec<_> = report
        .stage(Stage::Acquisition)
        .unwrap()
        .outcomes
        .iter()
        .map(|o| o.identifier.clone())
        .collect();
    assert_eq!(order, vec![id("TIC 1"), id("TIC 2"), id("TIC 3")]);
}

#[tokio::test]
async fn test_zero_success_stops_before_next_stage() {
    let dir = tempfile::tempdir().unwrap();
    let run = test_run(dir.path(), vec![id("TIC 1"), id("TIC 2")], 1);
    let layout = run.layout.clone();
    let stages = StageSet::for_run(
        &run,
        Arc::new(DirectoryProvider::new(dir.path().join("empty"))),
        ResultPublisher::disabled(layout.clone()),
    );
    let driver = PipelineDriver::new(run, stages);

    let report = driver.run().await;
    assert_eq!(report.status(), BatchStatus::Failure);
    assert_eq!(report.exit_code(), 1);
    assert_eq!(report.summary, BatchSummary { success: 0, failure: 2 });
    assert_eq!(report.stages.len(), 1);
    assert!(report.stage(Stage::Preprocessing).is_none());
    assert!(!layout.processed_dir.exists() || std::fs::read_dir(&layout.processed_dir).unwrap().next().is_none());
}

#[tokio::test]
async fn test_acquire_chain_hands_off_to_preprocessing() {
    let h = harness(1);
    let ids = vec![id("TIC 1"), id("TIC 2"), id("TIC 3")];
    let report = h.driver.run_single(Stage::Acquisition, &ids, true).await;

    assert_eq!(report.summary, BatchSummary { success: 2, failure: 1 });
    assert!(report.handoff_errors.is_empty());
    let preprocessing = report.stage(Stage::Preprocessing).unwrap();
    assert_eq!(preprocessing.summary(), BatchSummary { success: 2, failure: 0 });
    assert!(report.stage(Stage::Detection).is_none());
    assert!(h.layout.processed_series(&id("TIC 3")).exists());
}

#[tokio::test]
async fn test_failed_handoff_is_reported_separately() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("source");
    write_source_fits(&source, &id("TIC 1"), 2.5);
    let run = test_run(&dir.path().join("out"), vec![id("TIC 1")], 1);
    let layout = run.layout.clone();
    let stages = StageSet::for_run(
        &run,
        Arc::new(DirectoryProvider::new(source)),
        ResultPublisher::disabled(layout.clone()),
    );
    let driver = PipelineDriver::new(run, stages);
    let ids = vec![id("TIC 1")];

    driver.run_single(Stage::Acquisition, &ids, true).await;
    let report = driver.run_single(Stage::Detection, &ids, true).await;

    // detection itself succeeded; publishing had no sink
    assert_eq!(report.status(), BatchStatus::Success);
    assert!(matches!(
        report.handoff_errors.as_slice(),
        [HandoffError::NoSuccess {
            from: Stage::Detection,
            to: Stage::Publishing
        }]
    ));
    assert!(layout.results(&id("TIC 1")).exists());
}

#[tokio::test]
async fn test_stage_timeout_fails_the_item() {
    let dir = tempfile::tempdir().unwrap();
    let mut run = test_run(dir.path(), vec![id("TIC 1")], 1);
    run.execution.stage_timeout_secs = 1;
    let stages = StageSet::for_run(
        &run,
        Arc::new(StalledProvider {
            delay: Duration::from_secs(30),
        }),
        ResultPublisher::disabled(run.layout.clone()),
    );
    let driver = PipelineDriver::new(run, stages);

    let report = driver.run_single(Stage::Acquisition, &[id("TIC 1")], false).await;
    assert_eq!(report.status(), BatchStatus::Failure);
    let outcome = report.stage(Stage::Acquisition).unwrap().outcome(&id("TIC 1")).unwrap();
    assert!(!outcome.is_success());
    assert!(format!("{:?}", outcome.status).contains("timeout"));
}
