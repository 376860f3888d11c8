//! Integration tests for spindle
//!
//! Every test drives real worker threads against a temporary directory tree.

use spindle_core::{Error, SignalManager, SurveyConfig};
use spindle_telemetry::{LogFormat, LoggingConfig};
use spindle_tests::common::{self, Event, RecordingReporter};
use spindle_worker::jobs::{survey, SeriesWorker, SurveyWorker};
use spindle_worker::{Coordinator, Model, WorkerPool};
use std::time::Duration;

fn expected_milestones(model: Model) -> Vec<Event> {
    vec![
        Event::Started(model),
        Event::Countdown(2),
        Event::Countdown(1),
        Event::Countdown(0),
        Event::Series { ok: true },
        Event::Survey { ok: true },
        Event::Finished,
    ]
}

async fn run_model(model: Model) {
    common::init();
    let tree = common::small_tree();
    let config = common::fast_config(tree.path());
    let batch_size = config.series.batch_size;
    let min_iterations = config.series.min_iterations;

    let coordinator = Coordinator::new(config).unwrap();
    let reporter = RecordingReporter::new();
    let report = coordinator.run(model, &reporter).await.unwrap();

    assert_eq!(report.model, model);
    assert!(report.is_success());

    let series = report.series.as_ref().unwrap();
    assert!(series.iterations >= min_iterations);
    assert_eq!(series.iterations % batch_size, 0);
    assert!(series.error() < 1e-9);

    let survey = report.survey.as_ref().unwrap();
    assert_eq!(survey.file_count, 3);
    assert_eq!(survey.total_size, 60);
    assert_eq!(survey.content_hash, common::small_tree_hash());

    // countdown takes three ticks of 20ms
    assert!(report.elapsed >= Duration::from_millis(60));
    assert_eq!(reporter.milestones(), expected_milestones(model));
}

#[tokio::test]
async fn test_handles_run_end_to_end() {
    run_model(Model::Handles).await;
}

#[tokio::test]
async fn test_pool_run_end_to_end() {
    run_model(Model::Pool).await;
}

#[tokio::test]
async fn test_models_agree_on_survey() {
    common::init();
    let tree = common::small_tree();
    let coordinator = Coordinator::new(common::fast_config(tree.path())).unwrap();
    let reporter = RecordingReporter::new();

    let handles = coordinator.run(Model::Handles, &reporter).await.unwrap();
    let pool = coordinator.run(Model::Pool, &reporter).await.unwrap();

    assert_eq!(
        handles.survey.unwrap().content_hash,
        pool.survey.unwrap().content_hash
    );
}

#[tokio::test]
async fn test_missing_root_aborts_without_starting_workers() {
    common::init();
    let tree = common::small_tree();
    let missing = tree.path().join("does-not-exist");
    let coordinator = Coordinator::new(common::fast_config(&missing)).unwrap();

    for model in [Model::Handles, Model::Pool] {
        let reporter = RecordingReporter::new();
        let err = coordinator.run(model, &reporter).await.unwrap_err();

        assert!(matches!(err, Error::Precondition(_)), "got {:?}", err);
        assert!(reporter.events().is_empty());
    }
}

#[tokio::test]
async fn test_survey_failure_is_reported_next_to_series_success() {
    common::init();
    let tree = common::small_tree();

    let files = survey::enumerate_files(tree.path()).unwrap();
    std::fs::remove_file(tree.path().join("b").join("c.bin")).unwrap();

    let manager = SignalManager::new();
    manager.start();
    let signal = manager.signal().unwrap();

    let mut pool = WorkerPool::new(2).unwrap();
    let series_worker = SeriesWorker::new(common::fast_config(tree.path()).series).unwrap();
    let series = pool
        .submit_cancellable("series-worker", signal.clone(), move |ctx| {
            Ok(series_worker.run(ctx.cancellation()?))
        })
        .unwrap();
    let survey = pool
        .submit("survey-worker", move |_| survey::hash_files(&files, 4096))
        .unwrap();

    signal.cancel();
    assert!(series.get(None).await.is_ok());

    let err = survey.get(None).await.unwrap_err();
    assert!(err.is_worker_failure());
    assert!(err.to_string().contains("c.bin"));

    let stats = pool.shutdown().await.unwrap();
    assert_eq!(stats.completed, 1);
    assert_eq!(stats.failed, 1);
    assert_eq!(manager.shutdown(), 0);
}

#[tokio::test]
async fn test_manager_shutdown_releases_pooled_series() {
    common::init();
    let tree = common::small_tree();

    let manager = SignalManager::new();
    manager.start();
    let signal = manager.signal().unwrap();

    let pool = WorkerPool::new(1).unwrap();
    let series_worker = SeriesWorker::new(common::fast_config(tree.path()).series).unwrap();
    let series = pool
        .submit_cancellable("series-worker", signal, move |ctx| {
            Ok(series_worker.run(ctx.cancellation()?))
        })
        .unwrap();

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(series.get(Some(Duration::from_millis(20))).await.unwrap_err().is_timeout());

    assert_eq!(manager.shutdown(), 1);
    assert!(series.get(None).await.unwrap().iterations >= 10_000);
}

/// Drop a run mid-countdown and report whether dropping it returned promptly
fn abandon_run_mid_countdown(model: Model) -> bool {
    common::init();
    let tree = common::small_tree();
    let mut config = common::fast_config(tree.path());
    config.coordinator.countdown = 100;
    config.coordinator.countdown_tick_ms = 50;
    let coordinator = Coordinator::new(config).unwrap();

    let (done_tx, done_rx) = std::sync::mpsc::channel();
    std::thread::spawn(move || {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let reporter = RecordingReporter::new();
        let abandoned = runtime.block_on(async {
            tokio::time::timeout(Duration::from_millis(200), coordinator.run(model, &reporter))
                .await
                .is_err()
        });
        done_tx.send(abandoned).ok();
    });

    let returned = done_rx.recv_timeout(Duration::from_secs(5));
    drop(tree);
    returned == Ok(true)
}

#[test]
fn test_abandoned_pool_run_releases_workers() {
    assert!(abandon_run_mid_countdown(Model::Pool));
}

#[test]
fn test_abandoned_handles_run_releases_workers() {
    assert!(abandon_run_mid_countdown(Model::Handles));
}

#[tokio::test]
async fn test_worker_logging_is_reattached_in_every_worker() {
    common::init();
    let tree = common::small_tree();
    let logs = tempfile::tempdir().unwrap();
    let log_file = logs.path().join("spindle.log");

    let mut config = common::fast_config(tree.path());
    config.logging = LoggingConfig {
        level: "info".to_string(),
        format: LogFormat::Json,
        console: false,
        log_file: Some(log_file.clone()),
        ..Default::default()
    };

    let coordinator = Coordinator::new(config).unwrap();
    let reporter = RecordingReporter::new();
    coordinator.run(Model::Pool, &reporter).await.unwrap();

    let written = std::fs::read_to_string(&log_file).unwrap();
    let lines: Vec<serde_json::Value> = written
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();

    for worker in ["series-worker", "survey-worker"] {
        assert!(
            lines
                .iter()
                .any(|line| line["span"]["worker"] == worker),
            "no log line from {}",
            worker
        );
    }
}

#[test]
fn test_survey_worker_over_nested_tree() {
    let tree = common::small_tree();
    std::fs::create_dir_all(tree.path().join("b").join("e")).unwrap();
    std::fs::write(tree.path().join("b").join("e").join("f.bin"), b"").unwrap();

    let worker = SurveyWorker::new(&SurveyConfig {
        root: tree.path().to_path_buf(),
        chunk_size: 7,
    })
    .unwrap();
    let result = worker.run().unwrap();

    // empty files count but add no bytes
    assert_eq!(result.file_count, 4);
    assert_eq!(result.total_size, 60);
    assert_eq!(result.content_hash, common::small_tree_hash());
}
