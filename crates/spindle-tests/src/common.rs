//! Common test utilities and fixtures

use sha2::{Digest, Sha256};
use spindle_core::{Outcome, SpindleConfig};
use spindle_worker::jobs::{SeriesResult, SurveyResult};
use spindle_worker::{Model, Reporter, RunReport};
use std::fs;
use std::path::Path;
use std::sync::{Mutex, Once};
use std::time::Duration;
use tempfile::TempDir;

static INIT: Once = Once::new();

/// Initialize test environment (logging, etc.)
pub fn init() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_env_filter("spindle_worker=debug,spindle_core=debug")
            .try_init();
    });
}

/// Tree with `a.bin` (10 bytes), `b/c.bin` (20 bytes) and `d.bin` (30 bytes)
pub fn small_tree() -> TempDir {
    let dir = tempfile::tempdir().expect("create temp dir");
    fs::write(dir.path().join("a.bin"), vec![b'a'; 10]).expect("write a.bin");
    fs::create_dir(dir.path().join("b")).expect("create b/");
    fs::write(dir.path().join("b").join("c.bin"), vec![b'c'; 20]).expect("write c.bin");
    fs::write(dir.path().join("d.bin"), vec![b'd'; 30]).expect("write d.bin");
    dir
}

/// Hash [`small_tree`] must produce
pub fn small_tree_hash() -> String {
    let mut hasher = Sha256::new();
    hasher.update(vec![b'a'; 10]);
    hasher.update(vec![b'c'; 20]);
    hasher.update(vec![b'd'; 30]);
    hex::encode(hasher.finalize())
}

/// Configuration that finishes a full run in well under a second
pub fn fast_config(root: &Path) -> SpindleConfig {
    let mut config = SpindleConfig::default();
    config.series.min_iterations = 10_000;
    config.survey.root = root.to_path_buf();
    config.coordinator.countdown = 2;
    config.coordinator.countdown_tick_ms = 20;
    config.coordinator.poll_interval_ms = 10;
    config.pool.size = 2;
    config.logging.enabled = false;
    config
}

/// What a [`RecordingReporter`] saw
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Started(Model),
    Countdown(u64),
    Waiting(String),
    Series { ok: bool },
    Survey { ok: bool },
    Finished,
}

/// Reporter that records every call in order
#[derive(Debug, Default)]
pub struct RecordingReporter {
    events: Mutex<Vec<Event>>,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything recorded so far
    pub fn events(&self) -> Vec<Event> {
        self.lock().clone()
    }

    /// Recorded events with the waiting lines left out
    pub fn milestones(&self) -> Vec<Event> {
        self.events()
            .into_iter()
            .filter(|event| !matches!(event, Event::Waiting(_)))
            .collect()
    }

    fn push(&self, event: Event) {
        self.lock().push(event);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Event>> {
        self.events.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Reporter for RecordingReporter {
    fn started(&self, model: Model) {
        self.push(Event::Started(model));
    }

    fn countdown(&self, remaining: u64) {
        self.push(Event::Countdown(remaining));
    }

    fn waiting(&self, worker: &str, _elapsed: Duration) {
        self.push(Event::Waiting(worker.to_string()));
    }

    fn series(&self, outcome: &Outcome<SeriesResult>) {
        self.push(Event::Series { ok: outcome.is_ok() });
    }

    fn survey(&self, outcome: &Outcome<SurveyResult>) {
        self.push(Event::Survey { ok: outcome.is_ok() });
    }

    fn finished(&self, _report: &RunReport) {
        self.push(Event::Finished);
    }
}
