//! Run reports and console reporting

use crate::jobs::{SeriesResult, SurveyResult};
use serde::{Deserialize, Serialize};
use spindle_core::Outcome;
use std::time::Duration;

/// Coordination model used for a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Model {
    /// One explicit handle per worker
    Handles,
    /// Both workers submitted to a shared pool
    Pool,
}

impl std::fmt::Display for Model {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Model::Handles => write!(f, "handles"),
            Model::Pool => write!(f, "pool"),
        }
    }
}

/// Everything one coordinator run produced.
///
/// Worker outcomes are kept separately, so a failed survey is reported next
/// to a successful series instead of hiding it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    /// Model that drove the run
    pub model: Model,

    /// Series worker outcome
    pub series: Outcome<SeriesResult>,

    /// Survey worker outcome
    pub survey: Outcome<SurveyResult>,

    /// Total wall-clock time of the run
    pub elapsed: Duration,
}

impl RunReport {
    /// Check if both workers succeeded
    pub fn is_success(&self) -> bool {
        self.series.is_ok() && self.survey.is_ok()
    }
}

/// Receives human-readable progress from the coordinator
pub trait Reporter: Send + Sync {
    /// A run is about to start its workers
    fn started(&self, _model: Model) {}

    /// One countdown step before cancellation
    fn countdown(&self, remaining: u64);

    /// A worker is still running after a bounded wait
    fn waiting(&self, worker: &str, elapsed: Duration);

    /// The series outcome is available
    fn series(&self, outcome: &Outcome<SeriesResult>);

    /// The survey outcome is available
    fn survey(&self, outcome: &Outcome<SurveyResult>);

    /// The run is complete
    fn finished(&self, report: &RunReport);
}

/// Prints status lines to stdout, or stderr when stdout carries JSON
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleReporter {
    to_stderr: bool,
}

impl ConsoleReporter {
    /// Report on stdout
    pub fn new() -> Self {
        Self::default()
    }

    /// Report on stderr
    pub fn stderr() -> Self {
        Self { to_stderr: true }
    }

    fn line(&self, line: std::fmt::Arguments<'_>) {
        if self.to_stderr {
            eprintln!("{}", line);
        } else {
            println!("{}", line);
        }
    }
}

impl Reporter for ConsoleReporter {
    fn started(&self, model: Model) {
        self.line(format_args!("=== {} ===", model));
    }

    fn countdown(&self, remaining: u64) {
        self.line(format_args!("{}", remaining));
    }

    fn waiting(&self, worker: &str, elapsed: Duration) {
        self.line(format_args!(
            "waiting on {} for {:.1} seconds ...",
            worker,
            elapsed.as_secs_f64()
        ));
    }

    fn series(&self, outcome: &Outcome<SeriesResult>) {
        match outcome {
            Ok(result) => self.line(format_args!("{}", result)),
            Err(failure) => self.line(format_args!("series failed: {}", failure)),
        }
    }

    fn survey(&self, outcome: &Outcome<SurveyResult>) {
        match outcome {
            Ok(result) => self.line(format_args!("{}", result)),
            Err(failure) => self.line(format_args!("survey failed: {}", failure)),
        }
    }

    fn finished(&self, report: &RunReport) {
        self.line(format_args!(
            "total time: {:.3} seconds\n",
            report.elapsed.as_secs_f64()
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use spindle_core::WorkerFailure;

    #[test]
    fn test_report_keeps_outcomes_apart() {
        let report = RunReport {
            model: Model::Pool,
            series: Ok(SeriesResult {
                value: std::f64::consts::E,
                iterations: 1_000_000,
                duration: Duration::from_millis(20),
                finished_at: Utc::now(),
            }),
            survey: Err(WorkerFailure::new("survey-worker", "file vanished")),
            elapsed: Duration::from_secs(5),
        };
        assert!(!report.is_success());

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["model"], "pool");
        assert_eq!(json["series"]["Ok"]["iterations"], 1_000_000);
        assert_eq!(json["survey"]["Err"]["message"], "file vanished");
    }

    #[test]
    fn test_model_display() {
        assert_eq!(Model::Handles.to_string(), "handles");
        assert_eq!(Model::Pool.to_string(), "pool");
    }
}
