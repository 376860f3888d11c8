//! Error types for spindle

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Result type alias using spindle's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for spindle operations
#[derive(Error, Debug)]
pub enum Error {
    /// A run precondition does not hold; no worker was started
    #[error("precondition failed: {0}")]
    Precondition(String),

    /// The worker ran and reported a failure instead of a value
    #[error("worker {worker} failed: {message}")]
    WorkerFailed { worker: String, message: String },

    /// The result was not ready within the requested wait
    #[error("result not ready after {0:?}")]
    Timeout(Duration),

    /// The worker has not produced its result yet
    #[error("worker {0} has not finished")]
    NotFinished(String),

    /// The worker was never started
    #[error("worker {0} has not been started")]
    NotStarted(String),

    /// The worker was already started once
    #[error("worker {0} was already started")]
    AlreadyStarted(String),

    /// Cancellation was requested from a worker created without a signal
    #[error("worker {0} does not accept cancellation")]
    CancellationUnsupported(String),

    /// The signal manager is not running
    #[error("signal manager is not running")]
    ManagerNotRunning,

    /// The pool no longer accepts tasks
    #[error("worker pool is shut down")]
    PoolShutdown,

    /// Configuration error
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Logging setup error
    #[error("telemetry error: {0}")]
    Telemetry(#[from] spindle_telemetry::TelemetryError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Check if this is the recoverable "not ready yet" condition
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout(_))
    }

    /// Check if this error was reported by a worker
    pub fn is_worker_failure(&self) -> bool {
        matches!(self, Error::WorkerFailed { .. })
    }
}

/// A failure captured at a worker boundary.
///
/// Cloneable so a cached outcome can be handed out on every read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerFailure {
    /// Name of the worker that failed
    pub worker: String,

    /// Human-readable failure description
    pub message: String,
}

impl WorkerFailure {
    /// Create a new failure record
    pub fn new(worker: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            worker: worker.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for WorkerFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.worker, self.message)
    }
}

impl From<WorkerFailure> for Error {
    fn from(failure: WorkerFailure) -> Self {
        Error::WorkerFailed {
            worker: failure.worker,
            message: failure.message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert!(Error::Timeout(Duration::from_secs(1)).is_timeout());
        assert!(!Error::PoolShutdown.is_timeout());

        let err: Error = WorkerFailure::new("survey-worker", "file vanished").into();
        assert!(err.is_worker_failure());
        assert_eq!(err.to_string(), "worker survey-worker failed: file vanished");
    }
}
