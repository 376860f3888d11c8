//! Spindle Telemetry - Logging layer
//!
//! This crate provides logging for spindle coordinators and workers:
//! - Process-wide structured logging for the coordinator
//! - Serializable logging snapshots
//! - Re-attachment of an equivalent logging context inside each worker

pub mod logging;

pub use logging::{
    attach_worker_logging, init_logging, LogFormat, LoggingConfig, LoggingSnapshot,
    WorkerLogGuard,
};

use thiserror::Error;

/// Telemetry errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Logging error: {0}")]
    Logging(String),

    #[error("Snapshot error: {0}")]
    Snapshot(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type TelemetryResult<T> = Result<T, TelemetryError>;
