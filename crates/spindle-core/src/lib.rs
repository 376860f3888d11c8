//! Spindle Core - Core types for coordinating isolated workers
//!
//! This crate provides the fundamental building blocks for spindle:
//! - Cancellation signals and the manager that issues them
//! - Single-value result slots
//! - Task identifiers and state
//! - Configuration structures
//! - Error types

pub mod cancel;
pub mod config;
pub mod error;
pub mod result;
pub mod task;

pub use cancel::{CancellationSignal, SignalManager};
pub use config::{CoordinatorConfig, PoolConfig, SeriesConfig, SpindleConfig, SurveyConfig};
pub use error::{Error, Result, WorkerFailure};
pub use result::{result_slot, Outcome, ResultSlot, ResultWriter};
pub use task::{TaskId, TaskState, TaskStatus};
