//! Spindle Worker - Isolated workers and their coordination
//!
//! This crate provides the execution side of spindle:
//! - The series and survey payloads
//! - Explicit worker handles on dedicated threads
//! - A fixed-size worker pool returning futures
//! - The coordinator that drives a full run under either model

pub mod coordinator;
pub mod executor;
pub mod handle;
pub mod jobs;
pub mod pool;
pub mod report;

pub use coordinator::Coordinator;
pub use executor::WorkerContext;
pub use handle::WorkerHandle;
pub use pool::{PoolFuture, PoolStats, WorkerPool};
pub use report::{ConsoleReporter, Model, Reporter, RunReport};
