//! Payload execution inside an isolated context

use spindle_core::{CancellationSignal, Error, Outcome, Result, WorkerFailure};
use spindle_telemetry::{attach_worker_logging, LoggingSnapshot};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::time::Instant;
use tracing::{error, info, warn};

/// What a payload can see of the context it runs in
#[derive(Debug, Clone)]
pub struct WorkerContext {
    name: String,
    cancellation: Option<CancellationSignal>,
}

impl WorkerContext {
    /// Create a context for the named worker
    pub fn new(name: impl Into<String>, cancellation: Option<CancellationSignal>) -> Self {
        Self {
            name: name.into(),
            cancellation,
        }
    }

    /// Worker name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The cancellation signal this worker was started with
    pub fn cancellation(&self) -> Result<&CancellationSignal> {
        self.cancellation
            .as_ref()
            .ok_or_else(|| Error::CancellationUnsupported(self.name.clone()))
    }

    /// Check if cancellation was requested; always false without a signal
    pub fn is_cancelled(&self) -> bool {
        self.cancellation
            .as_ref()
            .map_or(false, CancellationSignal::is_cancelled)
    }
}

/// Run `payload` with the worker's logging attached and capture every
/// failure, including panics, as a [`WorkerFailure`].
pub(crate) fn execute<T, F>(
    context: &WorkerContext,
    logging: Option<&LoggingSnapshot>,
    payload: F,
) -> Outcome<T>
where
    F: FnOnce(&WorkerContext) -> Result<T>,
{
    let _log_guard = logging.and_then(|snapshot| {
        attach_worker_logging(snapshot, context.name())
            .map_err(|e| warn!("Worker {} runs without its logging context: {}", context.name(), e))
            .ok()
    });

    info!("Worker {} started", context.name());
    let start = Instant::now();

    let outcome = match panic::catch_unwind(AssertUnwindSafe(|| payload(context))) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(WorkerFailure::new(context.name(), e.to_string())),
        Err(panic) => Err(WorkerFailure::new(
            context.name(),
            format!("worker panicked: {}", panic_message(panic.as_ref())),
        )),
    };

    match &outcome {
        Ok(_) => info!("Worker {} finished in {:?}", context.name(), start.elapsed()),
        Err(failure) => error!("Worker {} failed: {}", context.name(), failure.message),
    }

    outcome
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
