//! Cooperative cancellation across worker boundaries

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

use crate::{Error, Result};

/// One-shot cancellation flag shared between a coordinator and a worker.
///
/// Starts unset and can only ever move to set. Clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancellationSignal {
    flag: Arc<AtomicBool>,
}

impl CancellationSignal {
    /// Create a new, unset signal
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    ///
    /// Returns `true` if this call set the flag and `false` if it was
    /// already set. Setting an already-set signal is a no-op.
    pub fn cancel(&self) -> bool {
        !self.flag.swap(true, Ordering::AcqRel)
    }

    /// Check whether cancellation has been requested
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

/// Issues cancellation signals that pooled workers and the coordinator share.
///
/// Signals must be obtained from a running manager. Shutting the manager
/// down, or dropping it, sets every signal it issued.
#[derive(Debug, Default)]
pub struct SignalManager {
    running: AtomicBool,
    issued: Mutex<Vec<CancellationSignal>>,
}

impl SignalManager {
    /// Create a stopped manager
    pub fn new() -> Self {
        Self::default()
    }

    /// Start handing out signals
    pub fn start(&self) {
        if !self.running.swap(true, Ordering::SeqCst) {
            info!("Signal manager started");
        }
    }

    /// Check if the manager is running
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Issue a new signal
    pub fn signal(&self) -> Result<CancellationSignal> {
        if !self.is_running() {
            return Err(Error::ManagerNotRunning);
        }

        let signal = CancellationSignal::new();
        let mut issued = self.issued();
        issued.push(signal.clone());
        debug!("Issued cancellation signal #{}", issued.len());
        Ok(signal)
    }

    /// Number of signals issued so far
    pub fn issued_count(&self) -> usize {
        self.issued().len()
    }

    /// Stop the manager and set every signal it issued.
    ///
    /// Returns how many signals were still unset.
    pub fn shutdown(&self) -> usize {
        if !self.running.swap(false, Ordering::SeqCst) {
            return 0;
        }

        let released = self
            .issued()
            .iter()
            .filter(|signal| signal.cancel())
            .count();
        info!("Signal manager stopped, released {} pending signals", released);
        released
    }

    fn issued(&self) -> MutexGuard<'_, Vec<CancellationSignal>> {
        self.issued.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for SignalManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}
