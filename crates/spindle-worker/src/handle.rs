//! Explicit worker handles
//!
//! A [`WorkerHandle`] owns one payload and runs it on a dedicated, named OS
//! thread. The coordinator keeps the cancellation signal and the read side of
//! the result slot; the thread gets clones of the signal and the write side.
//! Nothing else crosses the boundary.

use crate::executor::{execute, WorkerContext};
use spindle_core::{
    result_slot, CancellationSignal, Error, Outcome, Result, ResultSlot, ResultWriter,
};
use spindle_telemetry::LoggingSnapshot;
use std::io;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

type Payload<T> = Box<dyn FnOnce(&WorkerContext) -> Result<T> + Send + 'static>;
type ThreadBody = Box<dyn FnOnce() + Send + 'static>;

/// Flips the exit flag when the worker thread unwinds or returns
struct ExitGuard(watch::Sender<bool>);

impl Drop for ExitGuard {
    fn drop(&mut self) {
        self.0.send_replace(true);
    }
}

/// Everything the worker thread takes ownership of when it starts
struct Launch<T> {
    payload: Payload<T>,
    writer: ResultWriter<T>,
    exit_tx: watch::Sender<bool>,
}

/// One payload running in its own isolated thread
pub struct WorkerHandle<T> {
    name: String,
    cancellation: Option<CancellationSignal>,
    logging: Option<LoggingSnapshot>,
    launch: Option<Launch<T>>,
    slot: ResultSlot<T>,
    exited: watch::Receiver<bool>,
    thread: Option<JoinHandle<()>>,
    started: bool,
}

impl<T: Send + 'static> WorkerHandle<T> {
    /// Wrap `payload`. A cancellation signal is created only when
    /// `needs_cancellation` is set.
    pub fn new<F>(name: impl Into<String>, needs_cancellation: bool, payload: F) -> Self
    where
        F: FnOnce(&WorkerContext) -> Result<T> + Send + 'static,
    {
        let name = name.into();
        let (writer, slot) = result_slot(name.clone());
        let (exit_tx, exited) = watch::channel(false);

        Self {
            cancellation: needs_cancellation.then(CancellationSignal::new),
            name,
            logging: None,
            launch: Some(Launch {
                payload: Box::new(payload),
                writer,
                exit_tx,
            }),
            slot,
            exited,
            thread: None,
            started: false,
        }
    }

    /// Re-attach this logging configuration inside the worker thread
    pub fn with_logging(mut self, snapshot: LoggingSnapshot) -> Self {
        self.logging = Some(snapshot);
        self
    }

    /// Spawn the worker thread.
    ///
    /// If the thread cannot be spawned the handle stays unstarted and
    /// `start` may be called again.
    pub fn start(&mut self) -> Result<()> {
        self.start_with(|builder, body| builder.spawn(body))
    }

    fn start_with<S>(&mut self, spawn: S) -> Result<()>
    where
        S: FnOnce(thread::Builder, ThreadBody) -> io::Result<JoinHandle<()>>,
    {
        let launch = self
            .launch
            .take()
            .ok_or_else(|| Error::AlreadyStarted(self.name.clone()))?;

        // shared with the thread body so a failed spawn can hand the parts back
        let pending = Arc::new(Mutex::new(Some(launch)));
        let thread_pending = Arc::clone(&pending);
        let context = WorkerContext::new(self.name.clone(), self.cancellation.clone());
        let logging = self.logging.clone();

        let body: ThreadBody = Box::new(move || {
            let launch = thread_pending
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take();
            let Some(Launch {
                payload,
                writer,
                exit_tx,
            }) = launch
            else {
                return;
            };

            let _exit = ExitGuard(exit_tx);
            let outcome = execute(&context, logging.as_ref(), payload);
            if !writer.complete(outcome) {
                debug!("Result of {} was discarded", context.name());
            }
        });

        match spawn(thread::Builder::new().name(self.name.clone()), body) {
            Ok(thread) => {
                self.thread = Some(thread);
                self.started = true;
                info!("Started worker {}", self.name);
                Ok(())
            }
            Err(e) => {
                self.launch = pending
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .take();
                warn!("Could not spawn worker {}: {}", self.name, e);
                Err(Error::Io(e))
            }
        }
    }
}

impl<T> WorkerHandle<T> {
    /// Worker name, also used as its thread name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The coordinator's side of the cancellation signal, if any
    pub fn cancellation(&self) -> Option<&CancellationSignal> {
        self.cancellation.as_ref()
    }

    /// Check if the worker was started
    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Check if the worker thread is running right now
    pub fn is_alive(&self) -> bool {
        self.started && !*self.exited.borrow()
    }

    /// Ask the worker to stop at its next check.
    ///
    /// Returns `true` if this call set the signal. Cancelling a finished or
    /// already-cancelled worker is a no-op.
    pub fn request_cancel(&self) -> Result<bool> {
        let signal = self
            .cancellation
            .as_ref()
            .ok_or_else(|| Error::CancellationUnsupported(self.name.clone()))?;

        let set = signal.cancel();
        if set {
            info!("Requested cancellation of {}", self.name);
        }
        Ok(set)
    }

    /// Wait for the worker thread to exit.
    ///
    /// With `Some(limit)` this returns `Ok(false)` when the thread is still
    /// running after `limit`; with `None` it waits as long as it takes.
    pub async fn join(&mut self, timeout: Option<Duration>) -> Result<bool> {
        if !self.started {
            return Err(Error::NotStarted(self.name.clone()));
        }

        let mut exited = self.exited.clone();
        let wait = async move {
            // a closed channel means the guard already ran
            let _ = exited.wait_for(|done| *done).await;
        };

        match timeout {
            None => wait.await,
            Some(limit) => {
                if tokio::time::timeout(limit, wait).await.is_err() {
                    return Ok(false);
                }
            }
        }

        if let Some(thread) = self.thread.take() {
            match tokio::task::spawn_blocking(move || thread.join()).await {
                Ok(Ok(())) => debug!("Joined worker {}", self.name),
                Ok(Err(_)) => warn!("Worker thread {} panicked outside its payload", self.name),
                Err(e) => warn!("Could not reap worker thread {}: {}", self.name, e),
            }
        }
        Ok(true)
    }

    /// Wait for the outcome without cloning it
    pub async fn outcome(&self) -> Result<&Outcome<T>> {
        if !self.started {
            return Err(Error::NotStarted(self.name.clone()));
        }
        Ok(self.slot.outcome().await)
    }
}

impl<T: Clone> WorkerHandle<T> {
    /// Wait for the worker's value.
    ///
    /// Blocks until the worker writes it; later calls return the cached value.
    pub async fn result(&self) -> Result<T> {
        if !self.started {
            return Err(Error::NotStarted(self.name.clone()));
        }
        self.slot.get().await
    }

    /// The value if the worker already reported it
    pub fn try_result(&self) -> Result<T> {
        if !self.started {
            return Err(Error::NotStarted(self.name.clone()));
        }
        self.slot.try_get()
    }
}

impl<T> Drop for WorkerHandle<T> {
    fn drop(&mut self) {
        // the thread is detached, it must not keep spinning without an owner
        if self.is_alive() {
            if let Some(signal) = &self.cancellation {
                if signal.cancel() {
                    debug!("Cancelled {} on drop", self.name);
                }
            }
        }
    }
}

impl<T> std::fmt::Debug for WorkerHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerHandle")
            .field("name", &self.name)
            .field("cancellable", &self.cancellation.is_some())
            .field("started", &self.started)
            .field("alive", &self.is_alive())
            .finish()
    }
}
