//! Single-value result slots
//!
//! A worker owns the [`ResultWriter`] and the coordinator owns the matching
//! [`ResultSlot`]. The writer is consumed by [`ResultWriter::complete`], so a
//! slot can receive at most one value. The first read waits for it; every
//! later read returns the cached outcome without waiting.

use std::sync::OnceLock;
use std::time::Duration;
use tokio::sync::oneshot::{self, error::TryRecvError};
use tokio::sync::Mutex;

use crate::{Error, Result, WorkerFailure};

/// Success value or captured failure of one worker execution
pub type Outcome<T> = std::result::Result<T, WorkerFailure>;

/// Create a connected writer/slot pair for the named worker
pub fn result_slot<T>(worker: impl Into<String>) -> (ResultWriter<T>, ResultSlot<T>) {
    let worker = worker.into();
    let (tx, rx) = oneshot::channel();

    let writer = ResultWriter {
        worker: worker.clone(),
        tx,
    };
    let slot = ResultSlot {
        worker,
        receiver: Mutex::new(rx),
        value: OnceLock::new(),
    };

    (writer, slot)
}

/// Write side of a result slot, held by the worker
#[derive(Debug)]
pub struct ResultWriter<T> {
    worker: String,
    tx: oneshot::Sender<Outcome<T>>,
}

impl<T> ResultWriter<T> {
    /// Name of the worker this writer belongs to
    pub fn worker(&self) -> &str {
        &self.worker
    }

    /// Publish the outcome. Returns `false` if the slot was already dropped.
    pub fn complete(self, outcome: Outcome<T>) -> bool {
        self.tx.send(outcome).is_ok()
    }
}

/// Read side of a result slot, held by the coordinator
#[derive(Debug)]
pub struct ResultSlot<T> {
    worker: String,
    receiver: Mutex<oneshot::Receiver<Outcome<T>>>,
    value: OnceLock<Outcome<T>>,
}

impl<T> ResultSlot<T> {
    /// Name of the worker that fills this slot
    pub fn worker(&self) -> &str {
        &self.worker
    }

    fn lost(&self) -> Outcome<T> {
        Err(WorkerFailure::new(
            &self.worker,
            "worker exited without reporting a result",
        ))
    }

    /// Wait for the outcome, caching it on first arrival
    pub async fn outcome(&self) -> &Outcome<T> {
        if let Some(outcome) = self.value.get() {
            return outcome;
        }

        let mut receiver = self.receiver.lock().await;
        if let Some(outcome) = self.value.get() {
            return outcome;
        }

        // Dropping this future (e.g. on timeout) leaves the value in the channel
        let outcome = match (&mut *receiver).await {
            Ok(outcome) => outcome,
            Err(_) => self.lost(),
        };
        self.value.get_or_init(|| outcome)
    }

    /// Outcome if it is available right now
    pub fn try_outcome(&self) -> Option<&Outcome<T>> {
        if let Some(outcome) = self.value.get() {
            return Some(outcome);
        }

        // Another reader is waiting on the channel, so nothing has arrived yet
        let mut receiver = self.receiver.try_lock().ok()?;
        if let Some(outcome) = self.value.get() {
            return Some(outcome);
        }

        let outcome = match receiver.try_recv() {
            Ok(outcome) => outcome,
            Err(TryRecvError::Empty) => return None,
            Err(TryRecvError::Closed) => self.lost(),
        };
        Some(self.value.get_or_init(|| outcome))
    }

    /// Check if the outcome is available without waiting
    pub fn is_ready(&self) -> bool {
        self.try_outcome().is_some()
    }
}

impl<T: Clone> ResultSlot<T> {
    /// Wait for the value; failures surface as [`Error::WorkerFailed`]
    pub async fn get(&self) -> Result<T> {
        self.outcome().await.clone().map_err(Error::from)
    }

    /// Wait at most `timeout` for the value, or forever when `None`.
    ///
    /// An elapsed wait returns [`Error::Timeout`] and leaves the slot
    /// untouched, so the call can simply be repeated.
    pub async fn get_timeout(&self, timeout: Option<Duration>) -> Result<T> {
        match timeout {
            None => self.get().await,
            Some(limit) => tokio::time::timeout(limit, self.get())
                .await
                .map_err(|_| Error::Timeout(limit))?,
        }
    }

    /// Value if available right now, [`Error::NotFinished`] otherwise
    pub fn try_get(&self) -> Result<T> {
        match self.try_outcome() {
            Some(outcome) => outcome.clone().map_err(Error::from),
            None => Err(Error::NotFinished(self.worker.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[tokio::test]
    async fn test_second_read_returns_cached_value() {
        let (writer, slot) = result_slot::<u64>("series-worker");
        assert!(writer.complete(Ok(42)));

        assert_eq!(slot.get().await.unwrap(), 42);

        let start = Instant::now();
        assert_eq!(slot.get().await.unwrap(), 42);
        assert_eq!(slot.try_get().unwrap(), 42);
        assert!(start.elapsed() < Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_read_blocks_until_written() {
        let (writer, slot) = result_slot::<&'static str>("slow");

        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(150));
            writer.complete(Ok("done"));
        });

        let start = Instant::now();
        assert_eq!(slot.get().await.unwrap(), "done");
        assert!(start.elapsed() >= Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_timeout_leaves_slot_usable() {
        let (writer, slot) = result_slot::<u32>("slow");

        let err = slot
            .get_timeout(Some(Duration::from_millis(20)))
            .await
            .unwrap_err();
        assert!(err.is_timeout());
        assert!(matches!(slot.try_get(), Err(Error::NotFinished(_))));

        writer.complete(Ok(7));
        assert_eq!(
            slot.get_timeout(Some(Duration::from_millis(20))).await.unwrap(),
            7
        );
    }

    #[tokio::test]
    async fn test_failure_is_distinguishable() {
        let (writer, slot) = result_slot::<u32>("survey-worker");
        writer.complete(Err(WorkerFailure::new("survey-worker", "file vanished")));

        let err = slot.get().await.unwrap_err();
        assert!(err.is_worker_failure());

        // cached failures are re-readable too
        assert!(slot.get().await.unwrap_err().is_worker_failure());
    }

    #[tokio::test]
    async fn test_dropped_writer_reports_failure() {
        let (writer, slot) = result_slot::<u32>("crashed");
        drop(writer);

        match slot.get().await {
            Err(Error::WorkerFailed { worker, .. }) => assert_eq!(worker, "crashed"),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn test_try_get_without_runtime() {
        let (writer, slot) = result_slot::<u8>("sync");
        assert!(!slot.is_ready());

        writer.complete(Ok(1));
        assert!(slot.is_ready());
        assert_eq!(slot.try_get().unwrap(), 1);
    }
}
