//! Worker pool management
//!
//! A fixed set of named threads pulls jobs from one unbounded crossbeam
//! queue, so `submit` never blocks. Each job writes its outcome into the
//! result slot behind the [`PoolFuture`] handed back to the caller.

use crate::executor::{execute, WorkerContext};
use serde::{Deserialize, Serialize};
use spindle_core::{
    result_slot, CancellationSignal, Error, Outcome, PoolConfig, Result, ResultSlot, TaskId,
    TaskState, TaskStatus,
};
use spindle_telemetry::LoggingSnapshot;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Pool counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStats {
    /// Number of execution contexts
    pub size: usize,

    /// Tasks accepted by `submit`
    pub submitted: u64,

    /// Tasks that produced a value
    pub completed: u64,

    /// Tasks that failed or panicked
    pub failed: u64,
}

#[derive(Debug, Default)]
struct Counters {
    submitted: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
}

/// Fixed-size pool of reusable worker threads
pub struct WorkerPool {
    size: usize,
    sender: Option<crossbeam_channel::Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
    logging: Option<LoggingSnapshot>,
    counters: Arc<Counters>,
}

impl WorkerPool {
    /// Spawn `size` threads named `spindle-pool-{n}`
    pub fn new(size: usize) -> Result<Self> {
        if size == 0 {
            return Err(Error::Configuration(
                "pool size must be greater than 0".to_string(),
            ));
        }

        let (sender, receiver) = crossbeam_channel::unbounded::<Job>();
        let mut workers = Vec::with_capacity(size);

        for index in 0..size {
            let receiver = receiver.clone();
            let worker = thread::Builder::new()
                .name(format!("spindle-pool-{}", index))
                .spawn(move || {
                    for job in receiver.iter() {
                        job();
                    }
                    debug!("Pool thread exiting");
                })?;
            workers.push(worker);
        }

        info!("Started worker pool with {} threads", size);

        Ok(Self {
            size,
            sender: Some(sender),
            workers,
            logging: None,
            counters: Arc::new(Counters::default()),
        })
    }

    /// Create a pool sized by configuration
    pub fn from_config(config: &PoolConfig) -> Result<Self> {
        Self::new(config.size)
    }

    /// Re-attach this logging configuration at the start of every task
    pub fn with_logging(mut self, snapshot: LoggingSnapshot) -> Self {
        self.logging = Some(snapshot);
        self
    }

    /// Number of execution contexts
    pub fn size(&self) -> usize {
        self.size
    }

    /// Check if the pool still accepts tasks
    pub fn is_running(&self) -> bool {
        self.sender.is_some()
    }

    /// Current counters
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            size: self.size,
            submitted: self.counters.submitted.load(Ordering::Relaxed),
            completed: self.counters.completed.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
        }
    }

    /// Queue a task and return its future immediately
    pub fn submit<T, F>(&self, name: impl Into<String>, task: F) -> Result<PoolFuture<T>>
    where
        T: Send + 'static,
        F: FnOnce(&WorkerContext) -> Result<T> + Send + 'static,
    {
        self.dispatch(name.into(), None, task)
    }

    /// Queue a task that observes `signal`.
    ///
    /// The signal should come from a running
    /// [`SignalManager`](spindle_core::SignalManager) so it stays valid for
    /// as long as the pool does.
    pub fn submit_cancellable<T, F>(
        &self,
        name: impl Into<String>,
        signal: CancellationSignal,
        task: F,
    ) -> Result<PoolFuture<T>>
    where
        T: Send + 'static,
        F: FnOnce(&WorkerContext) -> Result<T> + Send + 'static,
    {
        self.dispatch(name.into(), Some(signal), task)
    }

    fn dispatch<T, F>(
        &self,
        name: String,
        cancellation: Option<CancellationSignal>,
        task: F,
    ) -> Result<PoolFuture<T>>
    where
        T: Send + 'static,
        F: FnOnce(&WorkerContext) -> Result<T> + Send + 'static,
    {
        let sender = self.sender.as_ref().ok_or(Error::PoolShutdown)?;

        let id = TaskId::new();
        let status = TaskStatus::new();
        let (writer, slot) = result_slot(name.clone());

        let context = WorkerContext::new(name.clone(), cancellation);
        let logging = self.logging.clone();
        let counters = Arc::clone(&self.counters);
        let task_status = status.clone();
        let task_id = id.clone();

        let job: Job = Box::new(move || {
            task_status.mark_running();
            debug!("Running task {} ({})", task_id, context.name());

            let outcome = execute(&context, logging.as_ref(), task);
            let success = outcome.is_ok();

            // state is terminal before the future can observe the outcome
            task_status.mark_finished(success);
            if success {
                counters.completed.fetch_add(1, Ordering::Relaxed);
            } else {
                counters.failed.fetch_add(1, Ordering::Relaxed);
            }
            writer.complete(outcome);
        });

        sender.send(job).map_err(|_| Error::PoolShutdown)?;
        self.counters.submitted.fetch_add(1, Ordering::Relaxed);
        debug!("Submitted task {} ({})", id, name);

        Ok(PoolFuture {
            id,
            name,
            status,
            slot,
        })
    }

    /// Stop accepting tasks, let the queue drain and join every thread.
    ///
    /// All outstanding futures are complete when this returns.
    pub async fn shutdown(&mut self) -> Result<PoolStats> {
        let workers = self.close();
        if !workers.is_empty() {
            info!("Shutting down worker pool, waiting for outstanding tasks");
            if let Err(e) = tokio::task::spawn_blocking(move || join_workers(workers)).await {
                warn!("Could not join pool threads: {}", e);
            }
        }

        let stats = self.stats();
        info!(
            "Worker pool stopped: {} completed, {} failed",
            stats.completed, stats.failed
        );
        Ok(stats)
    }

    fn close(&mut self) -> Vec<JoinHandle<()>> {
        // dropping the sender ends every thread's receive loop once the queue is empty
        self.sender.take();
        std::mem::take(&mut self.workers)
    }
}

fn join_workers(workers: Vec<JoinHandle<()>>) {
    for worker in workers {
        if worker.join().is_err() {
            warn!("Pool thread panicked outside a task");
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        let workers = self.close();
        join_workers(workers);
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("size", &self.size)
            .field("running", &self.is_running())
            .field("stats", &self.stats())
            .finish()
    }
}

/// Handle to the eventual outcome of one pool task
#[derive(Debug)]
pub struct PoolFuture<T> {
    id: TaskId,
    name: String,
    status: TaskStatus,
    slot: ResultSlot<T>,
}

impl<T> PoolFuture<T> {
    /// Task ID
    pub fn id(&self) -> &TaskId {
        &self.id
    }

    /// Task name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current lifecycle state
    pub fn state(&self) -> TaskState {
        self.status.get()
    }

    /// Check if the outcome can be read without waiting
    pub fn is_ready(&self) -> bool {
        self.slot.is_ready()
    }

    /// Wait for the outcome without cloning it
    pub async fn outcome(&self) -> &Outcome<T> {
        self.slot.outcome().await
    }
}

impl<T: Clone> PoolFuture<T> {
    /// Wait for the value, at most `timeout` when given.
    ///
    /// [`Error::Timeout`] only means "not yet"; the task keeps running and
    /// the call can be repeated.
    pub async fn get(&self, timeout: Option<Duration>) -> Result<T> {
        self.slot.get_timeout(timeout).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spindle_core::SignalManager;
    use std::time::Instant;

    fn sleeper(millis: u64) -> impl FnOnce(&WorkerContext) -> Result<u64> + Send + 'static {
        move |_| {
            thread::sleep(Duration::from_millis(millis));
            Ok(millis)
        }
    }

    #[test]
    fn test_zero_size_rejected() {
        assert!(matches!(WorkerPool::new(0), Err(Error::Configuration(_))));
    }

    #[tokio::test]
    async fn test_tasks_run_in_parallel() {
        let mut pool = WorkerPool::new(2).unwrap();

        let start = Instant::now();
        let first = pool.submit("first", sleeper(300)).unwrap();
        let second = pool.submit("second", sleeper(300)).unwrap();
        assert!(start.elapsed() < Duration::from_millis(100));

        assert_eq!(first.get(None).await.unwrap(), 300);
        assert_eq!(second.get(None).await.unwrap(), 300);
        assert!(start.elapsed() < Duration::from_millis(550));

        let stats = pool.shutdown().await.unwrap();
        assert_eq!(stats.submitted, 2);
        assert_eq!(stats.completed, 2);
    }

    #[tokio::test]
    async fn test_polling_get_retries_after_timeout() {
        let pool = WorkerPool::new(1).unwrap();
        let future = pool.submit("slow", sleeper(500)).unwrap();

        let mut timeouts = 0;
        let value = loop {
            match future.get(Some(Duration::from_millis(200))).await {
                Ok(value) => break value,
                Err(e) if e.is_timeout() => timeouts += 1,
                Err(e) => panic!("unexpected error: {}", e),
            }
        };

        assert_eq!(value, 500);
        assert!(timeouts >= 2, "only {} timeouts", timeouts);
    }

    #[tokio::test]
    async fn test_failures_and_panics_are_captured() {
        let mut pool = WorkerPool::new(2).unwrap();

        let failed: PoolFuture<()> = pool
            .submit("failing", |_| {
                Err(Error::Precondition("bad input".to_string()))
            })
            .unwrap();
        let panicked: PoolFuture<()> = pool
            .submit("panicking", |_| panic!("intentional test panic"))
            .unwrap();

        assert!(failed.get(None).await.unwrap_err().is_worker_failure());
        let err = panicked.get(None).await.unwrap_err();
        assert!(err.to_string().contains("intentional test panic"));
        assert_eq!(panicked.state(), TaskState::Failure);

        // the pool survives a panicking task
        let healthy = pool.submit("healthy", sleeper(1)).unwrap();
        assert_eq!(healthy.get(None).await.unwrap(), 1);

        let stats = pool.shutdown().await.unwrap();
        assert_eq!(stats.failed, 2);
        assert_eq!(stats.completed, 1);
    }

    #[tokio::test]
    async fn test_task_state_transitions() {
        let pool = WorkerPool::new(1).unwrap();
        let (release, gate) = crossbeam_channel::bounded::<()>(0);

        let blocker = pool
            .submit("blocker", move |_| {
                gate.recv().ok();
                Ok(())
            })
            .unwrap();
        let queued = pool.submit("queued", sleeper(1)).unwrap();

        // one thread, held by the blocker
        assert_eq!(queued.state(), TaskState::Pending);
        assert!(!queued.is_ready());

        release.send(()).unwrap();
        blocker.get(None).await.unwrap();
        queued.get(None).await.unwrap();

        assert_eq!(blocker.state(), TaskState::Success);
        assert_eq!(queued.state(), TaskState::Success);
        assert!(queued.is_ready());
        assert_ne!(blocker.id(), queued.id());
    }

    #[tokio::test]
    async fn test_cancellable_task_with_managed_signal() {
        let manager = SignalManager::new();
        manager.start();
        let signal = manager.signal().unwrap();

        let pool = WorkerPool::new(2).unwrap();
        let future = pool
            .submit_cancellable("spinner", signal.clone(), |ctx| {
                let signal = ctx.cancellation()?;
                while !signal.is_cancelled() {
                    thread::sleep(Duration::from_millis(1));
                }
                Ok(ctx.name().to_string())
            })
            .unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(signal.cancel());
        assert_eq!(future.get(None).await.unwrap(), "spinner");
    }

    #[tokio::test]
    async fn test_shutdown_waits_for_outstanding_tasks() {
        let mut pool = WorkerPool::new(1).unwrap();
        let first = pool.submit("first", sleeper(100)).unwrap();
        let second = pool.submit("second", sleeper(100)).unwrap();

        pool.shutdown().await.unwrap();
        assert!(first.is_ready());
        assert!(second.is_ready());

        assert!(matches!(
            pool.submit("late", sleeper(1)),
            Err(Error::PoolShutdown)
        ));
    }

    #[tokio::test]
    async fn test_pool_threads_are_named() {
        let pool = WorkerPool::new(1).unwrap();
        let future = pool
            .submit("whoami", |_| Ok(thread::current().name().map(str::to_string)))
            .unwrap();

        assert_eq!(
            future.get(None).await.unwrap().as_deref(),
            Some("spindle-pool-0")
        );
    }
}
