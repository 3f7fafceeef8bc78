//! Bounded multi-worker queue executing operations in submission order.
//!
//! Submission never blocks: a full queue is reported to the caller, which
//! decides what to do with the operation (the bounded strategy runs it
//! inline). Shutdown drops the sender so workers drain what is already
//! queued before exiting.

use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use arc_swap::ArcSwapOption;
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use ldapflow_core::Operation;
use parking_lot::Mutex;
use tracing::{debug, info};

/// Tuning knobs for a [`WorkQueue`].
#[derive(Debug, Clone)]
pub struct WorkQueueConfig {
    /// Number of worker threads draining the queue.
    pub num_worker_threads: usize,
    /// Maximum number of operations waiting to be picked up. With a
    /// capacity of zero a submission only succeeds when a worker is
    /// already waiting for it.
    pub queue_capacity: usize,
    /// Prefix for worker thread names, suffixed with the worker index.
    pub thread_name_prefix: String,
}

impl Default for WorkQueueConfig {
    fn default() -> Self {
        Self {
            num_worker_threads: thread::available_parallelism().map_or(2, usize::from),
            queue_capacity: 256,
            thread_name_prefix: "ldapflow-worker".to_owned(),
        }
    }
}

/// Why a submission was not accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TrySubmitError {
    #[error("work queue is full")]
    QueueFull,
    #[error("work queue is shutting down")]
    ShuttingDown,
}

/// Point-in-time queue counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkQueueStats {
    pub submitted: u64,
    pub completed: u64,
    pub rejected: u64,
}

#[derive(Default)]
struct Counters {
    submitted: AtomicU64,
    completed: AtomicU64,
    rejected: AtomicU64,
}

/// A fixed pool of named worker threads fed from a bounded channel.
pub struct WorkQueue {
    tx: ArcSwapOption<Sender<Arc<dyn Operation>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    counters: Arc<Counters>,
}

impl WorkQueue {
    /// Starts the worker threads and returns the running queue.
    ///
    /// # Errors
    ///
    /// Returns an error when the operating system refuses to spawn a worker
    /// thread.
    pub fn start(config: &WorkQueueConfig) -> io::Result<Self> {
        let (tx, rx) = bounded::<Arc<dyn Operation>>(config.queue_capacity);
        let counters = Arc::new(Counters::default());

        let mut workers = Vec::with_capacity(config.num_worker_threads);
        for index in 0..config.num_worker_threads {
            let rx = rx.clone();
            let counters = Arc::clone(&counters);
            let handle = thread::Builder::new()
                .name(format!("{}-{index}", config.thread_name_prefix))
                .spawn(move || worker_loop(&rx, &counters))?;
            workers.push(handle);
        }
        info!(
            workers = config.num_worker_threads,
            capacity = config.queue_capacity,
            "work queue started"
        );

        Ok(Self {
            tx: ArcSwapOption::from_pointee(tx),
            workers: Mutex::new(workers),
            counters,
        })
    }

    /// Hands an operation to the workers without blocking.
    ///
    /// # Errors
    ///
    /// [`TrySubmitError::QueueFull`] when the queue is at capacity,
    /// [`TrySubmitError::ShuttingDown`] once shutdown has begun.
    pub fn try_submit(&self, op: Arc<dyn Operation>) -> Result<(), TrySubmitError> {
        let Some(tx) = self.tx.load_full() else {
            return Err(TrySubmitError::ShuttingDown);
        };
        match tx.try_send(op) {
            Ok(()) => {
                self.counters.submitted.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(TrySendError::Full(_)) => {
                self.counters.rejected.fetch_add(1, Ordering::Relaxed);
                Err(TrySubmitError::QueueFull)
            }
            Err(TrySendError::Disconnected(_)) => Err(TrySubmitError::ShuttingDown),
        }
    }

    /// Stops accepting submissions, lets workers drain the backlog, and
    /// joins them. Idempotent.
    pub fn shutdown(&self) {
        if self.tx.swap(None).is_none() {
            return;
        }
        debug!("work queue shutting down");
        let workers = std::mem::take(&mut *self.workers.lock());
        for handle in workers {
            // A worker that panicked already tore down its operation; the
            // queue itself stays usable for the remaining joins.
            let _ = handle.join();
        }
        info!(stats = ?self.stats(), "work queue stopped");
    }

    #[must_use]
    pub fn stats(&self) -> WorkQueueStats {
        WorkQueueStats {
            submitted: self.counters.submitted.load(Ordering::Relaxed),
            completed: self.counters.completed.load(Ordering::Relaxed),
            rejected: self.counters.rejected.load(Ordering::Relaxed),
        }
    }
}

impl Drop for WorkQueue {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(rx: &Receiver<Arc<dyn Operation>>, counters: &Counters) {
    // recv keeps returning queued operations after the sender is dropped,
    // so shutdown drains the backlog before the loop ends.
    while let Ok(op) = rx.recv() {
        op.run();
        counters.completed.fetch_add(1, Ordering::Relaxed);
    }
}
