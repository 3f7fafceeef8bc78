//! Dispatch strategies sitting between the connection layer and the work
//! queue.
//!
//! The bounded strategy enforces an upper bound on concurrently admitted
//! operations and guarantees that a valid operation is never dropped: when
//! the bound is exceeded or the queue refuses the submission, the
//! operation runs inline on the submitting thread instead. Strategies see
//! operations through `client_connection()` and `run()` only; cancellation
//! is the operation's own concern inside `run()`.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use ldapflow_core::{CancelRequest, ClientConnection, Operation};
use tracing::{debug, trace};

use super::queue::WorkQueue;

/// Where a submitted operation ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Accepted by the work queue; a worker thread will run it.
    Queued,
    /// Executed to completion on the submitting thread.
    RanInline,
    /// Dropped before any queuing decision because its connection was no
    /// longer valid.
    DroppedInvalidConnection,
}

/// Decides how a submitted operation is executed.
pub trait DispatchStrategy: Send + Sync {
    /// Submits an operation for execution. Returns only after the operation
    /// has been queued, run inline, or dropped.
    fn submit(&self, op: Arc<dyn Operation>) -> DispatchOutcome;
}

// ---------------------------------------------------------------------------
// BoundedWorkQueueStrategy
// ---------------------------------------------------------------------------

/// Releases an admission slot when the tracked operation is dropped, which
/// happens after a worker finishes it or after the queue refuses it.
struct SlotGuard {
    running: Arc<AtomicUsize>,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.running.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Wraps an admitted operation so the slot travels with it onto the queue.
struct TrackedOperation {
    inner: Arc<dyn Operation>,
    _slot: SlotGuard,
}

impl Operation for TrackedOperation {
    fn client_connection(&self) -> Arc<dyn ClientConnection> {
        self.inner.client_connection()
    }

    fn run(&self) {
        self.inner.run();
    }

    fn cancel_request(&self) -> Option<CancelRequest> {
        self.inner.cancel_request()
    }

    fn abort(&self, request: &CancelRequest) {
        self.inner.abort(request);
    }
}

/// Queue-backed strategy with a cap on concurrently admitted operations.
pub struct BoundedWorkQueueStrategy {
    queue: Arc<WorkQueue>,
    max_concurrent_operations: usize,
    running: Arc<AtomicUsize>,
}

impl BoundedWorkQueueStrategy {
    /// A cap of zero disables admission tracking: every valid operation is
    /// offered to the queue and runs inline only when the queue refuses it.
    #[must_use]
    pub fn new(queue: Arc<WorkQueue>, max_concurrent_operations: usize) -> Self {
        Self {
            queue,
            max_concurrent_operations,
            running: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Operations currently holding an admission slot.
    #[must_use]
    pub fn running_operations(&self) -> usize {
        self.running.load(Ordering::Acquire)
    }
}

impl DispatchStrategy for BoundedWorkQueueStrategy {
    fn submit(&self, op: Arc<dyn Operation>) -> DispatchOutcome {
        // The validity probe happens exactly once, before any queuing
        // decision.
        if !op.client_connection().is_connection_valid() {
            debug!("dropping operation: connection no longer valid");
            return DispatchOutcome::DroppedInvalidConnection;
        }

        if self.max_concurrent_operations == 0 {
            if self.queue.try_submit(Arc::clone(&op)).is_ok() {
                return DispatchOutcome::Queued;
            }
            op.run();
            return DispatchOutcome::RanInline;
        }

        // Post-increment admission: one submission beyond the cap is still
        // queued, so a cap of N queues the first N+1 submissions.
        let prior = self.running.fetch_add(1, Ordering::AcqRel);
        if prior > self.max_concurrent_operations {
            self.running.fetch_sub(1, Ordering::AcqRel);
            trace!(running = prior, "admission cap reached, running inline");
            op.run();
            return DispatchOutcome::RanInline;
        }

        let tracked: Arc<dyn Operation> = Arc::new(TrackedOperation {
            inner: Arc::clone(&op),
            _slot: SlotGuard {
                running: Arc::clone(&self.running),
            },
        });
        if self.queue.try_submit(tracked).is_ok() {
            DispatchOutcome::Queued
        } else {
            // The refused wrapper was dropped inside try_submit, releasing
            // the slot before the inline run starts.
            op.run();
            DispatchOutcome::RanInline
        }
    }
}

// ---------------------------------------------------------------------------
// DirectDispatchStrategy
// ---------------------------------------------------------------------------

/// Runs every valid operation inline on the submitting thread. Used where
/// queuing is unwanted, such as administrative connections.
#[derive(Debug, Default)]
pub struct DirectDispatchStrategy;

impl DispatchStrategy for DirectDispatchStrategy {
    fn submit(&self, op: Arc<dyn Operation>) -> DispatchOutcome {
        if !op.client_connection().is_connection_valid() {
            debug!("dropping operation: connection no longer valid");
            return DispatchOutcome::DroppedInvalidConnection;
        }
        op.run();
        DispatchOutcome::RanInline
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicBool;
    use std::thread::{self, ThreadId};

    use crossbeam_channel::{unbounded, Receiver, Sender};
    use parking_lot::Mutex;

    use super::*;
    use crate::dispatch::queue::WorkQueueConfig;

    struct TestConnection {
        valid: bool,
    }

    impl ClientConnection for TestConnection {
        fn is_connection_valid(&self) -> bool {
            self.valid
        }
    }

    struct TestOperation {
        conn: Arc<TestConnection>,
        ran_on: Mutex<Option<ThreadId>>,
        // The operation blocks on this gate until the test opens it.
        gate: Option<Receiver<()>>,
        cancel: Option<CancelRequest>,
        aborted: AtomicBool,
    }

    impl TestOperation {
        fn valid() -> Arc<Self> {
            Self::build(true, None, None)
        }

        fn invalid() -> Arc<Self> {
            Self::build(false, None, None)
        }

        fn gated() -> (Arc<Self>, Sender<()>) {
            let (open, gate) = unbounded();
            (Self::build(true, Some(gate), None), open)
        }

        fn canceled(reason: &str) -> Arc<Self> {
            Self::build(true, None, Some(CancelRequest::new(reason)))
        }

        fn build(
            valid: bool,
            gate: Option<Receiver<()>>,
            cancel: Option<CancelRequest>,
        ) -> Arc<Self> {
            Arc::new(Self {
                conn: Arc::new(TestConnection { valid }),
                ran_on: Mutex::new(None),
                gate,
                cancel,
                aborted: AtomicBool::new(false),
            })
        }

        fn ran(&self) -> bool {
            self.ran_on.lock().is_some()
        }

        fn ran_on_current_thread(&self) -> bool {
            *self.ran_on.lock() == Some(thread::current().id())
        }
    }

    impl Operation for TestOperation {
        fn client_connection(&self) -> Arc<dyn ClientConnection> {
            self.conn.clone()
        }

        fn run(&self) {
            if let Some(request) = self.cancel_request() {
                self.abort(&request);
                return;
            }
            *self.ran_on.lock() = Some(thread::current().id());
            if let Some(gate) = &self.gate {
                let _ = gate.recv();
            }
        }

        fn cancel_request(&self) -> Option<CancelRequest> {
            self.cancel.clone()
        }

        fn abort(&self, _request: &CancelRequest) {
            self.aborted.store(true, Ordering::SeqCst);
        }
    }

    fn queue(workers: usize, capacity: usize) -> Arc<WorkQueue> {
        Arc::new(
            WorkQueue::start(&WorkQueueConfig {
                num_worker_threads: workers,
                queue_capacity: capacity,
                thread_name_prefix: "strategy-test".to_owned(),
            })
            .unwrap(),
        )
    }

    #[test]
    fn invalid_connection_dropped_before_queuing() {
        let q = queue(0, 4);
        let strategy = BoundedWorkQueueStrategy::new(Arc::clone(&q), 8);
        let op = TestOperation::invalid();

        let outcome = strategy.submit(Arc::clone(&op) as Arc<dyn Operation>);
        assert_eq!(outcome, DispatchOutcome::DroppedInvalidConnection);
        assert!(!op.ran());
        // Nothing reached the queue.
        assert_eq!(q.stats().submitted, 0);
        assert_eq!(strategy.running_operations(), 0);
    }

    #[test]
    fn cap_of_one_queues_two_then_runs_third_inline() {
        let q = queue(1, 4);
        let strategy = BoundedWorkQueueStrategy::new(Arc::clone(&q), 1);

        // Block the single worker so admitted slots stay occupied.
        let (first, open) = TestOperation::gated();
        assert_eq!(
            strategy.submit(Arc::clone(&first) as Arc<dyn Operation>),
            DispatchOutcome::Queued
        );
        // Post-increment admission: the second submission lands one past
        // the cap and is still queued.
        let second = TestOperation::valid();
        assert_eq!(
            strategy.submit(Arc::clone(&second) as Arc<dyn Operation>),
            DispatchOutcome::Queued,
            "second submission must be queued"
        );

        // Both slots held: the third valid operation is never dropped, it
        // runs here.
        let third = TestOperation::valid();
        assert_eq!(
            strategy.submit(Arc::clone(&third) as Arc<dyn Operation>),
            DispatchOutcome::RanInline
        );
        assert!(third.ran_on_current_thread());
        assert!(!second.ran());

        open.send(()).unwrap();
        q.shutdown();
        assert!(first.ran());
        assert!(second.ran());
        assert!(!second.ran_on_current_thread());
        // All slots released once the workers finished.
        assert_eq!(strategy.running_operations(), 0);
    }

    #[test]
    fn queue_refusal_falls_back_to_inline_and_releases_slot() {
        // No workers and zero capacity: the queue refuses everything.
        let q = queue(0, 0);
        let strategy = BoundedWorkQueueStrategy::new(q, 4);

        let op = TestOperation::valid();
        assert_eq!(
            strategy.submit(Arc::clone(&op) as Arc<dyn Operation>),
            DispatchOutcome::RanInline
        );
        assert!(op.ran_on_current_thread());
        assert_eq!(strategy.running_operations(), 0);
    }

    #[test]
    fn zero_cap_disables_admission_tracking() {
        let q = queue(1, 4);
        let strategy = BoundedWorkQueueStrategy::new(Arc::clone(&q), 0);

        let op = TestOperation::valid();
        assert_eq!(
            strategy.submit(Arc::clone(&op) as Arc<dyn Operation>),
            DispatchOutcome::Queued
        );
        assert_eq!(strategy.running_operations(), 0);
        q.shutdown();
        assert!(op.ran());
    }

    #[test]
    fn zero_cap_still_never_drops_on_refusal() {
        let q = queue(0, 0);
        let strategy = BoundedWorkQueueStrategy::new(q, 0);

        let op = TestOperation::valid();
        assert_eq!(
            strategy.submit(Arc::clone(&op) as Arc<dyn Operation>),
            DispatchOutcome::RanInline
        );
        assert!(op.ran_on_current_thread());
    }

    #[test]
    fn canceled_operation_is_aborted_on_inline_path() {
        let q = queue(0, 0);
        let strategy = BoundedWorkQueueStrategy::new(q, 4);

        let op = TestOperation::canceled("client unbind");
        assert_eq!(
            strategy.submit(Arc::clone(&op) as Arc<dyn Operation>),
            DispatchOutcome::RanInline
        );
        assert!(op.aborted.load(Ordering::SeqCst));
        assert!(!op.ran());
    }

    #[test]
    fn canceled_operation_is_aborted_on_queued_path() {
        let q = queue(1, 4);
        let strategy = BoundedWorkQueueStrategy::new(Arc::clone(&q), 4);

        let op = TestOperation::canceled("client unbind");
        assert_eq!(
            strategy.submit(Arc::clone(&op) as Arc<dyn Operation>),
            DispatchOutcome::Queued
        );
        q.shutdown();
        assert!(op.aborted.load(Ordering::SeqCst));
        assert!(!op.ran());
        assert_eq!(strategy.running_operations(), 0);
    }

    #[test]
    fn direct_strategy_runs_inline_and_checks_validity() {
        let strategy = DirectDispatchStrategy;

        let op = TestOperation::valid();
        assert_eq!(
            strategy.submit(Arc::clone(&op) as Arc<dyn Operation>),
            DispatchOutcome::RanInline
        );
        assert!(op.ran_on_current_thread());

        let invalid = TestOperation::invalid();
        assert_eq!(
            strategy.submit(Arc::clone(&invalid) as Arc<dyn Operation>),
            DispatchOutcome::DroppedInvalidConnection
        );
        assert!(!invalid.ran());
    }
}
