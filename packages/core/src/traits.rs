//! Contracts between the connection layer, the operation classes, and the
//! dispatch core.
//!
//! The dispatch strategy deliberately sees operations through the narrowest
//! possible surface: a connection-validity probe and `run()`. Everything an
//! operation actually does (backend access, response writing) lives behind
//! the trait.

use std::sync::Arc;

/// A client connection as seen by the dispatch core.
///
/// The dispatch strategy consults [`ClientConnection::is_connection_valid`]
/// exactly once per submitted operation, before any queuing decision.
pub trait ClientConnection: Send + Sync {
    /// Whether the underlying connection is still usable. A `false` return
    /// causes the pending operation to be dropped without being run.
    fn is_connection_valid(&self) -> bool;
}

/// A request to cancel an operation before (or while) it runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CancelRequest {
    /// Human-readable reason, propagated into the cancellation response.
    pub reason: String,
    /// Whether the original requestor should receive a response.
    pub notify_original_requestor: bool,
}

impl CancelRequest {
    #[must_use]
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            notify_original_requestor: true,
        }
    }
}

/// Outcome of attempting to cancel an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelResult {
    /// The operation was canceled before it performed any work.
    Canceled,
    /// The operation had already completed.
    TooLate,
    /// The operation does not support cancellation.
    CannotCancel,
}

/// An executable server operation (search, modify, bind, ...).
///
/// Implementations are opaque to the routing and dispatch core, which only
/// reads the client connection and invokes [`Operation::run`] — either on
/// a worker thread or inline on the submitting thread. Everything else,
/// cancellation included, stays on the operation's side of the seam.
pub trait Operation: Send + Sync {
    /// The connection this operation arrived on.
    fn client_connection(&self) -> Arc<dyn ClientConnection>;

    /// Performs the operation's work. Called at most once per submission.
    ///
    /// Implementations must honor a pre-set cancellation before doing any
    /// work: when [`Operation::cancel_request`] returns one, call
    /// [`Operation::abort`] and return without performing the normal work.
    fn run(&self);

    /// A cancellation request set before the operation started running, if
    /// any. Consulted by [`Operation::run`] implementations, never by the
    /// dispatcher.
    fn cancel_request(&self) -> Option<CancelRequest> {
        None
    }

    /// Terminates the operation with a canceled result without performing
    /// its normal work. Default is a no-op.
    fn abort(&self, _request: &CancelRequest) {}
}
