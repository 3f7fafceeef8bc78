//! Operation dispatch: the bounded work queue and the strategies that
//! decide whether a submission is queued, run inline, or dropped.

pub mod queue;
pub mod strategy;

pub use queue::{TrySubmitError, WorkQueue, WorkQueueConfig, WorkQueueStats};
pub use strategy::{
    BoundedWorkQueueStrategy, DirectDispatchStrategy, DispatchOutcome, DispatchStrategy,
};
