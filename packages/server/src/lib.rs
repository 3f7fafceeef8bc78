//! ldapflow Server — DN-routed workflow topology, network groups, and
//! bounded operation dispatch.

pub mod config;
pub mod dispatch;
pub mod routing;

pub use config::{BackendConfig, BackendRegistry, ChangeSummary};
pub use dispatch::{
    BoundedWorkQueueStrategy, DirectDispatchStrategy, DispatchOutcome, DispatchStrategy,
    TrySubmitError, WorkQueue, WorkQueueConfig, WorkQueueStats,
};
pub use routing::{
    NetworkGroup, NetworkGroupId, NetworkGroupRegistry, RegistrationError, WorkflowId,
    WorkflowKey, WorkflowNode, WorkflowTopology, DEFAULT_NETWORK_GROUP_ID,
};
