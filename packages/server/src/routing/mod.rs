//! DN-based request routing: workflow nodes, the shared topology, and
//! network groups.

pub mod network_group;
pub mod node;
pub mod topology;

pub use network_group::{
    NetworkGroup, NetworkGroupId, NetworkGroupRegistry, RegistrationError, WorkflowKey,
    DEFAULT_NETWORK_GROUP_ID,
};
pub use node::{WorkflowId, WorkflowNode};
pub use topology::WorkflowTopology;
