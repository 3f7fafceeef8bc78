//! Configuration-driven wiring of backends onto the routing layer.

pub mod backend;

pub use backend::{BackendConfig, BackendRegistry, ChangeSummary};
