//! Backend configuration and its projection into workflow registrations.
//!
//! Each enabled backend contributes one workflow per base DN to a network
//! group. Applying a changed configuration diffs the backend's previous
//! base DN set against the new one and only touches the difference, so
//! unrelated suffixes keep routing without interruption.

use std::collections::HashMap;
use std::sync::Arc;

use ldapflow_core::Dn;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::routing::{NetworkGroup, WorkflowKey, WorkflowNode};

/// Declarative description of a backend, as read from configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Stable identifier, unique across backends.
    pub backend_id: String,
    /// Suffixes this backend serves.
    pub base_dns: Vec<Dn>,
    /// Disabled backends contribute no workflows.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

/// What a configuration change actually did to the routing table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSummary {
    /// Base DNs whose workflows were registered by this change.
    pub added: Vec<Dn>,
    /// Base DNs whose workflows were deregistered by this change.
    pub removed: Vec<Dn>,
}

impl ChangeSummary {
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Tracks which base DNs each backend currently has registered, and applies
/// configuration changes as minimal diffs against a network group.
pub struct BackendRegistry {
    group: Arc<NetworkGroup>,
    registered: Mutex<HashMap<String, Vec<Dn>>>,
}

impl BackendRegistry {
    #[must_use]
    pub fn new(group: Arc<NetworkGroup>) -> Self {
        Self {
            group,
            registered: Mutex::new(HashMap::new()),
        }
    }

    /// The network group this registry feeds.
    #[must_use]
    pub fn group(&self) -> &Arc<NetworkGroup> {
        &self.group
    }

    /// Applies a backend's configuration, registering workflows for newly
    /// listed base DNs and deregistering workflows for dropped ones.
    ///
    /// A base DN that collides with a workflow owned by another backend is
    /// logged and skipped; the rest of the change still applies. The
    /// returned summary reflects what actually happened.
    pub fn apply_backend_change(&self, config: &BackendConfig) -> ChangeSummary {
        let desired: Vec<Dn> = if config.enabled {
            config.base_dns.clone()
        } else {
            Vec::new()
        };

        let mut registered = self.registered.lock();
        let current = registered
            .get(&config.backend_id)
            .cloned()
            .unwrap_or_default();

        let mut summary = ChangeSummary::default();

        for dn in current.iter().filter(|dn| !desired.contains(dn)) {
            if self
                .group
                .deregister_workflow(&WorkflowKey::Dn(dn.clone()))
                .is_some()
            {
                summary.removed.push(dn.clone());
            }
        }

        for dn in desired.iter().filter(|dn| !current.contains(dn)) {
            match self
                .group
                .register_workflow(WorkflowNode::with_dn(dn.clone()))
            {
                Ok(()) => summary.added.push(dn.clone()),
                Err(error) => {
                    warn!(
                        backend_id = %config.backend_id,
                        base_dn = %dn,
                        %error,
                        "skipping conflicting base DN"
                    );
                }
            }
        }

        // Record only what is actually registered, so a later change diffs
        // against reality rather than against the requested configuration.
        let surviving: Vec<Dn> = current
            .into_iter()
            .filter(|dn| desired.contains(dn))
            .chain(summary.added.iter().cloned())
            .collect();
        if surviving.is_empty() {
            registered.remove(&config.backend_id);
        } else {
            registered.insert(config.backend_id.clone(), surviving);
        }

        if !summary.is_noop() {
            info!(
                backend_id = %config.backend_id,
                added = summary.added.len(),
                removed = summary.removed.len(),
                "backend routing updated"
            );
        }
        summary
    }

    /// Deregisters every workflow a backend contributed, as when the
    /// backend's configuration entry is deleted.
    pub fn remove_backend(&self, backend_id: &str) -> ChangeSummary {
        self.apply_backend_change(&BackendConfig {
            backend_id: backend_id.to_owned(),
            base_dns: Vec::new(),
            enabled: false,
        })
    }
}
