//! Network groups: named, independently lifecycled routing tables.
//!
//! A network group owns a workflow topology plus a dual index (base DN and
//! workflow id) over its registered workflows. A process-wide
//! [`NetworkGroupRegistry`] holds all groups and guarantees the default
//! group always exists.
//!
//! The root DSE workflow is held outside the topology: the empty DN is an
//! ancestor of every DN, so keeping it in the forest would swallow every
//! routing miss. It only ever serves requests targeting the root DSE
//! itself.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use ldapflow_core::Dn;
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use super::node::{WorkflowId, WorkflowNode};
use super::topology::WorkflowTopology;

/// Identifier of the distinguished default network group.
pub const DEFAULT_NETWORK_GROUP_ID: &str = "default";

/// Built-in suffixes every server exposes, pre-registered in the default
/// network group at startup.
const BUILTIN_SUFFIXES: &[&str] = &[
    "",
    "cn=config",
    "cn=schema",
    "cn=monitor",
    "cn=tasks",
    "cn=backups",
];

// ---------------------------------------------------------------------------
// Identifiers and keys
// ---------------------------------------------------------------------------

/// Unique network group identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NetworkGroupId(String);

impl NetworkGroupId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NetworkGroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lookup key for workflow deregistration: either identity works.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkflowKey {
    Dn(Dn),
    Id(WorkflowId),
}

/// Duplicate-registration failures, carrying the conflicting identifier.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistrationError {
    #[error("network group `{id}` already exists")]
    GroupExists { id: NetworkGroupId },
    #[error("workflow for base DN `{base_dn}` already exists in network group `{group}`")]
    WorkflowDnExists { group: NetworkGroupId, base_dn: Dn },
    #[error("workflow id `{workflow_id}` already exists in network group `{group}`")]
    WorkflowIdExists {
        group: NetworkGroupId,
        workflow_id: WorkflowId,
    },
}

// ---------------------------------------------------------------------------
// NetworkGroup
// ---------------------------------------------------------------------------

/// Dual index over registered workflows, mutated as a unit so the two key
/// spaces never diverge.
#[derive(Default)]
struct WorkflowIndex {
    by_dn: HashMap<Dn, Arc<WorkflowNode>>,
    by_id: HashMap<WorkflowId, Arc<WorkflowNode>>,
}

/// A named collection of workflows sharing one routing topology.
pub struct NetworkGroup {
    id: NetworkGroupId,
    topology: WorkflowTopology,
    index: RwLock<WorkflowIndex>,
    /// Workflow serving the root DSE, kept out of the topology forest.
    root_dse_workflow: ArcSwapOption<WorkflowNode>,
}

impl fmt::Debug for NetworkGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetworkGroup")
            .field("id", &self.id)
            .field("workflows", &self.index.read().by_dn.len())
            .finish()
    }
}

impl NetworkGroup {
    /// Creates an empty group with the given identifier.
    #[must_use]
    pub fn new(id: NetworkGroupId) -> Arc<Self> {
        Arc::new(Self {
            id,
            topology: WorkflowTopology::new(),
            index: RwLock::new(WorkflowIndex::default()),
            root_dse_workflow: ArcSwapOption::empty(),
        })
    }

    #[must_use]
    pub fn id(&self) -> &NetworkGroupId {
        &self.id
    }

    /// Number of registered workflows.
    #[must_use]
    pub fn workflow_count(&self) -> usize {
        self.index.read().by_dn.len()
    }

    /// Registers a workflow node, keyed by both its base DN and its id.
    ///
    /// # Errors
    ///
    /// Returns a [`RegistrationError`] when either key collides with a prior
    /// registration; the earlier registration stays intact.
    pub fn register_workflow(&self, node: Arc<WorkflowNode>) -> Result<(), RegistrationError> {
        let mut index = self.index.write();
        if index.by_dn.contains_key(node.base_dn()) {
            return Err(RegistrationError::WorkflowDnExists {
                group: self.id.clone(),
                base_dn: node.base_dn().clone(),
            });
        }
        if index.by_id.contains_key(node.workflow_id()) {
            return Err(RegistrationError::WorkflowIdExists {
                group: self.id.clone(),
                workflow_id: node.workflow_id().clone(),
            });
        }

        if node.base_dn().is_root_dse() {
            self.root_dse_workflow.store(Some(Arc::clone(&node)));
        } else {
            // Duplicates were rejected above, and all topology mutation goes
            // through the index lock, so this cannot fail.
            let registered = self.topology.register(&node);
            debug_assert!(registered);
        }

        index.by_dn.insert(node.base_dn().clone(), Arc::clone(&node));
        index.by_id.insert(node.workflow_id().clone(), node);
        Ok(())
    }

    /// Removes a workflow by base DN or by id. Unknown keys are a no-op
    /// returning `None`, keeping configuration teardown idempotent.
    pub fn deregister_workflow(&self, key: &WorkflowKey) -> Option<Arc<WorkflowNode>> {
        let mut index = self.index.write();
        let node = match key {
            WorkflowKey::Dn(dn) => index.by_dn.get(dn).cloned(),
            WorkflowKey::Id(id) => index.by_id.get(id).cloned(),
        }?;

        index.by_dn.remove(node.base_dn());
        index.by_id.remove(node.workflow_id());
        if node.base_dn().is_root_dse() {
            self.root_dse_workflow.store(None);
        } else {
            self.topology.deregister(&node);
        }
        debug!(group = %self.id, base_dn = %node.base_dn(), "workflow deregistered");
        Some(node)
    }

    /// Resolves the workflow responsible for `dn`, or `None` on a routing
    /// miss (the caller maps that to a no-such-object outcome).
    #[must_use]
    pub fn workflow_candidate(&self, dn: &Dn) -> Option<Arc<WorkflowNode>> {
        if dn.is_root_dse() {
            return self.root_dse_workflow.load_full();
        }
        self.topology.candidate(dn)
    }

    /// Looks up a workflow by either key without resolving ancestry.
    #[must_use]
    pub fn workflow(&self, key: &WorkflowKey) -> Option<Arc<WorkflowNode>> {
        let index = self.index.read();
        match key {
            WorkflowKey::Dn(dn) => index.by_dn.get(dn).cloned(),
            WorkflowKey::Id(id) => index.by_id.get(id).cloned(),
        }
    }
}

// ---------------------------------------------------------------------------
// NetworkGroupRegistry
// ---------------------------------------------------------------------------

/// Process-wide directory of network groups.
///
/// Constructed with the default group already present and populated with
/// the built-in suffixes; the default group cannot be deregistered.
pub struct NetworkGroupRegistry {
    groups: DashMap<NetworkGroupId, Arc<NetworkGroup>>,
    default_group: Arc<NetworkGroup>,
}

impl fmt::Debug for NetworkGroupRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetworkGroupRegistry")
            .field("groups", &self.groups.len())
            .finish()
    }
}

impl NetworkGroupRegistry {
    /// Creates a registry holding the pre-populated default group.
    ///
    /// # Panics
    ///
    /// Panics if a built-in suffix fails to parse or register, which would
    /// mean the built-in table itself is malformed.
    #[must_use]
    pub fn new() -> Self {
        let default_group = NetworkGroup::new(NetworkGroupId::new(DEFAULT_NETWORK_GROUP_ID));
        for suffix in BUILTIN_SUFFIXES {
            let base_dn: Dn = suffix.parse().expect("built-in suffix is well-formed");
            default_group
                .register_workflow(WorkflowNode::with_dn(base_dn))
                .expect("built-in suffixes are distinct");
        }

        let groups = DashMap::new();
        groups.insert(default_group.id().clone(), Arc::clone(&default_group));
        info!(suffixes = BUILTIN_SUFFIXES.len(), "default network group initialized");
        Self {
            groups,
            default_group,
        }
    }

    /// Adds a group to the directory.
    ///
    /// # Errors
    ///
    /// Returns [`RegistrationError::GroupExists`] when the identifier is
    /// taken; the existing group is untouched.
    pub fn register(&self, group: Arc<NetworkGroup>) -> Result<(), RegistrationError> {
        match self.groups.entry(group.id().clone()) {
            Entry::Occupied(occupied) => Err(RegistrationError::GroupExists {
                id: occupied.key().clone(),
            }),
            Entry::Vacant(vacant) => {
                debug!(group = %group.id(), "network group registered");
                vacant.insert(group);
                Ok(())
            }
        }
    }

    /// Removes a group from the directory. The default group is refused.
    pub fn deregister(&self, id: &NetworkGroupId) -> Option<Arc<NetworkGroup>> {
        if id.as_str() == DEFAULT_NETWORK_GROUP_ID {
            warn!("refusing to deregister the default network group");
            return None;
        }
        self.groups.remove(id).map(|(_, group)| group)
    }

    #[must_use]
    pub fn get(&self, id: &NetworkGroupId) -> Option<Arc<NetworkGroup>> {
        self.groups.get(id).map(|entry| Arc::clone(entry.value()))
    }

    /// The always-present default group.
    #[must_use]
    pub fn default_group(&self) -> Arc<NetworkGroup> {
        Arc::clone(&self.default_group)
    }

    /// Number of registered groups, the default included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

impl Default for NetworkGroupRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
