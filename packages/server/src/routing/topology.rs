//! Workflow topology: a forest of routing trees behind a copy-on-write
//! snapshot.
//!
//! Structural changes (register/deregister) mutate the node forest under a
//! write lock and then publish a flat routing snapshot via `ArcSwap`.
//! Candidate resolution — the per-request hot path — reads the current
//! snapshot lock-free and never observes a partially linked node.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use ldapflow_core::Dn;
use parking_lot::RwLock;
use tracing::debug;

use super::node::WorkflowNode;

/// Immutable flat view of every registered node, published atomically.
struct RoutingSnapshot {
    entries: Vec<(Dn, Arc<WorkflowNode>)>,
}

/// A forest of workflow routing trees keyed by base DN.
///
/// Registration keeps the forest's strict ancestor-to-descendant ordering:
/// a new node is attached beneath the deepest registered ancestor of its
/// base DN, and any existing nodes that fall under it (roots or
/// subordinates) are re-homed beneath it.
pub struct WorkflowTopology {
    roots: RwLock<Vec<Arc<WorkflowNode>>>,
    snapshot: ArcSwap<RoutingSnapshot>,
    generation: AtomicU64,
}

impl std::fmt::Debug for WorkflowTopology {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowTopology")
            .field("roots", &self.roots.read().len())
            .field("registered", &self.snapshot.load().entries.len())
            .field("generation", &self.generation.load(Ordering::Relaxed))
            .finish()
    }
}

impl WorkflowTopology {
    /// Creates an empty topology.
    #[must_use]
    pub fn new() -> Self {
        Self {
            roots: RwLock::new(Vec::new()),
            snapshot: ArcSwap::from_pointee(RoutingSnapshot { entries: Vec::new() }),
            generation: AtomicU64::new(0),
        }
    }

    /// Number of registered nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.snapshot.load().entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot generation, bumped on every structural change.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Current root nodes (cloned list).
    #[must_use]
    pub fn roots(&self) -> Vec<Arc<WorkflowNode>> {
        self.roots.read().clone()
    }

    /// Inserts a detached node at the correct point in the forest.
    ///
    /// Returns `false` with no structural change when a node with the same
    /// base DN is already registered.
    pub fn register(&self, node: &Arc<WorkflowNode>) -> bool {
        let mut roots = self.roots.write();

        // Roots are pairwise non-nested, so at most one covers the new DN.
        let anchor = roots
            .iter()
            .find(|root| root.base_dn().is_ancestor_of(node.base_dn()))
            .cloned();

        if let Some(anchor) = anchor {
            let Some(attach_point) = anchor.workflow_candidate(node.base_dn()) else {
                return false;
            };
            if attach_point.base_dn() == node.base_dn() {
                return false;
            }
            if !attach_point.insert_subordinate(node) {
                return false;
            }
        } else {
            // New root: adopt existing roots that fall under it.
            let mut remaining = Vec::with_capacity(roots.len() + 1);
            for root in roots.drain(..) {
                if root.base_dn().is_descendant_of(node.base_dn()) {
                    let adopted = node.insert_subordinate(&root);
                    debug_assert!(adopted, "root adoption must preserve strict ordering");
                } else {
                    remaining.push(root);
                }
            }
            remaining.push(Arc::clone(node));
            *roots = remaining;
        }

        self.publish(&roots);
        debug!(base_dn = %node.base_dn(), "workflow node registered");
        true
    }

    /// Detaches a node; its subordinates reattach to the former parent, or
    /// become roots when the node itself was a root.
    pub fn deregister(&self, node: &Arc<WorkflowNode>) {
        let mut roots = self.roots.write();
        if let Some(pos) = roots.iter().position(|root| Arc::ptr_eq(root, node)) {
            roots.remove(pos);
            let orphans = node.remove();
            roots.extend(orphans);
        } else {
            let orphans = node.remove();
            debug_assert!(orphans.is_empty(), "non-root removal reattaches to parent");
        }
        self.publish(&roots);
        debug!(base_dn = %node.base_dn(), "workflow node deregistered");
    }

    /// Longest-match resolution against the current snapshot: the
    /// registered node with the most specific base DN covering `dn`, or
    /// `None` on a routing miss.
    #[must_use]
    pub fn candidate(&self, dn: &Dn) -> Option<Arc<WorkflowNode>> {
        let snapshot = self.snapshot.load();
        snapshot
            .entries
            .iter()
            .filter(|(base, _)| base.is_ancestor_of(dn))
            .max_by_key(|(base, _)| base.num_components())
            .map(|(_, node)| Arc::clone(node))
    }

    /// Rebuilds and atomically swaps the flat routing snapshot.
    fn publish(&self, roots: &[Arc<WorkflowNode>]) {
        let mut entries = Vec::new();
        let mut stack: Vec<Arc<WorkflowNode>> = roots.to_vec();
        while let Some(node) = stack.pop() {
            entries.push((node.base_dn().clone(), Arc::clone(&node)));
            stack.extend(node.subordinates());
        }
        self.snapshot.store(Arc::new(RoutingSnapshot { entries }));
        self.generation.fetch_add(1, Ordering::Release);
    }
}

impl Default for WorkflowTopology {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
