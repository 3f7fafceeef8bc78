//! Workflow tree nodes: base-DN-keyed routing vertices.
//!
//! Each node owns a base DN and a set of strictly-descendant subordinate
//! nodes. The parent link is a `Weak` back-reference so the tree has a
//! single ownership direction (parent owns subordinates); removal and
//! reparenting never create cycles.

use std::fmt;
use std::sync::{Arc, Weak};

use ldapflow_core::Dn;
use parking_lot::RwLock;

// ---------------------------------------------------------------------------
// WorkflowId
// ---------------------------------------------------------------------------

/// Opaque workflow identifier, unique within a network group.
///
/// Independent of the base DN as a key, though the default constructor
/// derives it from the DN's string form.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WorkflowId(String);

impl WorkflowId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The conventional identifier for a workflow serving `base_dn`.
    #[must_use]
    pub fn from_dn(base_dn: &Dn) -> Self {
        Self(base_dn.to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkflowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// WorkflowNode
// ---------------------------------------------------------------------------

/// A node in the workflow routing tree.
///
/// The base DN and workflow id are fixed at construction; only the tree
/// links mutate, under per-node `RwLock`s. Structural mutation happens on
/// the configuration path and is rare; candidate resolution takes read
/// locks only.
pub struct WorkflowNode {
    base_dn: Dn,
    workflow_id: WorkflowId,
    parent: RwLock<Weak<WorkflowNode>>,
    subordinates: RwLock<Vec<Arc<WorkflowNode>>>,
}

impl fmt::Debug for WorkflowNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkflowNode")
            .field("base_dn", &self.base_dn.to_string())
            .field("workflow_id", &self.workflow_id)
            .field("subordinates", &self.subordinates.read().len())
            .finish()
    }
}

impl WorkflowNode {
    /// Creates a detached node with an explicit workflow id.
    #[must_use]
    pub fn new(base_dn: Dn, workflow_id: WorkflowId) -> Arc<Self> {
        Arc::new(Self {
            base_dn,
            workflow_id,
            parent: RwLock::new(Weak::new()),
            subordinates: RwLock::new(Vec::new()),
        })
    }

    /// Creates a detached node whose id is derived from the base DN.
    #[must_use]
    pub fn with_dn(base_dn: Dn) -> Arc<Self> {
        let workflow_id = WorkflowId::from_dn(&base_dn);
        Self::new(base_dn, workflow_id)
    }

    #[must_use]
    pub fn base_dn(&self) -> &Dn {
        &self.base_dn
    }

    #[must_use]
    pub fn workflow_id(&self) -> &WorkflowId {
        &self.workflow_id
    }

    /// The current parent node, if attached.
    #[must_use]
    pub fn parent(&self) -> Option<Arc<WorkflowNode>> {
        self.parent.read().upgrade()
    }

    /// Snapshot of the current subordinate list.
    #[must_use]
    pub fn subordinates(&self) -> Vec<Arc<WorkflowNode>> {
        self.subordinates.read().clone()
    }

    /// Attempts to attach `candidate` as a subordinate of `self`.
    ///
    /// Returns `false` with no structural change when `candidate` is `self`,
    /// when its base DN equals this node's, or when its base DN is not a
    /// strict descendant of this node's (which covers the candidate being an
    /// ancestor of `self`).
    ///
    /// On success, any existing subordinate whose base DN falls under the
    /// candidate's is re-homed beneath the candidate first, so inserting an
    /// intermediate node after its eventual children keeps the tree's strict
    /// ancestor-to-descendant ordering.
    pub fn insert_subordinate(self: &Arc<Self>, candidate: &Arc<WorkflowNode>) -> bool {
        if Arc::ptr_eq(self, candidate)
            || candidate.base_dn == self.base_dn
            || !candidate.base_dn.is_descendant_of(&self.base_dn)
        {
            return false;
        }

        let mut subordinates = self.subordinates.write();

        // Re-home existing subordinates that belong under the candidate.
        let mut rehomed = Vec::new();
        subordinates.retain(|sub| {
            if sub.base_dn.is_descendant_of(&candidate.base_dn)
                && sub.base_dn != candidate.base_dn
            {
                rehomed.push(Arc::clone(sub));
                false
            } else {
                true
            }
        });
        if !rehomed.is_empty() {
            let mut candidate_subs = candidate.subordinates.write();
            for sub in rehomed {
                *sub.parent.write() = Arc::downgrade(candidate);
                candidate_subs.push(sub);
            }
        }

        *candidate.parent.write() = Arc::downgrade(self);
        subordinates.push(Arc::clone(candidate));
        true
    }

    /// Detaches this node from the tree.
    ///
    /// Subordinates are reattached directly to the former parent, so DNs
    /// that resolved exclusively to this node resolve to the parent
    /// afterwards. When this node had no parent, the now-orphaned
    /// subordinates are returned so the caller can promote them to roots.
    pub fn remove(self: &Arc<Self>) -> Vec<Arc<WorkflowNode>> {
        let former_parent = {
            let mut parent = self.parent.write();
            let upgraded = parent.upgrade();
            *parent = Weak::new();
            upgraded
        };
        let detached: Vec<Arc<WorkflowNode>> = std::mem::take(&mut *self.subordinates.write());

        match former_parent {
            Some(parent) => {
                let mut parent_subs = parent.subordinates.write();
                parent_subs.retain(|sub| !Arc::ptr_eq(sub, self));
                for sub in &detached {
                    *sub.parent.write() = Arc::downgrade(&parent);
                }
                parent_subs.extend(detached);
                Vec::new()
            }
            None => {
                for sub in &detached {
                    *sub.parent.write() = Weak::new();
                }
                detached
            }
        }
    }

    /// This node's base DN when `dn` equals or descends from it, else
    /// `None`. For callers that already hold a resolved node.
    #[must_use]
    pub fn parent_base_dn(&self, dn: &Dn) -> Option<Dn> {
        if self.base_dn.is_ancestor_of(dn) {
            Some(self.base_dn.clone())
        } else {
            None
        }
    }

    /// Longest-match descent: the deepest node in this subtree whose base DN
    /// is an ancestor-or-equal of `dn`, or `None` when even this node does
    /// not cover `dn`.
    ///
    /// A subordinate always wins over its parent since subordinate base DNs
    /// are strictly more specific.
    #[must_use]
    pub fn workflow_candidate(self: &Arc<Self>, dn: &Dn) -> Option<Arc<WorkflowNode>> {
        if !self.base_dn.is_ancestor_of(dn) {
            return None;
        }
        let mut current = Arc::clone(self);
        loop {
            let next = current
                .subordinates
                .read()
                .iter()
                .find(|sub| sub.base_dn.is_ancestor_of(dn))
                .cloned();
            match next {
                Some(sub) => current = sub,
                None => return Some(current),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn dn(s: &str) -> Dn {
        s.parse().unwrap()
    }

    fn node(s: &str) -> Arc<WorkflowNode> {
        WorkflowNode::with_dn(dn(s))
    }

    // -- insert_subordinate --

    #[test]
    fn insert_rejects_self() {
        let n = node("o=test1");
        let same = Arc::clone(&n);
        assert!(!n.insert_subordinate(&same));
        assert!(n.subordinates().is_empty());
    }

    #[test]
    fn insert_rejects_equal_base_dn() {
        let n = node("o=test1");
        let twin = node("O=Test1");
        assert!(!n.insert_subordinate(&twin));
        assert!(n.subordinates().is_empty());
        assert!(twin.parent().is_none());
    }

    #[test]
    fn insert_rejects_ancestor() {
        let child = node("ou=people,o=test1");
        let ancestor = node("o=test1");
        assert!(!child.insert_subordinate(&ancestor));
        assert!(child.subordinates().is_empty());
    }

    #[test]
    fn insert_rejects_unrelated_dn() {
        let n = node("o=test1");
        let other = node("o=test2");
        assert!(!n.insert_subordinate(&other));
        assert!(n.subordinates().is_empty());
    }

    #[test]
    fn insert_strict_descendant_succeeds() {
        let root = node("o=test1");
        let child = node("ou=people,o=test1");
        assert!(root.insert_subordinate(&child));
        assert_eq!(root.subordinates().len(), 1);
        assert!(Arc::ptr_eq(&child.parent().unwrap(), &root));
    }

    #[test]
    fn insert_intermediate_reparents_existing_child() {
        // Out-of-order insertion: the grandchild is attached first, then the
        // intermediate node arrives and must adopt it.
        let root = node("o=test1");
        let grandchild = node("cn=x,ou=people,o=test1");
        let intermediate = node("ou=people,o=test1");

        assert!(root.insert_subordinate(&grandchild));
        assert!(root.insert_subordinate(&intermediate));

        let root_subs = root.subordinates();
        assert_eq!(root_subs.len(), 1);
        assert!(Arc::ptr_eq(&root_subs[0], &intermediate));
        let inter_subs = intermediate.subordinates();
        assert_eq!(inter_subs.len(), 1);
        assert!(Arc::ptr_eq(&inter_subs[0], &grandchild));
        assert!(Arc::ptr_eq(&grandchild.parent().unwrap(), &intermediate));
    }

    // -- workflow_candidate --

    #[test]
    fn candidate_prefers_deepest_match() {
        let root = node("o=test1");
        let people = node("ou=people,o=test1");
        let admins = node("ou=admins,ou=people,o=test1");
        assert!(root.insert_subordinate(&people));
        assert!(people.insert_subordinate(&admins));

        let target = dn("cn=alice,ou=admins,ou=people,o=test1");
        let resolved = root.workflow_candidate(&target).unwrap();
        assert!(Arc::ptr_eq(&resolved, &admins));

        let target = dn("cn=bob,ou=people,o=test1");
        let resolved = root.workflow_candidate(&target).unwrap();
        assert!(Arc::ptr_eq(&resolved, &people));

        let target = dn("cn=carol,o=test1");
        let resolved = root.workflow_candidate(&target).unwrap();
        assert!(Arc::ptr_eq(&resolved, &root));
    }

    #[test]
    fn candidate_matches_base_dn_exactly() {
        let root = node("o=test1");
        let resolved = root.workflow_candidate(&dn("o=test1")).unwrap();
        assert!(Arc::ptr_eq(&resolved, &root));
    }

    #[test]
    fn candidate_returns_none_outside_subtree() {
        let root = node("o=test1");
        assert!(root.workflow_candidate(&dn("o=dummy")).is_none());
    }

    // -- remove --

    #[test]
    fn remove_reattaches_subordinates_to_parent() {
        // Three-level chain; removing the middle node re-routes its
        // exclusive DNs to the top node.
        let test1 = node("ou=test1");
        let test2 = node("ou=test2,ou=test1");
        let test3 = node("ou=test3,ou=test2,ou=test1");
        assert!(test1.insert_subordinate(&test2));
        assert!(test2.insert_subordinate(&test3));

        let orphans = test2.remove();
        assert!(orphans.is_empty());

        // test3 is now directly under test1.
        let subs = test1.subordinates();
        assert_eq!(subs.len(), 1);
        assert!(Arc::ptr_eq(&subs[0], &test3));
        assert!(Arc::ptr_eq(&test3.parent().unwrap(), &test1));
        assert!(test2.parent().is_none());
        assert!(test2.subordinates().is_empty());

        // A DN under the removed node but not under test3 resolves to test1.
        let probe = dn("ou=subordinate2,ou=test2,ou=test1");
        let resolved = test1.workflow_candidate(&probe).unwrap();
        assert!(Arc::ptr_eq(&resolved, &test1));
        assert_eq!(resolved.parent_base_dn(&probe), Some(dn("ou=test1")));

        // A DN under test3 still resolves to test3.
        let probe = dn("cn=deep,ou=test3,ou=test2,ou=test1");
        let resolved = test1.workflow_candidate(&probe).unwrap();
        assert!(Arc::ptr_eq(&resolved, &test3));
    }

    #[test]
    fn remove_root_returns_orphans() {
        let root = node("o=test1");
        let a = node("ou=a,o=test1");
        let b = node("ou=b,o=test1");
        assert!(root.insert_subordinate(&a));
        assert!(root.insert_subordinate(&b));

        let orphans = root.remove();
        assert_eq!(orphans.len(), 2);
        assert!(a.parent().is_none());
        assert!(b.parent().is_none());
    }

    // -- parent_base_dn --

    #[test]
    fn parent_base_dn_covers_equal_and_descendant() {
        let n = node("o=test1");
        assert_eq!(n.parent_base_dn(&dn("o=test1")), Some(dn("o=test1")));
        assert_eq!(
            n.parent_base_dn(&dn("ou=people,o=test1")),
            Some(dn("o=test1"))
        );
        assert_eq!(n.parent_base_dn(&dn("o=test2")), None);
    }

    // -- workflow id --

    #[test]
    fn workflow_id_derived_from_dn() {
        let n = node("ou=People,o=Example");
        assert_eq!(n.workflow_id().as_str(), "ou=People,o=Example");
    }
}
