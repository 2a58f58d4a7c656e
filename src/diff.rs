//! Diff between previously synchronized and currently observed membership.

use crate::membership::{MembershipSet, NodeEntry};

/// Nodes to publish and nodes to withdraw.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconciliationDiff {
    /// New nodes, and known nodes whose address changed (carrying the new address).
    pub added: Vec<NodeEntry>,
    /// Nodes no longer observed (carrying the last synchronized address).
    pub removed: Vec<NodeEntry>,
}

impl ReconciliationDiff {
    /// Compute the diff. Both lists are ordered by `node_id`.
    pub fn compute(previous: &MembershipSet, current: &MembershipSet) -> Self {
        let mut added = Vec::new();
        let mut removed = Vec::new();

        for entry in current.iter() {
            match previous.address_of(&entry.node_id) {
                None => added.push(entry),
                Some(old) if old != entry.address => added.push(entry),
                Some(_) => {}
            }
        }

        for entry in previous.iter() {
            if !current.contains(&entry.node_id) {
                removed.push(entry);
            }
        }

        Self { added, removed }
    }

    /// Whether there is nothing to do.
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }

    /// Total number of operations implied.
    pub fn len(&self) -> usize {
        self.added.len() + self.removed.len()
    }
}

/// Shorthand for [`ReconciliationDiff::compute`].
pub fn diff(previous: &MembershipSet, current: &MembershipSet) -> ReconciliationDiff {
    ReconciliationDiff::compute(previous, current)
}
