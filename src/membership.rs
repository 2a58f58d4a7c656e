//! Cluster membership as seen by the synchronizer.
//!
//! A [`MembershipSet`] is keyed by `node_id`, so "same node, new address" is an
//! ordinary map lookup rather than a set-membership quirk.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One externally reachable node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeEntry {
    /// Cluster-assigned stable node name.
    pub node_id: String,
    /// External address published as the record content.
    pub address: String,
}

impl NodeEntry {
    /// Build an entry.
    pub fn new(node_id: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            address: address.into(),
        }
    }
}

/// Set of nodes, unique by `node_id`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MembershipSet {
    /// node_id -> address
    nodes: BTreeMap<String, String>,
}

impl MembershipSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an entry, replacing any previous address for the same node.
    /// Returns the replaced address.
    pub fn insert(&mut self, entry: NodeEntry) -> Option<String> {
        self.nodes.insert(entry.node_id, entry.address)
    }

    /// Remove a node by id.
    pub fn remove(&mut self, node_id: &str) -> Option<NodeEntry> {
        self.nodes
            .remove_entry(node_id)
            .map(|(node_id, address)| NodeEntry { node_id, address })
    }

    /// Address recorded for a node.
    pub fn address_of(&self, node_id: &str) -> Option<&str> {
        self.nodes.get(node_id).map(String::as_str)
    }

    /// Whether the node is present.
    pub fn contains(&self, node_id: &str) -> bool {
        self.nodes.contains_key(node_id)
    }

    /// Get a node by id.
    pub fn get(&self, node_id: &str) -> Option<NodeEntry> {
        self.address_of(node_id)
            .map(|address| NodeEntry::new(node_id, address))
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Entries ordered by `node_id`.
    pub fn iter(&self) -> impl Iterator<Item = NodeEntry> + '_ {
        self.nodes
            .iter()
            .map(|(node_id, address)| NodeEntry::new(node_id.as_str(), address.as_str()))
    }

    /// Entries ordered by `node_id`, as an owned vector.
    pub fn to_entries(&self) -> Vec<NodeEntry> {
        self.iter().collect()
    }
}

impl FromIterator<NodeEntry> for MembershipSet {
    fn from_iter<I: IntoIterator<Item = NodeEntry>>(iter: I) -> Self {
        let mut set = MembershipSet::new();
        for entry in iter {
            set.insert(entry);
        }
        set
    }
}

impl Extend<NodeEntry> for MembershipSet {
    fn extend<I: IntoIterator<Item = NodeEntry>>(&mut self, iter: I) {
        for entry in iter {
            self.insert(entry);
        }
    }
}
