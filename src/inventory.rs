//! One-shot snapshot of cluster membership.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Node;
use kube::api::{Api, ListParams};
use std::net::Ipv4Addr;
use tracing::{debug, info, warn};

use crate::error::{InventoryError, SyncError};
use crate::membership::{MembershipSet, NodeEntry};
use crate::metrics;

/// An address reported for a node, tagged with its kind (e.g. "ExternalIP").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeAddress {
    /// Address kind as reported by the cluster.
    pub kind: String,
    /// Address literal.
    pub address: String,
}

/// A node with all of its reported addresses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterNode {
    /// Node name.
    pub name: String,
    /// Every address the cluster reports for the node.
    pub addresses: Vec<NodeAddress>,
}

/// Source of the current node list.
#[async_trait]
pub trait InventoryProvider: Send + Sync {
    /// List all nodes with their addresses.
    async fn list_nodes(&self) -> Result<Vec<ClusterNode>, InventoryError>;
}

/// Kubernetes node inventory.
#[derive(Clone)]
pub struct KubeInventory {
    client: kube::Client,
}

impl KubeInventory {
    /// Wrap an existing client.
    pub fn new(client: kube::Client) -> Self {
        Self { client }
    }

    /// Build a client from in-cluster or kubeconfig credentials.
    pub async fn try_default() -> Result<Self, InventoryError> {
        Ok(Self::new(kube::Client::try_default().await?))
    }
}

fn node_from_k8s(node: Node) -> Option<ClusterNode> {
    let name = node.metadata.name?;
    let addresses = node
        .status
        .and_then(|s| s.addresses)
        .unwrap_or_default()
        .into_iter()
        .map(|a| NodeAddress {
            kind: a.type_,
            address: a.address,
        })
        .collect();

    Some(ClusterNode { name, addresses })
}

#[async_trait]
impl InventoryProvider for KubeInventory {
    async fn list_nodes(&self) -> Result<Vec<ClusterNode>, InventoryError> {
        let api: Api<Node> = Api::all(self.client.clone());
        let list = api.list(&ListParams::default()).await?;
        Ok(list.items.into_iter().filter_map(node_from_k8s).collect())
    }
}

/// Pick the address to publish: the first IPv4 literal of the wanted kind.
fn select_address(node: &ClusterNode, address_type: &str) -> Option<String> {
    let mut candidates = node.addresses.iter().filter(|a| a.kind == address_type);

    let selected = candidates.find_map(|a| match a.address.parse::<Ipv4Addr>() {
        Ok(ip) => Some(ip.to_string()),
        Err(_) => {
            warn!(
                node_id = %node.name,
                address = %a.address,
                "skipping address that cannot be published as an A record"
            );
            None
        }
    });

    for extra in candidates {
        debug!(node_id = %node.name, address = %extra.address, "ignoring additional address");
    }

    selected
}

/// Take a membership snapshot: one entry per node that has a publishable address.
///
/// Fails closed: any provider error is returned as-is so the run aborts before
/// touching DNS.
pub async fn snapshot(
    provider: &dyn InventoryProvider,
    address_type: &str,
) -> Result<MembershipSet, SyncError> {
    let nodes = provider.list_nodes().await?;
    let total = nodes.len();

    let mut set = MembershipSet::new();
    let mut skipped = 0usize;
    for node in &nodes {
        match select_address(node, address_type) {
            Some(address) => {
                info!(node_id = %node.name, %address, "observed node");
                set.insert(NodeEntry::new(node.name.as_str(), address));
            }
            None => {
                skipped += 1;
                info!(node_id = %node.name, address_type, "node has no usable address, excluded");
            }
        }
    }

    metrics::record_nodes_skipped(skipped);

    if set.is_empty() {
        warn!(
            nodes = total,
            address_type, "no nodes with a usable address found, check the cluster setup"
        );
    }

    Ok(set)
}
