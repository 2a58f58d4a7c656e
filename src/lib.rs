//! node-dns-sync - Keeps a DNS zone in sync with externally reachable cluster nodes.
//!
//! Each run lists the cluster's nodes, compares them with the membership that was
//! last synchronized, and applies the minimal set of record creates, updates and
//! deletes so that every node with an external address has exactly one A record.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                          node-dns-sync                           │
//! │                                                                  │
//! │  ┌──────────────┐   previous   ┌──────────┐                      │
//! │  │ State Store  │─────────────▶│          │   added/removed      │
//! │  │ (state.json) │              │   Diff   │──────────┐           │
//! │  └──────▲───────┘   current    │          │          ▼           │
//! │         │        ┌────────────▶└──────────┘  ┌──────────────┐    │
//! │         │        │                           │    DNS       │    │
//! │  ┌──────┴────────┴─┐                         │ Synchronizer │────┼──▶ Cloudflare
//! │  │   Reconciler    │◀────── failures ────────│ (per name)   │    │
//! │  └────────▲────────┘                         └──────────────┘    │
//! │           │                                                      │
//! │   ┌───────┴────────┐                                             │
//! │   │   Inventory    │◀──────────────────────────────────────────────── Kubernetes
//! │   └────────────────┘                                             │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Record Names
//!
//! ```text
//! node "ip-10-0-1-7.ec2.internal", suffix "nodes.example.com"
//!   → ip-10-0-1-7-ec2-internal.nodes.example.com  A  <ExternalIP>
//! ```
//!
//! ## Convergence
//!
//! A run commits the observed membership only after synchronizing it. Nodes whose
//! record operation failed are committed in their previous form (or not at all),
//! so the next run's diff picks them up again. An interrupted run leaves the old
//! state in place and the next run repeats its work; every record operation is
//! idempotent.
//!
//! ## Example Usage
//!
//! ```rust,ignore
//! use node_dns_sync::{Config, Reconciler};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load(None)?;
//!     let mut reconciler = Reconciler::from_config(&config, false).await?;
//!     reconciler.check_preconditions()?;
//!     let report = reconciler.run_once().await?;
//!     println!("{} nodes committed", report.committed);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]

pub mod cloudflare;
pub mod config;
pub mod diff;
pub mod error;
pub mod inventory;
pub mod membership;
pub mod metrics;
pub mod naming;
pub mod provider;
pub mod reconcile;
pub mod state;
pub mod sync;
pub mod telemetry;

// Re-export main types
pub use config::{CloudflareConfig, Config, SyncConfig, TelemetryConfig};
pub use diff::{diff, ReconciliationDiff};
pub use error::{DnsOperationCause, InventoryError, NamingError, ProviderError, SyncError};
pub use inventory::{ClusterNode, InventoryProvider, KubeInventory, NodeAddress};
pub use membership::{MembershipSet, NodeEntry};
pub use naming::RecordNamer;
pub use provider::{DnsProvider, DnsRecord, RecordPayload};
pub use reconcile::{ReconcileOptions, Reconciler, RunPhase, RunReport};
pub use state::{CorruptStatePolicy, FileStateStore, StateStore};
pub use sync::{DnsSynchronizer, RemoveOutcome, UpsertOutcome};
