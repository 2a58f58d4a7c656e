//! Shared test infrastructure for reconciliation integration tests.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tempfile::TempDir;

use node_dns_sync::inventory::{ClusterNode, InventoryProvider, NodeAddress};
use node_dns_sync::provider::{DnsProvider, DnsRecord, RecordPayload, RECORD_TYPE_A};
use node_dns_sync::{
    DnsSynchronizer, FileStateStore, InventoryError, MembershipSet, NodeEntry, ProviderError,
    ReconcileOptions, Reconciler, RecordNamer, StateStore,
};

// --- Constants ---

pub const SUFFIX: &str = "nodes.example.com";
pub const TTL: u32 = 120;

/// Derived record name for a node under [`SUFFIX`].
pub fn name_of(node_id: &str) -> String {
    RecordNamer::new(SUFFIX).derive(node_id).unwrap()
}

pub fn set(entries: &[(&str, &str)]) -> MembershipSet {
    entries
        .iter()
        .map(|(id, addr)| NodeEntry::new(*id, *addr))
        .collect()
}

// --- MemoryDnsProvider ---

/// Provider call kinds, for failure injection and call assertions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Find,
    Create,
    Update,
    Delete,
}

/// A recorded provider call, keyed by record name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub op: Op,
    pub name: String,
}

#[derive(Default)]
struct ProviderInner {
    records: Vec<DnsRecord>,
    next_id: u64,
    failures: Vec<(Op, String)>,
    calls: Vec<Call>,
}

impl ProviderInner {
    fn check(&mut self, op: Op, name: &str) -> Result<(), ProviderError> {
        self.calls.push(Call {
            op,
            name: name.to_string(),
        });
        if self.failures.iter().any(|(o, n)| *o == op && n == name) {
            return Err(ProviderError::RateLimited { status: 429 });
        }
        Ok(())
    }

    fn name_of_id(&self, id: &str) -> Option<String> {
        self.records
            .iter()
            .find(|r| r.id == id)
            .map(|r| r.name.clone())
    }
}

/// In-memory record store with per-name failure injection.
#[derive(Default)]
pub struct MemoryDnsProvider {
    inner: Mutex<ProviderInner>,
}

impl MemoryDnsProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Insert a record directly, bypassing call recording. Returns its id.
    pub fn seed(&self, name: &str, record_type: &str, content: &str) -> String {
        let mut inner = self.inner.lock();
        inner.next_id += 1;
        let id = format!("seed{}", inner.next_id);
        inner.records.push(DnsRecord {
            id: id.clone(),
            name: name.to_string(),
            record_type: record_type.to_string(),
            content: content.to_string(),
            ttl: TTL,
            proxied: false,
        });
        id
    }

    /// Make every `op` on `name` fail with a rate-limit error.
    pub fn fail_on(&self, op: Op, name: &str) {
        self.inner.lock().failures.push((op, name.to_string()));
    }

    pub fn clear_failures(&self) {
        self.inner.lock().failures.clear();
    }

    /// All records with the given name, any type.
    pub fn records_named(&self, name: &str) -> Vec<DnsRecord> {
        self.inner
            .lock()
            .records
            .iter()
            .filter(|r| r.name == name)
            .cloned()
            .collect()
    }

    /// A records with the given name.
    pub fn a_records(&self, name: &str) -> Vec<DnsRecord> {
        self.records_named(name)
            .into_iter()
            .filter(|r| r.record_type == RECORD_TYPE_A)
            .collect()
    }

    pub fn record_count(&self) -> usize {
        self.inner.lock().records.len()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.inner.lock().calls.clone()
    }

    /// Calls that would change the zone.
    pub fn mutations(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| c.op != Op::Find)
            .collect()
    }

    pub fn reset_calls(&self) {
        self.inner.lock().calls.clear();
    }
}

#[async_trait]
impl DnsProvider for MemoryDnsProvider {
    async fn find_records(
        &self,
        name: &str,
        record_type: &str,
    ) -> Result<Vec<DnsRecord>, ProviderError> {
        let mut inner = self.inner.lock();
        inner.check(Op::Find, name)?;
        Ok(inner
            .records
            .iter()
            .filter(|r| r.name == name && r.record_type == record_type)
            .cloned()
            .collect())
    }

    async fn create_record(&self, payload: &RecordPayload) -> Result<DnsRecord, ProviderError> {
        let mut inner = self.inner.lock();
        inner.check(Op::Create, &payload.name)?;
        inner.next_id += 1;
        let record = DnsRecord {
            id: format!("rec{}", inner.next_id),
            name: payload.name.clone(),
            record_type: payload.record_type.clone(),
            content: payload.content.clone(),
            ttl: payload.ttl,
            proxied: payload.proxied,
        };
        inner.records.push(record.clone());
        Ok(record)
    }

    async fn update_record(
        &self,
        id: &str,
        payload: &RecordPayload,
    ) -> Result<DnsRecord, ProviderError> {
        let mut inner = self.inner.lock();
        let name = inner.name_of_id(id).unwrap_or_default();
        inner.check(Op::Update, &name)?;
        let record = inner
            .records
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| ProviderError::Api {
                status: 404,
                message: format!("record {id} not found"),
            })?;
        record.name = payload.name.clone();
        record.record_type = payload.record_type.clone();
        record.content = payload.content.clone();
        record.ttl = payload.ttl;
        record.proxied = payload.proxied;
        Ok(record.clone())
    }

    async fn delete_record(&self, id: &str) -> Result<(), ProviderError> {
        let mut inner = self.inner.lock();
        let name = inner.name_of_id(id).unwrap_or_default();
        inner.check(Op::Delete, &name)?;
        let before = inner.records.len();
        inner.records.retain(|r| r.id != id);
        if inner.records.len() == before {
            return Err(ProviderError::Api {
                status: 404,
                message: format!("record {id} not found"),
            });
        }
        Ok(())
    }
}

// --- StaticInventory ---

/// Inventory returning a fixed node list, switchable to failing.
#[derive(Default)]
pub struct StaticInventory {
    nodes: Mutex<Vec<ClusterNode>>,
    failing: AtomicBool,
}

impl StaticInventory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Replace the node list; each node gets one ExternalIP and one InternalIP.
    pub fn set_nodes(&self, entries: &[(&str, &str)]) {
        *self.nodes.lock() = entries
            .iter()
            .enumerate()
            .map(|(i, (name, address))| ClusterNode {
                name: name.to_string(),
                addresses: vec![
                    NodeAddress {
                        kind: "InternalIP".to_string(),
                        address: format!("10.0.0.{}", i + 1),
                    },
                    NodeAddress {
                        kind: "ExternalIP".to_string(),
                        address: address.to_string(),
                    },
                ],
            })
            .collect();
    }

    /// Replace the node list verbatim.
    pub fn set_cluster_nodes(&self, nodes: Vec<ClusterNode>) {
        *self.nodes.lock() = nodes;
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl InventoryProvider for StaticInventory {
    async fn list_nodes(&self) -> Result<Vec<ClusterNode>, InventoryError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(InventoryError::Other("connection refused".into()));
        }
        Ok(self.nodes.lock().clone())
    }
}

// --- Harness ---

/// A provider, inventory and file state store wired into reconcilers.
pub struct Harness {
    pub dir: TempDir,
    pub provider: Arc<MemoryDnsProvider>,
    pub inventory: Arc<StaticInventory>,
    pub store: Arc<FileStateStore>,
}

impl Harness {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(FileStateStore::new(dir.path().join("state.json")));
        Self::with_store(dir, store)
    }

    pub fn with_store(dir: TempDir, store: Arc<FileStateStore>) -> Self {
        Self {
            dir,
            provider: MemoryDnsProvider::new(),
            inventory: StaticInventory::new(),
            store,
        }
    }

    pub fn state_path(&self) -> PathBuf {
        self.store.path().to_path_buf()
    }

    pub fn synchronizer(&self) -> DnsSynchronizer {
        DnsSynchronizer::new(
            self.provider.clone(),
            RecordNamer::new(SUFFIX),
            TTL,
            false,
        )
    }

    pub fn options(&self) -> ReconcileOptions {
        ReconcileOptions {
            address_type: "ExternalIP".to_string(),
            max_concurrency: 4,
            dry_run: false,
        }
    }

    pub fn reconciler(&self) -> Reconciler {
        self.reconciler_with(self.options())
    }

    pub fn reconciler_with(&self, options: ReconcileOptions) -> Reconciler {
        Reconciler::new(
            self.store.clone(),
            self.inventory.clone(),
            self.synchronizer(),
            options,
        )
    }

    /// Persist `entries` as previously synchronized and publish matching records.
    pub fn seed_synced(&self, entries: &[(&str, &str)]) {
        for (node_id, address) in entries {
            self.provider
                .seed(&name_of(node_id), RECORD_TYPE_A, address);
        }
        self.store.save(&set(entries)).unwrap();
    }

    pub fn persisted(&self) -> MembershipSet {
        self.store.load().unwrap()
    }
}
