//! Reconciliation run: load → fetch → diff → synchronize → commit.
//!
//! ```text
//! Idle → LoadingState → FetchingInventory → Diffing → Synchronizing → CommittingState → Idle
//!            │                 │                                           │
//!            └─────────────────┴──────────────────▶ Failed ◀──────────────┘
//! ```
//!
//! Record operations are grouped by derived name. Groups run concurrently up to
//! `max_concurrency`; operations inside a group run in order, so two nodes that
//! share a name never race. Per-node failures do not fail the run: the node is
//! left out of (or kept in) the committed state so the next run retries it.

use futures::stream::{self, StreamExt};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::cloudflare::CloudflareClient;
use crate::config::{Config, SyncConfig};
use crate::diff::ReconciliationDiff;
use crate::error::{DnsOperationCause, SyncError};
use crate::inventory::{self, InventoryProvider, KubeInventory};
use crate::membership::{MembershipSet, NodeEntry};
use crate::metrics::{self, RunOutcome, Timer};
use crate::naming::RecordNamer;
use crate::state::{FileStateStore, StateStore};
use crate::sync::{DnsSynchronizer, RemoveOutcome, UpsertOutcome};

/// Where a run currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    /// Not running.
    Idle,
    /// Reading persisted state.
    LoadingState,
    /// Listing cluster nodes.
    FetchingInventory,
    /// Computing the diff.
    Diffing,
    /// Applying record operations.
    Synchronizing,
    /// Writing the new state.
    CommittingState,
    /// Last run hit a fatal error.
    Failed,
}

/// Which operation a node needed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeAction {
    /// Publish or update the node's record.
    Upsert,
    /// Withdraw the node's records.
    Remove,
}

/// A node whose operation failed during a run.
#[derive(Debug)]
pub struct NodeFailure {
    /// The entry the operation was for.
    pub entry: NodeEntry,
    /// Operation attempted.
    pub action: NodeAction,
    /// Cause.
    pub error: SyncError,
}

/// Summary of a completed run.
#[derive(Debug, Default)]
pub struct RunReport {
    /// Nodes observed in the cluster.
    pub observed: usize,
    /// Nodes to publish (new or changed address).
    pub added: usize,
    /// Nodes to withdraw.
    pub removed: usize,
    /// Records created.
    pub created: usize,
    /// Records rewritten in place.
    pub updated: usize,
    /// Records already correct.
    pub unchanged: usize,
    /// Records deleted.
    pub deleted: usize,
    /// Removals with nothing left to delete.
    pub already_absent: usize,
    /// Removals whose name is now published for another live node.
    pub superseded: usize,
    /// Nodes in the committed state.
    pub committed: usize,
    /// Per-node failures, retried next run.
    pub failures: Vec<NodeFailure>,
    /// Nothing was applied or committed.
    pub dry_run: bool,
}

impl RunReport {
    /// Metrics outcome for this report.
    pub fn outcome(&self) -> RunOutcome {
        if self.dry_run {
            RunOutcome::DryRun
        } else if self.failures.is_empty() {
            RunOutcome::Success
        } else {
            RunOutcome::Partial
        }
    }

    fn log_summary(&self) {
        info!(
            observed = self.observed,
            added = self.added,
            removed = self.removed,
            created = self.created,
            updated = self.updated,
            unchanged = self.unchanged,
            deleted = self.deleted,
            already_absent = self.already_absent,
            superseded = self.superseded,
            committed = self.committed,
            failed = self.failures.len(),
            dry_run = self.dry_run,
            "reconciliation run complete"
        );
        for failure in &self.failures {
            warn!(
                node_id = %failure.entry.node_id,
                action = ?failure.action,
                error = %failure.error,
                "node not reconciled, will retry next run"
            );
        }
    }
}

/// Knobs for a run.
#[derive(Debug, Clone)]
pub struct ReconcileOptions {
    /// Address kind to publish.
    pub address_type: String,
    /// Maximum record names in flight.
    pub max_concurrency: usize,
    /// Compute and log only.
    pub dry_run: bool,
}

impl ReconcileOptions {
    /// Options from configuration.
    pub fn from_config(config: &SyncConfig, dry_run: bool) -> Self {
        Self {
            address_type: config.address_type.clone(),
            max_concurrency: config.max_concurrency,
            dry_run,
        }
    }
}

/// All operations for one record name, applied in order.
#[derive(Debug)]
enum NameTask {
    /// Publish a live node. `superseded` are removed nodes that mapped to the same name.
    Upsert {
        entry: NodeEntry,
        superseded: Vec<NodeEntry>,
    },
    /// Withdraw removed nodes with no live owner for the name.
    Remove { entries: Vec<NodeEntry> },
}

impl NameTask {
    fn push_removed(&mut self, entry: NodeEntry) {
        match self {
            NameTask::Upsert { superseded, .. } => superseded.push(entry),
            NameTask::Remove { entries } => entries.push(entry),
        }
    }
}

#[derive(Debug, Default)]
struct Plan {
    tasks: BTreeMap<String, NameTask>,
    failures: Vec<NodeFailure>,
}

impl Plan {
    /// Group the diff by record name.
    ///
    /// Each name has at most one live owner: the lowest `node_id` that derives it.
    /// Other live nodes deriving the same name are reported as collisions.
    fn build(
        namer: &RecordNamer,
        live: &MembershipSet,
        diff: &ReconciliationDiff,
    ) -> Self {
        let mut plan = Plan::default();
        let mut owners: BTreeMap<String, NodeEntry> = BTreeMap::new();

        for entry in live.iter() {
            let name = match namer.derive(&entry.node_id) {
                Ok(name) => name,
                Err(e) => {
                    let error = SyncError::dns(&entry.node_id, e);
                    plan.fail(entry, NodeAction::Upsert, error);
                    continue;
                }
            };
            match owners.get(&name) {
                Some(owner) => {
                    let error = SyncError::dns(
                        &entry.node_id,
                        DnsOperationCause::NameCollision {
                            name,
                            owner: owner.node_id.clone(),
                        },
                    );
                    plan.fail(entry, NodeAction::Upsert, error);
                }
                None => {
                    owners.insert(name, entry);
                }
            }
        }

        for entry in &diff.added {
            let Ok(name) = namer.derive(&entry.node_id) else {
                continue;
            };
            if owners.get(&name).is_some_and(|o| o.node_id == entry.node_id) {
                plan.tasks.insert(
                    name,
                    NameTask::Upsert {
                        entry: entry.clone(),
                        superseded: Vec::new(),
                    },
                );
            }
        }

        for entry in &diff.removed {
            let name = match namer.derive(&entry.node_id) {
                Ok(name) => name,
                Err(e) => {
                    let error = SyncError::dns(&entry.node_id, e);
                    plan.fail(entry.clone(), NodeAction::Remove, error);
                    continue;
                }
            };
            let owner = owners.get(&name).cloned();
            plan.tasks
                .entry(name)
                .or_insert_with(|| match owner {
                    Some(owner) => NameTask::Upsert {
                        entry: owner,
                        superseded: Vec::new(),
                    },
                    None => NameTask::Remove {
                        entries: Vec::new(),
                    },
                })
                .push_removed(entry.clone());
        }

        plan
    }

    fn fail(&mut self, entry: NodeEntry, action: NodeAction, error: SyncError) {
        self.failures.push(NodeFailure {
            entry,
            action,
            error,
        });
    }
}

/// Outcome for one node within a task.
#[derive(Debug)]
enum NodeResult {
    Upserted(UpsertOutcome),
    Removed(RemoveOutcome),
    /// Removed node whose name was re-published for its live owner.
    Superseded,
    /// Removed node kept because its name's live owner failed.
    Deferred(NodeEntry),
    Failed(NodeFailure),
}

async fn run_task(sync: &DnsSynchronizer, name: String, task: NameTask) -> Vec<NodeResult> {
    debug!(%name, task = ?task, "synchronizing name");

    match task {
        NameTask::Upsert { entry, superseded } => match sync.upsert(&entry).await {
            Ok(outcome) => std::iter::once(NodeResult::Upserted(outcome))
                .chain(superseded.into_iter().map(|_| NodeResult::Superseded))
                .collect(),
            Err(error) => std::iter::once(NodeResult::Failed(NodeFailure {
                entry,
                action: NodeAction::Upsert,
                error,
            }))
            .chain(superseded.into_iter().map(NodeResult::Deferred))
            .collect(),
        },
        NameTask::Remove { entries } => {
            let mut results = Vec::with_capacity(entries.len());
            for entry in entries {
                match sync.remove(&entry).await {
                    Ok(outcome) => results.push(NodeResult::Removed(outcome)),
                    Err(error) => results.push(NodeResult::Failed(NodeFailure {
                        entry,
                        action: NodeAction::Remove,
                        error,
                    })),
                }
            }
            results
        }
    }
}

/// State to commit: live membership, minus failed upserts (falling back to
/// their previous entry), plus removals that did not complete.
fn committed_state(
    previous: &MembershipSet,
    live: &MembershipSet,
    failures: &[NodeFailure],
    deferred: &[NodeEntry],
) -> MembershipSet {
    let mut committed = live.clone();

    for failure in failures {
        let node_id = failure.entry.node_id.as_str();
        match failure.action {
            NodeAction::Upsert => {
                committed.remove(node_id);
                if let Some(prev) = previous.get(node_id) {
                    committed.insert(prev);
                }
            }
            NodeAction::Remove => {
                committed.insert(failure.entry.clone());
            }
        }
    }

    committed.extend(deferred.iter().cloned());
    committed
}

/// Drives reconciliation runs. Collaborators are injected; nothing is global.
///
/// At most one reconciler may own a state store at a time. Running several
/// replicas needs external mutual exclusion (leader election), which is not
/// provided here.
pub struct Reconciler {
    store: Arc<dyn StateStore>,
    inventory: Arc<dyn InventoryProvider>,
    synchronizer: DnsSynchronizer,
    options: ReconcileOptions,
    phase: RunPhase,
}

impl Reconciler {
    /// Create a reconciler from its collaborators.
    pub fn new(
        store: Arc<dyn StateStore>,
        inventory: Arc<dyn InventoryProvider>,
        synchronizer: DnsSynchronizer,
        options: ReconcileOptions,
    ) -> Self {
        Self {
            store,
            inventory,
            synchronizer,
            options,
            phase: RunPhase::Idle,
        }
    }

    /// Wire up the production collaborators: file state, Kubernetes, Cloudflare.
    pub async fn from_config(config: &Config, dry_run: bool) -> Result<Self, SyncError> {
        let store = FileStateStore::new(&config.sync.state_file)
            .with_corrupt_policy(config.sync.on_corrupt_state)
            .require_existing(config.sync.require_state_file);

        let provider = CloudflareClient::new(&config.cloudflare)
            .map_err(|e| SyncError::Config(format!("failed to build Cloudflare client: {e}")))?;

        let inventory = KubeInventory::try_default().await?;

        let synchronizer = DnsSynchronizer::new(
            Arc::new(provider),
            RecordNamer::new(&config.sync.domain_suffix),
            config.sync.ttl,
            config.sync.proxied,
        );

        Ok(Self::new(
            Arc::new(store),
            Arc::new(inventory),
            synchronizer,
            ReconcileOptions::from_config(&config.sync, dry_run),
        ))
    }

    /// Current phase.
    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    /// Startup precondition: the state store must be readable and writable.
    pub fn check_preconditions(&self) -> Result<(), SyncError> {
        self.store.check_access()
    }

    fn enter(&mut self, phase: RunPhase) {
        debug!(from = ?self.phase, to = ?phase, "run phase");
        self.phase = phase;
    }

    /// Execute one reconciliation run.
    ///
    /// Fatal errors (state, inventory) are returned before any DNS mutation, or,
    /// for a failed commit, after mutation but without touching persisted state.
    pub async fn run_once(&mut self) -> Result<RunReport, SyncError> {
        let timer = Timer::start();

        match self.run_phases().await {
            Ok(report) => {
                self.enter(RunPhase::Idle);
                report.log_summary();
                metrics::record_run(report.outcome(), timer.elapsed());
                Ok(report)
            }
            Err(e) => {
                error!(phase = ?self.phase, error = %e, "reconciliation run failed");
                self.enter(RunPhase::Failed);
                metrics::record_run(RunOutcome::Failed, timer.elapsed());
                Err(e)
            }
        }
    }

    async fn run_phases(&mut self) -> Result<RunReport, SyncError> {
        self.enter(RunPhase::LoadingState);
        let previous = self.store.load()?;

        self.enter(RunPhase::FetchingInventory);
        let live = inventory::snapshot(self.inventory.as_ref(), &self.options.address_type).await?;

        self.enter(RunPhase::Diffing);
        let diff = ReconciliationDiff::compute(&previous, &live);
        info!(
            previous = previous.len(),
            observed = live.len(),
            added = diff.added.len(),
            removed = diff.removed.len(),
            "computed membership diff"
        );

        let mut report = RunReport {
            observed: live.len(),
            added: diff.added.len(),
            removed: diff.removed.len(),
            dry_run: self.options.dry_run,
            ..Default::default()
        };

        let plan = Plan::build(self.synchronizer.namer(), &live, &diff);

        if self.options.dry_run {
            for (name, task) in &plan.tasks {
                info!(%name, task = ?task, "dry run: would synchronize");
            }
            report.failures = plan.failures;
            report.committed = previous.len();
            return Ok(report);
        }

        self.enter(RunPhase::Synchronizing);
        let results = self.execute(plan.tasks).await;

        let mut failures = plan.failures;
        let mut deferred = Vec::new();
        for result in results {
            match result {
                NodeResult::Upserted(UpsertOutcome::Created { .. }) => report.created += 1,
                NodeResult::Upserted(UpsertOutcome::Updated { .. }) => report.updated += 1,
                NodeResult::Upserted(UpsertOutcome::Unchanged { .. }) => report.unchanged += 1,
                NodeResult::Removed(RemoveOutcome::Deleted(n)) => report.deleted += n,
                NodeResult::Removed(RemoveOutcome::AlreadyAbsent) => report.already_absent += 1,
                NodeResult::Superseded => report.superseded += 1,
                NodeResult::Deferred(entry) => deferred.push(entry),
                NodeResult::Failed(failure) => failures.push(failure),
            }
        }

        self.enter(RunPhase::CommittingState);
        let committed = committed_state(&previous, &live, &failures, &deferred);
        self.store.save(&committed)?;
        metrics::record_membership(live.len(), committed.len());

        report.committed = committed.len();
        report.failures = failures;
        Ok(report)
    }

    async fn execute(&self, tasks: BTreeMap<String, NameTask>) -> Vec<NodeResult> {
        let sync = &self.synchronizer;
        let results: Vec<Vec<NodeResult>> = stream::iter(tasks)
            .map(move |(name, task)| run_task(sync, name, task))
            .buffer_unordered(self.options.max_concurrency.max(1))
            .collect()
            .await;

        results.into_iter().flatten().collect()
    }
}
