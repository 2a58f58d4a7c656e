//! Metrics instrumentation for node-dns-sync.
//!
//! All metrics are prefixed with `node_dns_sync.`

use metrics::{counter, gauge, histogram};
use std::time::Instant;

/// Record a finished run.
pub fn record_run(outcome: RunOutcome, duration: std::time::Duration) {
    let outcome_str = match outcome {
        RunOutcome::Success => "success",
        RunOutcome::Partial => "partial",
        RunOutcome::Failed => "failed",
        RunOutcome::DryRun => "dry_run",
    };

    counter!("node_dns_sync.run.count", "outcome" => outcome_str).increment(1);
    histogram!("node_dns_sync.run.duration.seconds").record(duration.as_secs_f64());
}

/// How a run ended, for metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every operation succeeded and state was committed.
    Success,
    /// State committed, but some nodes failed and will be retried.
    Partial,
    /// Fatal error, nothing committed.
    Failed,
    /// Diff computed, nothing applied.
    DryRun,
}

/// Record a single record-level operation.
pub fn record_operation(op: RecordOp, success: bool) {
    let op_str = match op {
        RecordOp::Create => "create",
        RecordOp::Update => "update",
        RecordOp::Unchanged => "unchanged",
        RecordOp::Delete => "delete",
        RecordOp::AlreadyAbsent => "already_absent",
        RecordOp::Upsert => "upsert",
        RecordOp::Remove => "remove",
    };
    let result = if success { "success" } else { "error" };

    counter!("node_dns_sync.record.op.count", "op" => op_str, "result" => result).increment(1);
}

/// Record-level operation kinds.
#[derive(Debug, Clone, Copy)]
pub enum RecordOp {
    /// Record created.
    Create,
    /// Existing record rewritten in place.
    Update,
    /// Existing record already correct.
    Unchanged,
    /// Record(s) deleted.
    Delete,
    /// Nothing to delete.
    AlreadyAbsent,
    /// Upsert that failed before an outcome was known.
    Upsert,
    /// Remove that failed before an outcome was known.
    Remove,
}

/// Record membership sizes after a run.
pub fn record_membership(live: usize, committed: usize) {
    gauge!("node_dns_sync.membership.live").set(live as f64);
    gauge!("node_dns_sync.membership.committed").set(committed as f64);
}

/// Record nodes excluded from a snapshot for lack of a usable address.
pub fn record_nodes_skipped(count: usize) {
    gauge!("node_dns_sync.inventory.skipped").set(count as f64);
}

/// Record duplicate records found under one name (left for manual cleanup).
pub fn record_duplicates(count: usize) {
    counter!("node_dns_sync.record.duplicates.count").increment(count as u64);
}

/// Helper for timing operations.
pub struct Timer {
    start: Instant,
}

impl Timer {
    /// Start a new timer.
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Get elapsed duration since timer start.
    pub fn elapsed(&self) -> std::time::Duration {
        self.start.elapsed()
    }
}
