//! Idempotent record operations against the DNS provider.
//!
//! ```text
//! upsert(node)                        remove(node)
//!   name = derive(node_id)              name = derive(node_id)
//!   find(name, A)                       find(name, A)
//!   0 → create                          0 → no-op
//!   1 → update if drifted               n → delete all n
//!   n → update first, warn on rest
//! ```
//!
//! Every error is scoped to the node it was raised for.

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::SyncError;
use crate::membership::NodeEntry;
use crate::metrics::{self, RecordOp};
use crate::naming::RecordNamer;
use crate::provider::{DnsProvider, RecordPayload, RECORD_TYPE_A};

/// Result of a successful upsert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// No record existed; one was created.
    Created {
        /// New record id.
        record_id: String,
    },
    /// A record existed with different content/settings and was rewritten in place.
    Updated {
        /// Record id (unchanged).
        record_id: String,
        /// Content before the update.
        previous: String,
    },
    /// A record already matched; nothing was written.
    Unchanged {
        /// Record id.
        record_id: String,
    },
}

/// Result of a successful remove.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveOutcome {
    /// This many records were deleted.
    Deleted(usize),
    /// Nothing matched.
    AlreadyAbsent,
}

/// Applies node membership to DNS records.
#[derive(Clone)]
pub struct DnsSynchronizer {
    provider: Arc<dyn DnsProvider>,
    namer: RecordNamer,
    ttl: u32,
    proxied: bool,
}

impl DnsSynchronizer {
    /// Create a synchronizer writing records with the given TTL and proxy flag.
    pub fn new(provider: Arc<dyn DnsProvider>, namer: RecordNamer, ttl: u32, proxied: bool) -> Self {
        Self {
            provider,
            namer,
            ttl,
            proxied,
        }
    }

    /// Name derivation in use.
    pub fn namer(&self) -> &RecordNamer {
        &self.namer
    }

    /// Make sure exactly one A record for the node carries its address.
    pub async fn upsert(&self, entry: &NodeEntry) -> Result<UpsertOutcome, SyncError> {
        let result = self.try_upsert(entry).await;
        match &result {
            Ok(UpsertOutcome::Created { .. }) => metrics::record_operation(RecordOp::Create, true),
            Ok(UpsertOutcome::Updated { .. }) => metrics::record_operation(RecordOp::Update, true),
            Ok(UpsertOutcome::Unchanged { .. }) => {
                metrics::record_operation(RecordOp::Unchanged, true)
            }
            Err(_) => metrics::record_operation(RecordOp::Upsert, false),
        }
        result
    }

    async fn try_upsert(&self, entry: &NodeEntry) -> Result<UpsertOutcome, SyncError> {
        let node_id = entry.node_id.as_str();
        let name = self
            .namer
            .derive(node_id)
            .map_err(|e| SyncError::dns(node_id, e))?;
        let payload = RecordPayload::a(&name, &entry.address, self.ttl, self.proxied);

        let existing = self
            .provider
            .find_records(&name, RECORD_TYPE_A)
            .await
            .map_err(|e| SyncError::dns(node_id, e))?;

        let Some(first) = existing.first() else {
            let created = self
                .provider
                .create_record(&payload)
                .await
                .map_err(|e| SyncError::dns(node_id, e))?;
            info!(node_id, %name, address = %entry.address, record_id = %created.id, "DNS record added");
            return Ok(UpsertOutcome::Created {
                record_id: created.id,
            });
        };

        if existing.len() > 1 {
            let extra: Vec<&str> = existing[1..].iter().map(|r| r.id.as_str()).collect();
            warn!(
                node_id,
                %name,
                kept = %first.id,
                extra = ?extra,
                "multiple A records for one name, leaving extras for manual cleanup"
            );
            metrics::record_duplicates(extra.len());
        }

        if payload.matches(first) {
            debug!(node_id, %name, record_id = %first.id, "DNS record already up to date");
            return Ok(UpsertOutcome::Unchanged {
                record_id: first.id.clone(),
            });
        }

        let updated = self
            .provider
            .update_record(&first.id, &payload)
            .await
            .map_err(|e| SyncError::dns(node_id, e))?;
        info!(
            node_id,
            %name,
            previous = %first.content,
            address = %entry.address,
            record_id = %updated.id,
            "DNS record updated"
        );
        Ok(UpsertOutcome::Updated {
            record_id: updated.id,
            previous: first.content.clone(),
        })
    }

    /// Delete every A record under the node's name.
    pub async fn remove(&self, entry: &NodeEntry) -> Result<RemoveOutcome, SyncError> {
        let result = self.try_remove(entry).await;
        match &result {
            Ok(RemoveOutcome::Deleted(_)) => metrics::record_operation(RecordOp::Delete, true),
            Ok(RemoveOutcome::AlreadyAbsent) => {
                metrics::record_operation(RecordOp::AlreadyAbsent, true)
            }
            Err(_) => metrics::record_operation(RecordOp::Remove, false),
        }
        result
    }

    async fn try_remove(&self, entry: &NodeEntry) -> Result<RemoveOutcome, SyncError> {
        let node_id = entry.node_id.as_str();
        let name = self
            .namer
            .derive(node_id)
            .map_err(|e| SyncError::dns(node_id, e))?;

        let existing = self
            .provider
            .find_records(&name, RECORD_TYPE_A)
            .await
            .map_err(|e| SyncError::dns(node_id, e))?;

        if existing.is_empty() {
            warn!(node_id, %name, "no DNS records found to delete");
            return Ok(RemoveOutcome::AlreadyAbsent);
        }

        for record in &existing {
            self.provider
                .delete_record(&record.id)
                .await
                .map_err(|e| SyncError::dns(node_id, e))?;
            info!(node_id, %name, record_id = %record.id, content = %record.content, "DNS record deleted");
        }

        Ok(RemoveOutcome::Deleted(existing.len()))
    }
}
