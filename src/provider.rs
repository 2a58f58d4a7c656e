//! DNS provider seam.
//!
//! The synchronizer only needs four calls: find by name/type, create, update
//! by id, delete by id. Authentication, pagination and rate limits belong to
//! the implementation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;

/// The only record type this crate manages.
pub const RECORD_TYPE_A: &str = "A";

/// A record as stored by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsRecord {
    /// Provider-assigned record identity.
    pub id: String,
    /// Fully qualified record name.
    pub name: String,
    /// Record type, e.g. "A".
    #[serde(rename = "type")]
    pub record_type: String,
    /// Record content (the address for A records).
    pub content: String,
    /// TTL in seconds (1 = provider automatic).
    pub ttl: u32,
    /// Whether traffic is proxied by the provider.
    #[serde(default)]
    pub proxied: bool,
}

/// Desired record payload for create/update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordPayload {
    /// Record type, always "A" here.
    #[serde(rename = "type")]
    pub record_type: String,
    /// Fully qualified record name.
    pub name: String,
    /// Address.
    pub content: String,
    /// TTL in seconds.
    pub ttl: u32,
    /// Proxied flag.
    pub proxied: bool,
}

impl RecordPayload {
    /// Build an A record payload.
    pub fn a(name: impl Into<String>, content: impl Into<String>, ttl: u32, proxied: bool) -> Self {
        Self {
            record_type: RECORD_TYPE_A.to_string(),
            name: name.into(),
            content: content.into(),
            ttl,
            proxied,
        }
    }

    /// Whether an existing record already matches this payload.
    pub fn matches(&self, record: &DnsRecord) -> bool {
        record.content == self.content && record.ttl == self.ttl && record.proxied == self.proxied
    }
}

/// Record store operations consumed by the synchronizer.
#[async_trait]
pub trait DnsProvider: Send + Sync {
    /// List records with exactly this name and type.
    async fn find_records(
        &self,
        name: &str,
        record_type: &str,
    ) -> Result<Vec<DnsRecord>, ProviderError>;

    /// Create a record.
    async fn create_record(&self, payload: &RecordPayload) -> Result<DnsRecord, ProviderError>;

    /// Replace the record with the given id.
    async fn update_record(
        &self,
        id: &str,
        payload: &RecordPayload,
    ) -> Result<DnsRecord, ProviderError>;

    /// Delete the record with the given id.
    async fn delete_record(&self, id: &str) -> Result<(), ProviderError>;
}
