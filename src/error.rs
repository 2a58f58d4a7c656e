//! Error types for node-dns-sync.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can end or degrade a reconciliation run.
#[derive(Debug, Error)]
pub enum SyncError {
    /// State location is not readable/writable. Fatal before any run starts.
    #[error("State file {path} is not accessible: {reason}")]
    StateAccess {
        /// Path of the state file.
        path: PathBuf,
        /// What the access check tripped over.
        reason: String,
    },

    /// Persisted state exists but cannot be read back.
    #[error("State file {path} is corrupt or unreadable: {reason}")]
    StateCorrupt {
        /// Path of the state file.
        path: PathBuf,
        /// Decoder or read error.
        reason: String,
    },

    /// Persisted state could not be written.
    #[error("Failed to write state file {path}: {source}")]
    StateWrite {
        /// Path of the state file.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Cluster inventory could not be listed.
    #[error("Inventory fetch failed: {0}")]
    InventoryFetch(#[from] InventoryError),

    /// A single record operation failed. Scoped to one node.
    #[error("DNS operation for node {node_id} failed: {source}")]
    DnsOperation {
        /// Node the operation was for.
        node_id: String,
        /// Cause.
        #[source]
        source: DnsOperationCause,
    },

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl SyncError {
    /// Whether this error aborts the run. Only per-node DNS failures are tolerated.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, SyncError::DnsOperation { .. })
    }

    pub(crate) fn dns(node_id: &str, source: impl Into<DnsOperationCause>) -> Self {
        SyncError::DnsOperation {
            node_id: node_id.to_string(),
            source: source.into(),
        }
    }
}

impl From<::config::ConfigError> for SyncError {
    fn from(e: ::config::ConfigError) -> Self {
        SyncError::Config(e.to_string())
    }
}

/// Why a per-node DNS operation failed.
#[derive(Debug, Error)]
pub enum DnsOperationCause {
    /// Provider rejected or failed the call.
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// No valid record name could be derived.
    #[error(transparent)]
    Naming(#[from] NamingError),

    /// Another node already owns the derived name in this run.
    #[error("record name {name} is already claimed by node {owner}")]
    NameCollision {
        /// Contested record name.
        name: String,
        /// Node that keeps the name.
        owner: String,
    },
}

/// Errors returned by a DNS provider backend.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Transport-level failure (connect, TLS, timeout, body decode).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Provider throttled the request.
    #[error("rate limited by provider (HTTP {status})")]
    RateLimited {
        /// HTTP status returned.
        status: u16,
    },

    /// Provider answered but refused the operation.
    #[error("provider API error (HTTP {status}): {message}")]
    Api {
        /// HTTP status returned.
        status: u16,
        /// Provider error messages, joined.
        message: String,
    },

    /// Response did not have the expected shape.
    #[error("malformed provider response: {0}")]
    MalformedResponse(String),
}

impl ProviderError {
    /// Whether retrying the same call later may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            ProviderError::Http(e) => e.is_timeout() || e.is_connect(),
            ProviderError::RateLimited { .. } => true,
            ProviderError::Api { status, .. } => *status >= 500,
            ProviderError::MalformedResponse(_) => false,
        }
    }
}

/// Errors from the cluster inventory backend.
#[derive(Debug, Error)]
pub enum InventoryError {
    /// Kubernetes API or client configuration failure.
    #[error("Kubernetes client error: {0}")]
    Kube(#[from] kube::Error),

    /// Any other backend failure.
    #[error("{0}")]
    Other(String),
}

/// A node identifier that cannot be expressed as a DNS name.
#[derive(Debug, Error)]
pub enum NamingError {
    /// Node identifier is empty after normalization.
    #[error("node id {0:?} normalizes to an empty label")]
    EmptyLabel(String),

    /// Normalized label exceeds 63 octets.
    #[error("label {label:?} is {len} octets, limit is 63")]
    LabelTooLong {
        /// Offending label.
        label: String,
        /// Its length.
        len: usize,
    },

    /// Full name rejected by the DNS name parser.
    #[error("invalid DNS name {name:?}: {source}")]
    InvalidName {
        /// Name that failed to parse.
        name: String,
        /// Parser error.
        #[source]
        source: hickory_proto::ProtoError,
    },
}
