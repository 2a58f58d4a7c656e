//! Durable record of the last synchronized membership.
//!
//! The file store writes through a temp file in the same directory and renames
//! it into place, so a concurrent reader sees either the old or the new
//! document, never a partial one.

use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::error::SyncError;
use crate::membership::{MembershipSet, NodeEntry};

/// Current on-disk document version.
const STATE_VERSION: u32 = 1;

/// What to do when the persisted state cannot be decoded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorruptStatePolicy {
    /// Surface `StateCorrupt` and stop.
    #[default]
    Fail,
    /// Log and continue from an empty set. Every live node is re-upserted and
    /// nodes that left while the state was unreadable are orphaned.
    Reset,
}

/// Persistence for the last synchronized [`MembershipSet`].
pub trait StateStore: Send + Sync {
    /// Verify the store can be read and written. Failing this is fatal.
    fn check_access(&self) -> Result<(), SyncError>;

    /// Read the persisted set. A store that was never written yields an empty set.
    fn load(&self) -> Result<MembershipSet, SyncError>;

    /// Atomically replace the persisted set.
    fn save(&self, set: &MembershipSet) -> Result<(), SyncError>;
}

#[derive(Debug, Serialize, Deserialize)]
struct StateDocument {
    version: u32,
    nodes: Vec<NodeEntry>,
}

/// JSON file state store.
#[derive(Debug, Clone)]
pub struct FileStateStore {
    path: PathBuf,
    on_corrupt: CorruptStatePolicy,
    require_existing: bool,
}

impl FileStateStore {
    /// Create a store at `path` with default policies.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            on_corrupt: CorruptStatePolicy::default(),
            require_existing: false,
        }
    }

    /// Set the corrupt-state policy.
    pub fn with_corrupt_policy(mut self, policy: CorruptStatePolicy) -> Self {
        self.on_corrupt = policy;
        self
    }

    /// Treat a missing state file as an access error.
    pub fn require_existing(mut self, require: bool) -> Self {
        self.require_existing = require;
        self
    }

    /// Path of the state file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn dir(&self) -> &Path {
        match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        }
    }

    /// Make the rename itself durable.
    #[cfg(unix)]
    fn sync_dir(&self) -> io::Result<()> {
        fs::File::open(self.dir())?.sync_all()
    }

    #[cfg(not(unix))]
    fn sync_dir(&self) -> io::Result<()> {
        Ok(())
    }

    fn access_error(&self, reason: impl ToString) -> SyncError {
        SyncError::StateAccess {
            path: self.path.clone(),
            reason: reason.to_string(),
        }
    }

    fn corrupt(&self, reason: impl ToString) -> SyncError {
        SyncError::StateCorrupt {
            path: self.path.clone(),
            reason: reason.to_string(),
        }
    }

    fn decode(&self, contents: &str) -> Result<MembershipSet, SyncError> {
        if contents.trim().is_empty() {
            debug!(path = %self.path.display(), "state file is empty");
            return Ok(MembershipSet::new());
        }

        let doc: StateDocument = match serde_json::from_str(contents) {
            Ok(doc) => doc,
            Err(e) => return self.decode_legacy(contents).ok_or_else(|| self.corrupt(e)),
        };
        if doc.version != STATE_VERSION {
            return Err(self.corrupt(format!("unsupported state version {}", doc.version)));
        }

        let mut set = MembershipSet::new();
        for entry in doc.nodes {
            let node_id = entry.node_id.clone();
            if set.insert(entry).is_some() {
                return Err(self.corrupt(format!("duplicate node {node_id}")));
            }
        }
        Ok(set)
    }

    /// Bare JSON list of node ids, with no addresses. Nothing in it can be
    /// diffed against, so it reads as empty and the next run re-upserts.
    fn decode_legacy(&self, contents: &str) -> Option<MembershipSet> {
        let ids: Vec<String> = serde_json::from_str(contents).ok()?;
        if !ids.is_empty() {
            warn!(
                path = %self.path.display(),
                nodes = ids.len(),
                "state file holds a legacy node list without addresses, starting from empty set"
            );
        }
        Some(MembershipSet::new())
    }
}

impl StateStore for FileStateStore {
    fn check_access(&self) -> Result<(), SyncError> {
        match OpenOptions::new().read(true).write(true).open(&self.path) {
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                if self.require_existing {
                    return Err(self.access_error("file not found"));
                }
                debug!(path = %self.path.display(), "state file absent, first run");
            }
            Err(e) => return Err(self.access_error(e)),
        }

        // The rename in `save` needs a writable directory.
        NamedTempFile::new_in(self.dir())
            .map_err(|e| self.access_error(format!("directory not writable: {e}")))?;

        Ok(())
    }

    fn load(&self) -> Result<MembershipSet, SyncError> {
        let result = match fs::read_to_string(&self.path) {
            Ok(contents) => self.decode(&contents),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                info!(path = %self.path.display(), "no persisted state, starting empty");
                return Ok(MembershipSet::new());
            }
            Err(e) => Err(self.corrupt(e)),
        };

        match (result, self.on_corrupt) {
            (Ok(set), _) => {
                debug!(path = %self.path.display(), nodes = set.len(), "loaded state");
                Ok(set)
            }
            (Err(e), CorruptStatePolicy::Reset) => {
                warn!(error = %e, "discarding unreadable state, continuing from empty set");
                Ok(MembershipSet::new())
            }
            (Err(e), CorruptStatePolicy::Fail) => Err(e),
        }
    }

    fn save(&self, set: &MembershipSet) -> Result<(), SyncError> {
        let write_err = |source: io::Error| SyncError::StateWrite {
            path: self.path.clone(),
            source,
        };

        let doc = StateDocument {
            version: STATE_VERSION,
            nodes: set.to_entries(),
        };
        let json = serde_json::to_vec_pretty(&doc).map_err(|e| write_err(e.into()))?;

        let mut tmp = NamedTempFile::new_in(self.dir()).map_err(write_err)?;
        if let Ok(meta) = fs::metadata(&self.path) {
            tmp.as_file()
                .set_permissions(meta.permissions())
                .map_err(write_err)?;
        }
        tmp.write_all(&json).map_err(write_err)?;
        tmp.as_file().sync_all().map_err(write_err)?;
        tmp.persist(&self.path).map_err(|e| write_err(e.error))?;
        self.sync_dir().map_err(write_err)?;

        info!(path = %self.path.display(), nodes = set.len(), "state saved");
        Ok(())
    }
}
