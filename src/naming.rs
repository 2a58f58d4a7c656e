//! Record name derivation.
//!
//! ```text
//! ip-10-0-1-7.ec2.internal  →  ip-10-0-1-7-ec2-internal.<domain_suffix>
//! ```
//!
//! The node name becomes a single label: lowercased, `.` and any other
//! character outside `[a-z0-9-]` replaced by `-`, then suffixed.

use hickory_proto::rr::Name;

use crate::error::NamingError;

/// Maximum length of a single DNS label in octets.
const MAX_LABEL_LEN: usize = 63;

/// Derives record names under a fixed domain suffix.
#[derive(Debug, Clone)]
pub struct RecordNamer {
    suffix: String,
}

impl RecordNamer {
    /// Create a namer for the given suffix (e.g. "nodes.example.com").
    pub fn new(domain_suffix: &str) -> Self {
        Self {
            suffix: domain_suffix.trim_matches('.').to_ascii_lowercase(),
        }
    }

    /// Domain suffix every derived name ends with.
    pub fn suffix(&self) -> &str {
        &self.suffix
    }

    /// Derive the record name for a node.
    pub fn derive(&self, node_id: &str) -> Result<String, NamingError> {
        let label = normalize_label(node_id);
        if label.is_empty() {
            return Err(NamingError::EmptyLabel(node_id.to_string()));
        }
        if label.len() > MAX_LABEL_LEN {
            return Err(NamingError::LabelTooLong {
                len: label.len(),
                label,
            });
        }

        let name = format!("{}.{}", label, self.suffix);
        Name::from_ascii(&name).map_err(|source| NamingError::InvalidName {
            name: name.clone(),
            source,
        })?;

        Ok(name)
    }
}

fn normalize_label(node_id: &str) -> String {
    let replaced: String = node_id
        .chars()
        .map(|c| match c.to_ascii_lowercase() {
            c @ ('a'..='z' | '0'..='9' | '-') => c,
            _ => '-',
        })
        .collect();

    // Labels may not start or end with a hyphen.
    replaced.trim_matches('-').to_string()
}
