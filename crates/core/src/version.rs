#![forbid(unsafe_code)]

use crate::tree::ChildInput;
use serde::{Deserialize, Serialize};
use sha2::Digest as _;
use std::collections::BTreeMap;
use std::fmt::Write as _;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionInfo {
    pub node_id: i64,
    pub version: i64,
    pub updated_at_ms: i64,
}

/// Opaque version token derived from `(node_id, version, updated_at_ms)`.
pub fn create_etag(info: &VersionInfo) -> String {
    let mut hasher = sha2::Sha256::new();
    hasher.update(
        format!("{}:{}:{}", info.node_id, info.version, info.updated_at_ms).as_bytes(),
    );
    let digest = hasher.finalize();
    let mut out = String::with_capacity(24);
    let _ = write!(&mut out, "v{}-", info.version);
    for b in digest.iter().take(8) {
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

/// A client precondition: either the raw version number or an issued ETag.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExpectedVersion {
    Version(i64),
    Etag(String),
}

impl ExpectedVersion {
    pub fn matches(&self, current: &VersionInfo) -> bool {
        match self {
            Self::Version(version) => *version == current.version,
            Self::Etag(etag) => etag.trim() == create_etag(current),
        }
    }

    /// Version number the client believes is current; ETags carry it as `v{n}-` prefix.
    pub fn claimed_version(&self) -> Option<i64> {
        match self {
            Self::Version(version) => Some(*version),
            Self::Etag(etag) => etag
                .trim()
                .strip_prefix('v')
                .and_then(|rest| rest.split_once('-'))
                .and_then(|(version, _)| version.parse().ok()),
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct VersionCheck {
    pub matches: bool,
    pub expected: ExpectedVersion,
    pub current: Option<VersionInfo>,
    pub current_etag: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotConflict {
    pub slot: i64,
    pub client_label: String,
    pub server_label: Option<String>,
}

/// Body of a 409 for a stale children upsert.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictDescriptor {
    pub parent_id: i64,
    pub slots: Vec<SlotConflict>,
    pub client_version: i64,
    pub server_version: i64,
}

/// Slots whose submitted label differs from what is stored, ascending by slot.
pub fn diff_slots(submitted: &[ChildInput], stored: &BTreeMap<i64, String>) -> Vec<SlotConflict> {
    let mut out = submitted
        .iter()
        .filter_map(|child| {
            let server_label = stored.get(&child.slot);
            if server_label.is_some_and(|label| label == &child.label) {
                return None;
            }
            Some(SlotConflict {
                slot: child.slot,
                client_label: child.label.clone(),
                server_label: server_label.cloned(),
            })
        })
        .collect::<Vec<_>>();
    out.sort_by_key(|conflict| conflict.slot);
    out
}
