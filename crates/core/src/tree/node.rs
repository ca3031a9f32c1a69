#![forbid(unsafe_code)]

use super::{MAX_DEPTH, ROOT_SLOT};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeNode {
    pub id: i64,
    pub parent_id: Option<i64>,
    pub depth: i64,
    pub slot: Option<i64>,
    pub label: String,
    pub is_leaf: bool,
    pub version: i64,
    pub created_at_ms: i64,
    pub updated_at_ms: i64,
}

impl TreeNode {
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none() && self.depth == 0 && self.slot == Some(ROOT_SLOT)
    }

    /// Whether this node may own children at `depth + 1`.
    pub fn can_have_children(&self) -> bool {
        !self.is_leaf && self.depth < MAX_DEPTH
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildInput {
    pub slot: i64,
    pub label: String,
}

impl ChildInput {
    pub fn new(slot: i64, label: impl Into<String>) -> Self {
        Self {
            slot,
            label: label.into(),
        }
    }
}

/// A parent's current children together with the parent's version token.
#[derive(Clone, Debug, Serialize)]
pub struct ChildrenSnapshot {
    pub parent_id: i64,
    pub version: i64,
    pub etag: String,
    pub children: Vec<TreeNode>,
    pub missing_slots: Vec<i64>,
}

#[derive(Clone, Debug, Serialize)]
pub struct UpsertChildrenResult {
    pub parent_id: i64,
    pub new_version: i64,
    pub missing_slots: Vec<i64>,
    pub updated_ids: Vec<i64>,
    pub audit_id: i64,
}
