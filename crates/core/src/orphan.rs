#![forbid(unsafe_code)]

use crate::audit::Severity;
use crate::tree::TreeNode;
use serde::{Deserialize, Serialize};

/// Structural well-formedness violations. Detection runs each predicate independently.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrphanKind {
    MissingParent,
    InvalidDepth,
    InvalidSlot,
    DuplicateSlot,
}

impl OrphanKind {
    pub const ALL: [OrphanKind; 4] = [
        Self::MissingParent,
        Self::InvalidDepth,
        Self::InvalidSlot,
        Self::DuplicateSlot,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::MissingParent => "MISSING_PARENT",
            Self::InvalidDepth => "INVALID_DEPTH",
            Self::InvalidSlot => "INVALID_SLOT",
            Self::DuplicateSlot => "DUPLICATE_SLOT",
        }
    }

    pub fn severity(self) -> Severity {
        match self {
            Self::MissingParent => Severity::Critical,
            Self::InvalidDepth | Self::DuplicateSlot => Severity::Error,
            Self::InvalidSlot => Severity::Warning,
        }
    }

    pub fn actions(self) -> &'static [RepairAction] {
        match self {
            Self::MissingParent => &[RepairAction::DeleteOrphan, RepairAction::ConvertToRoot],
            Self::InvalidDepth => &[RepairAction::FixDepth],
            Self::InvalidSlot => &[RepairAction::FixSlot],
            Self::DuplicateSlot => &[RepairAction::FixSlot, RepairAction::MergeWithSibling],
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepairAction {
    DeleteOrphan,
    ReassignParent,
    FixDepth,
    FixSlot,
    ConvertToRoot,
    MergeWithSibling,
}

impl RepairAction {
    pub const ALL: [RepairAction; 6] = [
        Self::DeleteOrphan,
        Self::ReassignParent,
        Self::FixDepth,
        Self::FixSlot,
        Self::ConvertToRoot,
        Self::MergeWithSibling,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::DeleteOrphan => "delete_orphan",
            Self::ReassignParent => "reassign_parent",
            Self::FixDepth => "fix_depth",
            Self::FixSlot => "fix_slot",
            Self::ConvertToRoot => "convert_to_root",
            Self::MergeWithSibling => "merge_with_sibling",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|action| action.as_str() == value.trim())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepairParams {
    pub new_parent_id: Option<i64>,
    pub slot: Option<i64>,
    pub sibling_id: Option<i64>,
}

#[derive(Clone, Debug, Serialize)]
pub struct OrphanRecord {
    pub node: TreeNode,
    pub kind: OrphanKind,
    pub severity: Severity,
    pub actions: Vec<RepairAction>,
}

impl OrphanRecord {
    pub fn new(node: TreeNode, kind: OrphanKind) -> Self {
        Self {
            node,
            kind,
            severity: kind.severity(),
            actions: kind.actions().to_vec(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RepairRequest {
    pub node_id: i64,
    pub action: RepairAction,
    pub params: RepairParams,
    pub actor: String,
}

impl RepairRequest {
    pub fn new(node_id: i64, action: RepairAction, actor: impl Into<String>) -> Self {
        Self {
            node_id,
            action,
            params: RepairParams::default(),
            actor: actor.into(),
        }
    }

    pub fn params(mut self, params: RepairParams) -> Self {
        self.params = params;
        self
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct RepairOutcome {
    pub node_id: i64,
    pub action: RepairAction,
    pub success: bool,
    pub message: String,
    pub warnings: Vec<String>,
    pub before: TreeNode,
    /// `None` when the action removed the node.
    pub after: Option<TreeNode>,
    pub audit_id: i64,
}

#[derive(Clone, Debug, Serialize)]
pub struct BulkRepairFailure {
    pub node_id: i64,
    pub error_kind: String,
    pub code: String,
    pub message: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct BulkRepairReport {
    pub group_id: String,
    pub action: RepairAction,
    pub succeeded: Vec<RepairOutcome>,
    pub failed: Vec<BulkRepairFailure>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policy_is_fixed_per_kind() {
        assert_eq!(
            OrphanKind::MissingParent.actions(),
            &[RepairAction::DeleteOrphan, RepairAction::ConvertToRoot]
        );
        assert_eq!(OrphanKind::InvalidDepth.actions(), &[RepairAction::FixDepth]);
        assert_eq!(OrphanKind::InvalidSlot.actions(), &[RepairAction::FixSlot]);
        assert_eq!(
            OrphanKind::DuplicateSlot.actions(),
            &[RepairAction::FixSlot, RepairAction::MergeWithSibling]
        );
        assert_eq!(OrphanKind::MissingParent.severity(), Severity::Critical);
        assert_eq!(OrphanKind::InvalidSlot.severity(), Severity::Warning);
    }

    #[test]
    fn kind_serializes_in_screaming_case() {
        assert_eq!(
            serde_json::to_value(OrphanKind::DuplicateSlot).unwrap(),
            serde_json::json!("DUPLICATE_SLOT")
        );
        for action in RepairAction::ALL {
            assert_eq!(RepairAction::parse(action.as_str()), Some(action));
        }
    }
}
