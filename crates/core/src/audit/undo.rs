#![forbid(unsafe_code)]

use super::OperationKind;
use crate::orphan::RepairAction;
use crate::tree::TreeNode;
use serde::{Deserialize, Serialize};

/// State of one slot before a children upsert touched it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotSnapshot {
    pub slot: i64,
    /// `None` when the upsert created the child at this slot.
    pub node_id: Option<i64>,
    pub label: Option<String>,
}

/// Typed inverse data, one variant per undoable operation kind.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UndoPayload {
    NodeCreate {
        node_id: i64,
    },
    NodeUpdate {
        node_id: i64,
        previous_label: String,
    },
    ChildrenUpsert {
        parent_id: i64,
        previous_version: i64,
        previous: Vec<SlotSnapshot>,
    },
    Materialize {
        run_id: String,
        started_at_ms: i64,
        created_ids: Vec<i64>,
    },
    OrphanRepair {
        action: RepairAction,
        before: TreeNode,
        sibling_before: Option<TreeNode>,
    },
}

impl UndoPayload {
    pub fn operation(&self) -> OperationKind {
        match self {
            Self::NodeCreate { .. } => OperationKind::NodeCreate,
            Self::NodeUpdate { .. } => OperationKind::NodeUpdate,
            Self::ChildrenUpsert { .. } => OperationKind::ChildrenUpsert,
            Self::Materialize { .. } => OperationKind::Materialize,
            Self::OrphanRepair { .. } => OperationKind::OrphanRepair,
        }
    }
}
