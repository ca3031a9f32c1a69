#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};

/// Every mutation kind the ledger knows how to record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    NodeCreate,
    NodeUpdate,
    NodeDelete,
    ChildrenUpsert,
    Materialize,
    OrphanRepair,
    Undo,
    RetentionPrune,
}

impl OperationKind {
    pub const ALL: [OperationKind; 8] = [
        Self::NodeCreate,
        Self::NodeUpdate,
        Self::NodeDelete,
        Self::ChildrenUpsert,
        Self::Materialize,
        Self::OrphanRepair,
        Self::Undo,
        Self::RetentionPrune,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::NodeCreate => "node_create",
            Self::NodeUpdate => "node_update",
            Self::NodeDelete => "node_delete",
            Self::ChildrenUpsert => "children_upsert",
            Self::Materialize => "materialize",
            Self::OrphanRepair => "orphan_repair",
            Self::Undo => "undo",
            Self::RetentionPrune => "retention_prune",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == value.trim())
    }

    /// Static undo policy. `None` means the kind is absent from the table.
    pub fn policy_entry(self) -> Option<UndoCapability> {
        match self {
            Self::NodeCreate | Self::NodeUpdate | Self::ChildrenUpsert => Some(UndoCapability {
                is_undoable: true,
                undo_timeout_seconds: Some(3600),
                requires_confirmation: false,
            }),
            Self::Materialize => Some(UndoCapability {
                is_undoable: true,
                undo_timeout_seconds: Some(300),
                requires_confirmation: true,
            }),
            Self::OrphanRepair => Some(UndoCapability {
                is_undoable: true,
                undo_timeout_seconds: Some(1800),
                requires_confirmation: true,
            }),
            Self::NodeDelete | Self::Undo | Self::RetentionPrune => None,
        }
    }

    pub fn undo_capability(self) -> UndoCapability {
        self.policy_entry().unwrap_or(UndoCapability::NOT_UNDOABLE)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UndoCapability {
    pub is_undoable: bool,
    /// `None` means no deadline.
    pub undo_timeout_seconds: Option<i64>,
    pub requires_confirmation: bool,
}

impl UndoCapability {
    pub const NOT_UNDOABLE: UndoCapability = UndoCapability {
        is_undoable: false,
        undo_timeout_seconds: None,
        requires_confirmation: false,
    };
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    #[default]
    Info,
    Warning,
    Error,
    Critical,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Critical => "critical",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "info" => Some(Self::Info),
            "warning" => Some(Self::Warning),
            "error" => Some(Self::Error),
            "critical" => Some(Self::Critical),
            _ => None,
        }
    }
}
