#![forbid(unsafe_code)]

use super::{OperationKind, Severity};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

#[derive(Clone, Debug, Serialize)]
pub struct AuditEntry {
    pub id: i64,
    pub operation: String,
    pub target_id: String,
    pub target_type: String,
    pub actor: String,
    pub context: Option<JsonValue>,
    pub payload: JsonValue,
    pub undo_data: Option<JsonValue>,
    pub is_undoable: bool,
    pub undo_timeout_seconds: Option<i64>,
    pub requires_confirmation: bool,
    pub undone_by: Option<String>,
    pub undone_at_ms: Option<i64>,
    pub undo_reason: Option<String>,
    pub group_id: Option<String>,
    pub severity: Severity,
    pub tags: Vec<String>,
    pub created_at_ms: i64,
}

impl AuditEntry {
    pub fn operation_kind(&self) -> Option<OperationKind> {
        OperationKind::parse(&self.operation)
    }

    pub fn is_undone(&self) -> bool {
        self.undone_at_ms.is_some()
    }

    /// Latest instant (inclusive) at which an undo is still accepted.
    pub fn undo_deadline_ms(&self) -> Option<i64> {
        self.undo_timeout_seconds
            .map(|seconds| self.created_at_ms.saturating_add(seconds.saturating_mul(1000)))
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AuditQuery {
    pub target_id: Option<String>,
    pub operation: Option<OperationKind>,
    pub group_id: Option<String>,
    pub limit: usize,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UndoRequest {
    pub entry_id: i64,
    pub actor: String,
    pub reason: Option<String>,
    /// Required for operations whose policy demands confirmation.
    pub confirm: bool,
}

impl UndoRequest {
    pub fn new(entry_id: i64, actor: impl Into<String>) -> Self {
        Self {
            entry_id,
            actor: actor.into(),
            reason: None,
            confirm: false,
        }
    }

    pub fn reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn confirmed(mut self) -> Self {
        self.confirm = true;
        self
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct UndoResult {
    pub entry_id: i64,
    pub undo_entry_id: i64,
    pub operation: OperationKind,
    pub undone_at_ms: i64,
    pub effects: JsonValue,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupStatus {
    Open,
    Completed,
    Partial,
    Failed,
}

impl GroupStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Completed => "completed",
            Self::Partial => "partial",
            Self::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "open" => Some(Self::Open),
            "completed" => Some(Self::Completed),
            "partial" => Some(Self::Partial),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Terminal status from the item counters.
    pub fn settle(completed: i64, failed: i64) -> Self {
        match (completed, failed) {
            (_, 0) => Self::Completed,
            (0, _) => Self::Failed,
            _ => Self::Partial,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct OperationGroup {
    pub group_id: String,
    pub label: String,
    pub actor: String,
    pub total: i64,
    pub completed: i64,
    pub failed: i64,
    pub status: GroupStatus,
    pub created_at_ms: i64,
    pub finished_at_ms: Option<i64>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionPolicy {
    pub max_age_days: Option<u32>,
    pub max_rows: Option<u64>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RetentionReport {
    pub deleted_by_age: u64,
    pub deleted_by_count: u64,
}

impl RetentionReport {
    pub fn total(&self) -> u64 {
        self.deleted_by_age + self.deleted_by_count
    }
}
