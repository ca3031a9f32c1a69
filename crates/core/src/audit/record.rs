#![forbid(unsafe_code)]

use super::{OperationKind, Severity, UndoCapability, UndoPayload};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetType {
    Node,
    Tree,
    AuditEntry,
    AuditLog,
}

impl TargetType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Node => "node",
            Self::Tree => "tree",
            Self::AuditEntry => "audit_entry",
            Self::AuditLog => "audit_log",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditTarget {
    pub id: String,
    pub target_type: TargetType,
}

impl AuditTarget {
    pub fn node(node_id: i64) -> Self {
        Self {
            id: node_id.to_string(),
            target_type: TargetType::Node,
        }
    }

    pub fn tree(run_id: impl Into<String>) -> Self {
        Self {
            id: run_id.into(),
            target_type: TargetType::Tree,
        }
    }

    pub fn audit_entry(entry_id: i64) -> Self {
        Self {
            id: entry_id.to_string(),
            target_type: TargetType::AuditEntry,
        }
    }

    pub fn audit_log() -> Self {
        Self {
            id: "audit_log".to_string(),
            target_type: TargetType::AuditLog,
        }
    }
}

/// One ledger row, assembled by the mutation that produced it and committed explicitly.
///
/// The capability comes from [`OperationKind::undo_capability`]; a caller may only narrow
/// the undo window through [`AuditRecord::undo_timeout_seconds`], never widen it.
#[derive(Clone, Debug)]
pub struct AuditRecord {
    pub operation: OperationKind,
    pub target: AuditTarget,
    pub actor: String,
    pub context: Option<JsonValue>,
    pub payload: JsonValue,
    pub undo_data: Option<UndoPayload>,
    pub severity: Severity,
    pub tags: Vec<String>,
    pub group_id: Option<String>,
    timeout_override: Option<i64>,
}

impl AuditRecord {
    pub fn new(operation: OperationKind, target: AuditTarget) -> Self {
        Self {
            operation,
            target,
            actor: "system".to_string(),
            context: None,
            payload: JsonValue::Object(Default::default()),
            undo_data: None,
            severity: Severity::Info,
            tags: Vec::new(),
            group_id: None,
            timeout_override: None,
        }
    }

    pub fn actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = actor.into();
        self
    }

    pub fn context(mut self, context: Option<JsonValue>) -> Self {
        self.context = context;
        self
    }

    pub fn payload(mut self, payload: JsonValue) -> Self {
        self.payload = payload;
        self
    }

    pub fn undo_data(mut self, undo_data: UndoPayload) -> Self {
        self.undo_data = Some(undo_data);
        self
    }

    pub fn severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn group(mut self, group_id: Option<String>) -> Self {
        self.group_id = group_id;
        self
    }

    pub fn undo_timeout_seconds(mut self, seconds: i64) -> Self {
        self.timeout_override = Some(seconds.max(0));
        self
    }

    pub fn capability(&self) -> UndoCapability {
        let mut capability = self.operation.undo_capability();
        if !capability.is_undoable {
            return capability;
        }
        if let Some(requested) = self.timeout_override {
            capability.undo_timeout_seconds = Some(match capability.undo_timeout_seconds {
                Some(policy) => policy.min(requested),
                None => requested,
            });
        }
        capability
    }

    /// Normalized tags: trimmed, lowercased, deduplicated, sorted.
    pub fn normalized_tags(&self) -> Vec<String> {
        let mut tags = self
            .tags
            .iter()
            .map(|tag| tag.trim().to_lowercase())
            .filter(|tag| !tag.is_empty())
            .collect::<Vec<_>>();
        tags.sort();
        tags.dedup();
        tags
    }
}
