#![forbid(unsafe_code)]

use rusqlite::ErrorCode;
use serde_json::{Value as JsonValue, json};
use triage_core::tree::{LabelCollision, LabelError, SlotSetError};
use triage_core::version::ConflictDescriptor;

/// Coarse taxonomy every adapter maps onto its own protocol codes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Conflict,
    NotFound,
    Integrity,
    Undo,
    Internal,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Validation => "validation_error",
            Self::Conflict => "conflict_error",
            Self::NotFound => "not_found_error",
            Self::Integrity => "integrity_error",
            Self::Undo => "undo_error",
            Self::Internal => "internal_error",
        }
    }

    pub fn status(self) -> u16 {
        match self {
            Self::Validation => 422,
            Self::Conflict | Self::Integrity | Self::Undo => 409,
            Self::NotFound => 404,
            Self::Internal => 500,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("sqlite: {0}")]
    Sql(rusqlite::Error),
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid input: {0}")]
    Validation(#[from] ValidationError),
    #[error("conflict: {0}")]
    Conflict(#[from] ConflictError),
    #[error("not found: {0}")]
    NotFound(#[from] NotFound),
    #[error("integrity violation: {message}")]
    Integrity { message: String },
    #[error("undo rejected: {0}")]
    Undo(#[from] UndoError),
}

#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("{}", .0.message())]
    IncompleteSlots(SlotSetError),
    #[error("invalid label{}: {error}", slot_suffix(*.slot))]
    InvalidLabel { slot: Option<i64>, error: LabelError },
    #[error("label {:?} submitted for slots {:?}", .0.label, .0.slots)]
    DuplicateLabel(LabelCollision),
    #[error("node {node_id} is at depth {depth} and cannot own children")]
    DepthLimit { node_id: i64, depth: i64 },
    #[error("node {node_id} is a leaf")]
    LeafNode { node_id: i64 },
    #[error("undo of entry {entry_id} requires confirmation")]
    ConfirmationRequired { entry_id: i64 },
    #[error("{0}")]
    Invalid(&'static str),
}

fn slot_suffix(slot: Option<i64>) -> String {
    slot.map(|slot| format!(" at slot {slot}"))
        .unwrap_or_default()
}

#[derive(Debug, thiserror::Error)]
pub enum ConflictError {
    #[error(
        "parent {} changed (client_version={}, server_version={}, {} slot(s) differ)",
        .0.parent_id, .0.client_version, .0.server_version, .0.slots.len()
    )]
    StaleChildren(ConflictDescriptor),
    #[error("version mismatch on node {node_id} (expected={expected}, actual={actual})")]
    VersionMismatch {
        node_id: i64,
        expected: i64,
        actual: i64,
    },
    #[error("slot {slot} under parent {parent_id} is already taken")]
    SlotTaken { parent_id: i64, slot: i64 },
    #[error("no free slot under parent {parent_id}")]
    NoFreeSlot { parent_id: i64 },
    #[error("a root labelled {label:?} already exists")]
    DuplicateRoot { label: String },
    #[error("node {node_id} still has {children} child(ren)")]
    HasChildren { node_id: i64, children: i64 },
}

#[derive(Debug, thiserror::Error)]
pub enum NotFound {
    #[error("node {0}")]
    Node(i64),
    #[error("orphan {0}")]
    Orphan(i64),
    #[error("audit entry {0}")]
    AuditEntry(i64),
    #[error("operation group {0}")]
    Group(String),
}

#[derive(Debug, thiserror::Error)]
pub enum UndoError {
    #[error("operation is not undoable")]
    NotUndoable,
    #[error("operation was already undone")]
    AlreadyUndone,
    #[error("undo window closed at {deadline_ms} (now {now_ms})")]
    UndoTimeoutExpired { deadline_ms: i64, now_ms: i64 },
    #[error("entry carries no usable undo data")]
    NoUndoData,
}

impl UndoError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotUndoable => "not_undoable",
            Self::AlreadyUndone => "already_undone",
            Self::UndoTimeoutExpired { .. } => "undo_timeout_expired",
            Self::NoUndoData => "no_undo_data",
        }
    }
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Integrity { .. } => ErrorKind::Integrity,
            Self::Undo(_) => ErrorKind::Undo,
            Self::Io(_) | Self::Sql(_) | Self::Json(_) => ErrorKind::Internal,
        }
    }

    pub fn status(&self) -> u16 {
        self.kind().status()
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Io(_) => "io_error",
            Self::Sql(_) => "storage_error",
            Self::Json(_) => "serialization_error",
            Self::Validation(err) => match err {
                ValidationError::IncompleteSlots(_) => "incomplete_slots",
                ValidationError::InvalidLabel { .. } => "invalid_label",
                ValidationError::DuplicateLabel(_) => "duplicate_label",
                ValidationError::DepthLimit { .. } => "depth_limit",
                ValidationError::LeafNode { .. } => "leaf_node",
                ValidationError::ConfirmationRequired { .. } => "confirmation_required",
                ValidationError::Invalid(_) => "invalid_input",
            },
            Self::Conflict(err) => match err {
                ConflictError::StaleChildren(_) => "version_conflict",
                ConflictError::VersionMismatch { .. } => "version_mismatch",
                ConflictError::SlotTaken { .. } => "duplicate_slot",
                ConflictError::NoFreeSlot { .. } => "no_free_slot",
                ConflictError::DuplicateRoot { .. } => "duplicate_root",
                ConflictError::HasChildren { .. } => "has_children",
            },
            Self::NotFound(err) => match err {
                NotFound::Node(_) => "node_not_found",
                NotFound::Orphan(_) => "orphan_not_found",
                NotFound::AuditEntry(_) => "audit_entry_not_found",
                NotFound::Group(_) => "group_not_found",
            },
            Self::Integrity { .. } => "integrity_conflict",
            Self::Undo(err) => err.code(),
        }
    }

    pub fn conflict_descriptor(&self) -> Option<&ConflictDescriptor> {
        match self {
            Self::Conflict(ConflictError::StaleChildren(descriptor)) => Some(descriptor),
            _ => None,
        }
    }

    /// Protocol-neutral error body. Internal failures never expose storage text.
    pub fn to_json(&self) -> JsonValue {
        let kind = self.kind();
        let message = match kind {
            ErrorKind::Internal => "internal storage failure".to_string(),
            _ => self.to_string(),
        };
        let details = match self {
            Self::Conflict(ConflictError::StaleChildren(descriptor)) => {
                serde_json::to_value(descriptor).unwrap_or(JsonValue::Null)
            }
            Self::Validation(ValidationError::IncompleteSlots(slots)) => {
                serde_json::to_value(slots).unwrap_or(JsonValue::Null)
            }
            _ => JsonValue::Null,
        };
        json!({
            "error": {
                "kind": kind.as_str(),
                "code": self.code(),
                "status": kind.status(),
                "message": message,
                "details": details,
            }
        })
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        if is_constraint_violation(&value) {
            return Self::Integrity {
                message: constraint_message(&value),
            };
        }
        Self::Sql(value)
    }
}

pub(in crate::store) fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(code, message) => {
            code.code == ErrorCode::ConstraintViolation
                || message.as_deref().is_some_and(|value| {
                    value.contains("UNIQUE constraint failed")
                        || value.contains("FOREIGN KEY constraint failed")
                })
        }
        _ => false,
    }
}

fn constraint_message(err: &rusqlite::Error) -> String {
    match err {
        rusqlite::Error::SqliteFailure(_, Some(message)) => {
            if message.contains("UNIQUE constraint failed") {
                "unique constraint violated".to_string()
            } else if message.contains("FOREIGN KEY constraint failed") {
                "foreign key constraint violated".to_string()
            } else if message.contains("append-only") || message.contains("already undone") {
                message.clone()
            } else {
                "constraint violated".to_string()
            }
        }
        _ => "constraint violated".to_string(),
    }
}
