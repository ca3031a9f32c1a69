#![forbid(unsafe_code)]

use super::super::{NotFound, StoreError, ValidationError};
use rusqlite::{Connection, OptionalExtension, Row, Transaction, params};
use serde_json::Value as JsonValue;
use triage_core::audit::{
    AuditEntry, AuditRecord, GroupStatus, OperationGroup, Severity, UndoPayload,
};

pub(in crate::store) const AUDIT_COLUMNS: &str = "id, operation, target_id, target_type, actor, \
     context_json, payload_json, undo_data_json, is_undoable, undo_timeout_seconds, \
     requires_confirmation, undone_by, undone_at_ms, undo_reason, group_id, severity, \
     tags_json, created_at_ms";

/// Appends one ledger row inside the caller's transaction.
pub(in crate::store) fn audit_insert_tx(
    tx: &Transaction<'_>,
    record: &AuditRecord,
    now_ms: i64,
) -> Result<i64, StoreError> {
    let capability = record.capability();
    let context_json = record
        .context
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;
    let payload_json = serde_json::to_string(&record.payload)?;
    let undo_data_json = record
        .undo_data
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;
    let tags_json = serde_json::to_string(&record.normalized_tags())?;

    tx.execute(
        "INSERT INTO audit_log(operation, target_id, target_type, actor, context_json, payload_json, \
           undo_data_json, is_undoable, undo_timeout_seconds, requires_confirmation, group_id, \
           severity, tags_json, created_at_ms) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
        params![
            record.operation.as_str(),
            record.target.id,
            record.target.target_type.as_str(),
            record.actor,
            context_json,
            payload_json,
            undo_data_json,
            capability.is_undoable as i64,
            capability.undo_timeout_seconds,
            capability.requires_confirmation as i64,
            record.group_id,
            record.severity.as_str(),
            tags_json,
            now_ms
        ],
    )?;
    let id = tx.last_insert_rowid();
    tracing::debug!(
        audit_id = id,
        operation = record.operation.as_str(),
        target_id = %record.target.id,
        actor = %record.actor,
        "audit entry appended"
    );
    Ok(id)
}

pub(in crate::store) fn audit_get_tx(
    conn: &Connection,
    entry_id: i64,
) -> Result<AuditEntry, StoreError> {
    let raw = conn
        .query_row(
            &format!("SELECT {AUDIT_COLUMNS} FROM audit_log WHERE id=?1"),
            params![entry_id],
            raw_audit_from_row,
        )
        .optional()?
        .ok_or(StoreError::NotFound(NotFound::AuditEntry(entry_id)))?;
    raw.into_entry()
}

pub(in crate::store) fn audit_mark_undone_tx(
    tx: &Transaction<'_>,
    entry_id: i64,
    actor: &str,
    reason: Option<&str>,
    now_ms: i64,
) -> Result<(), StoreError> {
    tx.execute(
        "UPDATE audit_log SET undone_by=?2, undone_at_ms=?3, undo_reason=?4 WHERE id=?1",
        params![entry_id, actor, now_ms, reason],
    )?;
    Ok(())
}

/// Typed undo data of an entry, or `None` when absent, unparseable, or not
/// matching the entry's own operation.
pub(in crate::store) fn typed_undo_payload(entry: &AuditEntry) -> Option<UndoPayload> {
    let raw = entry.undo_data.clone()?;
    let payload = serde_json::from_value::<UndoPayload>(raw).ok()?;
    (Some(payload.operation()) == entry.operation_kind()).then_some(payload)
}

/// Column values as stored, before JSON decoding.
pub(in crate::store) struct RawAuditRow {
    id: i64,
    operation: String,
    target_id: String,
    target_type: String,
    actor: String,
    context_json: Option<String>,
    payload_json: String,
    undo_data_json: Option<String>,
    is_undoable: i64,
    undo_timeout_seconds: Option<i64>,
    requires_confirmation: i64,
    undone_by: Option<String>,
    undone_at_ms: Option<i64>,
    undo_reason: Option<String>,
    group_id: Option<String>,
    severity: String,
    tags_json: String,
    created_at_ms: i64,
}

pub(in crate::store) fn raw_audit_from_row(row: &Row<'_>) -> rusqlite::Result<RawAuditRow> {
    Ok(RawAuditRow {
        id: row.get(0)?,
        operation: row.get(1)?,
        target_id: row.get(2)?,
        target_type: row.get(3)?,
        actor: row.get(4)?,
        context_json: row.get(5)?,
        payload_json: row.get(6)?,
        undo_data_json: row.get(7)?,
        is_undoable: row.get(8)?,
        undo_timeout_seconds: row.get(9)?,
        requires_confirmation: row.get(10)?,
        undone_by: row.get(11)?,
        undone_at_ms: row.get(12)?,
        undo_reason: row.get(13)?,
        group_id: row.get(14)?,
        severity: row.get(15)?,
        tags_json: row.get(16)?,
        created_at_ms: row.get(17)?,
    })
}

impl RawAuditRow {
    pub(in crate::store) fn into_entry(self) -> Result<AuditEntry, StoreError> {
        let context = self
            .context_json
            .as_deref()
            .map(serde_json::from_str::<JsonValue>)
            .transpose()?;
        let undo_data = self
            .undo_data_json
            .as_deref()
            .map(serde_json::from_str::<JsonValue>)
            .transpose()?;
        Ok(AuditEntry {
            id: self.id,
            operation: self.operation,
            target_id: self.target_id,
            target_type: self.target_type,
            actor: self.actor,
            context,
            payload: serde_json::from_str(&self.payload_json)?,
            undo_data,
            is_undoable: self.is_undoable != 0,
            undo_timeout_seconds: self.undo_timeout_seconds,
            requires_confirmation: self.requires_confirmation != 0,
            undone_by: self.undone_by,
            undone_at_ms: self.undone_at_ms,
            undo_reason: self.undo_reason,
            group_id: self.group_id,
            severity: Severity::parse(&self.severity).unwrap_or_default(),
            tags: serde_json::from_str(&self.tags_json).unwrap_or_default(),
            created_at_ms: self.created_at_ms,
        })
    }
}

pub(in crate::store) fn group_get_tx(
    conn: &Connection,
    group_id: &str,
) -> Result<OperationGroup, StoreError> {
    conn.query_row(
        "SELECT group_id, label, actor, total, completed, failed, status, created_at_ms, finished_at_ms \
         FROM audit_groups WHERE group_id=?1",
        params![group_id],
        |row| {
            let status: String = row.get(6)?;
            Ok(OperationGroup {
                group_id: row.get(0)?,
                label: row.get(1)?,
                actor: row.get(2)?,
                total: row.get(3)?,
                completed: row.get(4)?,
                failed: row.get(5)?,
                status: GroupStatus::parse(&status).unwrap_or(GroupStatus::Open),
                created_at_ms: row.get(7)?,
                finished_at_ms: row.get(8)?,
            })
        },
    )
    .optional()?
    .ok_or_else(|| StoreError::NotFound(NotFound::Group(group_id.to_string())))
}

pub(in crate::store) fn group_record_item_tx(
    tx: &Transaction<'_>,
    group_id: &str,
    success: bool,
) -> Result<(), StoreError> {
    let changed = tx.execute(
        "UPDATE audit_groups SET total = total + 1, \
           completed = completed + ?2, failed = failed + ?3 \
         WHERE group_id=?1 AND status='open'",
        params![group_id, success as i64, (!success) as i64],
    )?;
    if changed == 0 {
        // Either unknown or already finished.
        group_get_tx(tx, group_id)?;
        return Err(StoreError::Validation(
            ValidationError::Invalid("operation group is already finished"),
        ));
    }
    Ok(())
}
