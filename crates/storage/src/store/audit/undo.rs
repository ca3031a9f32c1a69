#![forbid(unsafe_code)]

use super::super::materialize::undo_materialize_tx;
use super::super::nodes::ensure_label_free_tx;
use super::super::orphans::restore_repaired_tx;
use super::super::support::{
    audit_get_tx, audit_insert_tx, audit_mark_undone_tx, child_count_tx, node_delete_tx,
    node_get_tx, node_set_label_tx, require_node_tx, touch_parent_tx, typed_undo_payload,
};
use super::super::upsert::restore_slot_snapshots_tx;
use super::super::{
    ConflictError, NotFound, SqliteStore, StoreError, UndoError, ValidationError, begin_write,
};
use rusqlite::Transaction;
use serde_json::{Value as JsonValue, json};
use triage_core::audit::{
    AuditEntry, AuditRecord, AuditTarget, OperationKind, UndoPayload, UndoRequest, UndoResult,
};

impl SqliteStore {
    /// Reverses one ledger entry through its operation-specific inverse.
    ///
    /// Rejections are checked in a fixed order: unknown entry, already undone,
    /// not undoable, window expired, missing undo data. Entries whose policy
    /// requires confirmation additionally need `confirm`.
    pub fn undo_operation(&mut self, request: UndoRequest) -> Result<UndoResult, StoreError> {
        let now_ms = self.now_ms();
        let tx = begin_write(&mut self.conn)?;

        let entry = audit_get_tx(&tx, request.entry_id)?;
        let (operation, payload) = check_undoable(&entry, now_ms)?;
        if entry.requires_confirmation && !request.confirm {
            return Err(StoreError::Validation(ValidationError::ConfirmationRequired {
                entry_id: entry.id,
            }));
        }

        let effects = apply_inverse_tx(&tx, payload, now_ms)?;

        audit_mark_undone_tx(
            &tx,
            entry.id,
            &request.actor,
            request.reason.as_deref(),
            now_ms,
        )?;
        let record = AuditRecord::new(OperationKind::Undo, AuditTarget::audit_entry(entry.id))
            .actor(request.actor.as_str())
            .group(entry.group_id.clone())
            .payload(json!({
                "undone_entry_id": entry.id,
                "operation": operation,
                "target_id": entry.target_id,
                "reason": request.reason,
                "effects": effects,
            }));
        let undo_entry_id = audit_insert_tx(&tx, &record, now_ms)?;

        tx.commit()?;
        tracing::info!(
            entry_id = entry.id,
            undo_entry_id,
            operation = operation.as_str(),
            actor = %request.actor,
            "operation undone"
        );

        self.retry_slot_index();

        Ok(UndoResult {
            entry_id: entry.id,
            undo_entry_id,
            operation,
            undone_at_ms: now_ms,
            effects,
        })
    }
}

fn check_undoable(
    entry: &AuditEntry,
    now_ms: i64,
) -> Result<(OperationKind, UndoPayload), StoreError> {
    if entry.is_undone() {
        return Err(StoreError::Undo(UndoError::AlreadyUndone));
    }
    let operation = entry
        .operation_kind()
        .filter(|operation| entry.is_undoable && operation.undo_capability().is_undoable)
        .ok_or(StoreError::Undo(UndoError::NotUndoable))?;
    if let Some(deadline_ms) = entry.undo_deadline_ms()
        && now_ms > deadline_ms
    {
        tracing::warn!(entry_id = entry.id, deadline_ms, now_ms, "undo window expired");
        return Err(StoreError::Undo(UndoError::UndoTimeoutExpired {
            deadline_ms,
            now_ms,
        }));
    }
    let payload = typed_undo_payload(entry).ok_or(StoreError::Undo(UndoError::NoUndoData))?;
    Ok((operation, payload))
}

fn apply_inverse_tx(
    tx: &Transaction<'_>,
    payload: UndoPayload,
    now_ms: i64,
) -> Result<JsonValue, StoreError> {
    match payload {
        UndoPayload::NodeCreate { node_id } => {
            let node =
                node_get_tx(tx, node_id)?.ok_or(StoreError::NotFound(NotFound::Node(node_id)))?;
            let children = child_count_tx(tx, node_id)?;
            if children > 0 {
                return Err(StoreError::Conflict(ConflictError::HasChildren {
                    node_id,
                    children,
                }));
            }
            node_delete_tx(tx, node_id)?;
            touch_parent_tx(tx, node.parent_id, now_ms)?;
            Ok(json!({ "removed_ids": [node_id] }))
        }
        UndoPayload::NodeUpdate {
            node_id,
            previous_label,
        } => {
            let node = require_node_tx(tx, node_id)?;
            ensure_label_free_tx(tx, &node, &previous_label)?;
            let version = node_set_label_tx(tx, node_id, &previous_label, now_ms)?;
            touch_parent_tx(tx, node.parent_id, now_ms)?;
            Ok(json!({
                "node_id": node_id,
                "label": previous_label,
                "version": version,
            }))
        }
        UndoPayload::ChildrenUpsert {
            parent_id,
            previous_version,
            previous,
        } => {
            let restored = restore_slot_snapshots_tx(tx, parent_id, &previous, now_ms)?;
            Ok(json!({
                "parent_id": parent_id,
                "previous_version": previous_version,
                "relabelled_ids": restored.relabelled,
                "removed_ids": restored.removed,
            }))
        }
        UndoPayload::Materialize {
            run_id,
            started_at_ms,
            created_ids,
        } => undo_materialize_tx(tx, &run_id, started_at_ms, &created_ids, now_ms),
        UndoPayload::OrphanRepair {
            action,
            before,
            sibling_before,
        } => restore_repaired_tx(tx, action, &before, sibling_before.as_ref(), now_ms),
    }
}
