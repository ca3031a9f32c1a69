#![forbid(unsafe_code)]

use super::support::{
    NodeInsert, audit_insert_tx, child_count_tx, children_of_tx, list_roots_tx, node_delete_tx,
    node_insert_tx, node_set_label_tx, require_node_tx, root_with_label_tx,
    touch_parent_tx, version_info_tx,
};
use super::versions::ensure_expected_tx;
use super::{
    ConflictError, CreateRootRequest, DeleteSubtreeRequest, DeleteSubtreeResult, NotFound,
    SqliteStore, StoreError, UpdateLabelRequest, ValidationError, begin_write,
};
use rusqlite::Connection;
use serde_json::json;
use triage_core::audit::{AuditRecord, AuditTarget, OperationKind, Severity, UndoPayload};
use triage_core::tree::{
    ChildrenSnapshot, LabelCollision, ROOT_SLOT, TreeNode, is_child_slot, label_key,
    missing_slots, normalize_label,
};
use triage_core::version::create_etag;

impl SqliteStore {
    pub fn create_root(&mut self, request: CreateRootRequest) -> Result<TreeNode, StoreError> {
        let label = normalize_label(&request.label)
            .map_err(|error| ValidationError::InvalidLabel { slot: None, error })?;
        let now_ms = self.now_ms();

        let tx = begin_write(&mut self.conn)?;
        if root_with_label_tx(&tx, &label, None)?.is_some() {
            return Err(StoreError::Conflict(ConflictError::DuplicateRoot { label }));
        }

        let node_id = node_insert_tx(
            &tx,
            NodeInsert {
                parent_id: None,
                depth: 0,
                slot: ROOT_SLOT,
                label: &label,
                is_leaf: false,
                now_ms,
            },
        )?;
        let node = require_node_tx(&tx, node_id)?;

        let record = AuditRecord::new(OperationKind::NodeCreate, AuditTarget::node(node_id))
            .actor(request.actor.as_str())
            .payload(json!({ "after": node }))
            .undo_data(UndoPayload::NodeCreate { node_id });
        audit_insert_tx(&tx, &record, now_ms)?;

        tx.commit()?;
        tracing::info!(node_id, label = %node.label, "root created");
        Ok(node)
    }

    pub fn get_node(&self, node_id: i64) -> Result<TreeNode, StoreError> {
        require_node_tx(&self.conn, node_id)
    }

    pub fn list_roots(&self) -> Result<Vec<TreeNode>, StoreError> {
        list_roots_tx(&self.conn)
    }

    /// Children of `parent_id` together with the parent's version and ETag.
    pub fn read_children_with_version(
        &self,
        parent_id: i64,
    ) -> Result<ChildrenSnapshot, StoreError> {
        let info = version_info_tx(&self.conn, parent_id)?
            .ok_or(StoreError::NotFound(NotFound::Node(parent_id)))?;
        let children = children_of_tx(&self.conn, parent_id)?;
        let missing = missing_slots(
            children
                .iter()
                .filter_map(|child| child.slot)
                .filter(|slot| is_child_slot(*slot)),
        );
        Ok(ChildrenSnapshot {
            parent_id,
            version: info.version,
            etag: create_etag(&info),
            children,
            missing_slots: missing,
        })
    }

    pub fn update_label(&mut self, request: UpdateLabelRequest) -> Result<TreeNode, StoreError> {
        let label = normalize_label(&request.label)
            .map_err(|error| ValidationError::InvalidLabel { slot: None, error })?;
        let now_ms = self.now_ms();

        let tx = begin_write(&mut self.conn)?;
        let before = require_node_tx(&tx, request.node_id)?;
        ensure_expected_tx(&tx, before.id, request.expected_version.as_ref())?;

        if before.label == label {
            return Ok(before);
        }

        ensure_label_free_tx(&tx, &before, &label)?;

        node_set_label_tx(&tx, before.id, &label, now_ms)?;
        touch_parent_tx(&tx, before.parent_id, now_ms)?;
        let after = require_node_tx(&tx, before.id)?;

        let record = AuditRecord::new(OperationKind::NodeUpdate, AuditTarget::node(before.id))
            .actor(request.actor.as_str())
            .payload(json!({ "before": before, "after": after }))
            .undo_data(UndoPayload::NodeUpdate {
                node_id: before.id,
                previous_label: before.label.clone(),
            });
        audit_insert_tx(&tx, &record, now_ms)?;

        tx.commit()?;
        tracing::info!(node_id = after.id, version = after.version, "label updated");
        Ok(after)
    }

    /// Removes a node and its whole subtree. Not undoable.
    pub fn delete_subtree(
        &mut self,
        request: DeleteSubtreeRequest,
    ) -> Result<DeleteSubtreeResult, StoreError> {
        let now_ms = self.now_ms();

        let tx = begin_write(&mut self.conn)?;
        let before = require_node_tx(&tx, request.node_id)?;
        ensure_expected_tx(&tx, before.id, request.expected_version.as_ref())?;
        let direct_children = child_count_tx(&tx, before.id)?;

        let deleted_rows = node_delete_tx(&tx, before.id)?;
        let parent_version = touch_parent_tx(&tx, before.parent_id, now_ms)?;

        let record = AuditRecord::new(OperationKind::NodeDelete, AuditTarget::node(before.id))
            .actor(request.actor.as_str())
            .severity(if direct_children > 0 {
                Severity::Warning
            } else {
                Severity::Info
            })
            .payload(json!({
                "before": before,
                "deleted_rows": deleted_rows,
                "direct_children": direct_children,
            }));
        let audit_id = audit_insert_tx(&tx, &record, now_ms)?;

        tx.commit()?;
        tracing::info!(node_id = before.id, deleted_rows, "subtree deleted");
        Ok(DeleteSubtreeResult {
            node_id: before.id,
            deleted_rows,
            parent_version,
            audit_id,
        })
    }
}


/// Rejects `label` for `node` when another root or sibling already uses it.
pub(super) fn ensure_label_free_tx(
    conn: &Connection,
    node: &TreeNode,
    label: &str,
) -> Result<(), StoreError> {
    match node.parent_id {
        None => {
            if root_with_label_tx(conn, label, Some(node.id))?.is_some() {
                return Err(StoreError::Conflict(ConflictError::DuplicateRoot {
                    label: label.to_string(),
                }));
            }
        }
        Some(parent_id) => {
            let key = label_key(label);
            if let Some(sibling) = children_of_tx(conn, parent_id)?
                .into_iter()
                .find(|sibling| sibling.id != node.id && label_key(&sibling.label) == key)
            {
                let mut slots = [node.slot, sibling.slot]
                    .into_iter()
                    .flatten()
                    .collect::<Vec<_>>();
                slots.sort_unstable();
                return Err(StoreError::Validation(ValidationError::DuplicateLabel(
                    LabelCollision {
                        label: label.to_string(),
                        slots,
                    },
                )));
            }
        }
    }
    Ok(())
}
