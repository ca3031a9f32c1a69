#![forbid(unsafe_code)]

use super::support::{
    NodeInsert, audit_insert_tx, bump_node_version_tx, child_count_tx, child_labels_by_slot,
    children_of_tx, group_record_item_tx, node_delete_tx, node_get_tx, node_insert_tx,
    node_set_label_tx, require_node_tx,
};
use super::{
    ConflictError, NotFound, SqliteStore, StoreError, UpsertChildrenRequest, ValidationError,
    begin_write,
};
use rusqlite::Transaction;
use serde_json::json;
use triage_core::audit::{AuditRecord, AuditTarget, OperationKind, SlotSnapshot, UndoPayload};
use triage_core::tree::{
    ChildInput, MAX_DEPTH, TreeNode, UpsertChildrenResult, find_label_collision, is_child_slot,
    missing_slots, normalize_label, validate_slot_set,
};
use triage_core::version::{ConflictDescriptor, VersionInfo, diff_slots};

impl SqliteStore {
    /// Replaces all five child labels of one parent atomically.
    pub fn upsert_children(
        &mut self,
        request: UpsertChildrenRequest,
    ) -> Result<UpsertChildrenResult, StoreError> {
        validate_slot_set(request.children.iter().map(|child| child.slot))
            .map_err(ValidationError::IncompleteSlots)?;

        let mut children = Vec::with_capacity(request.children.len());
        for child in &request.children {
            let label = normalize_label(&child.label).map_err(|error| {
                ValidationError::InvalidLabel {
                    slot: Some(child.slot),
                    error,
                }
            })?;
            children.push(ChildInput::new(child.slot, label));
        }
        children.sort_by_key(|child| child.slot);

        let now_ms = self.now_ms();
        let tx = begin_write(&mut self.conn)?;

        let parent = require_node_tx(&tx, request.parent_id)?;
        ensure_can_own_children(&parent)?;

        let existing = children_of_tx(&tx, parent.id)?;
        let stored = child_labels_by_slot(&existing);

        if let Some(expected) = request.expected_version.as_ref() {
            let current = VersionInfo {
                node_id: parent.id,
                version: parent.version,
                updated_at_ms: parent.updated_at_ms,
            };
            if !expected.matches(&current) {
                let slots = diff_slots(&children, &stored);
                if !slots.is_empty() {
                    tracing::warn!(
                        parent_id = parent.id,
                        client_version = ?expected.claimed_version(),
                        server_version = parent.version,
                        conflicting_slots = slots.len(),
                        "stale children upsert rejected"
                    );
                    return Err(StoreError::Conflict(ConflictError::StaleChildren(
                        ConflictDescriptor {
                            parent_id: parent.id,
                            slots,
                            client_version: expected.claimed_version().unwrap_or(-1),
                            server_version: parent.version,
                        },
                    )));
                }
                tracing::debug!(
                    parent_id = parent.id,
                    "stale version with identical payload accepted"
                );
            }
        }

        if let Some(collision) =
            find_label_collision(children.iter().map(|child| (child.slot, child.label.as_str())))
        {
            return Err(StoreError::Validation(ValidationError::DuplicateLabel(
                collision,
            )));
        }

        let applied = apply_slot_labels_tx(&tx, &parent, &existing, &children, now_ms)?;
        let new_version = bump_node_version_tx(&tx, parent.id, None, now_ms)?;

        let after = children_of_tx(&tx, parent.id)?;
        let missing = missing_slots(
            after
                .iter()
                .filter_map(|child| child.slot)
                .filter(|slot| is_child_slot(*slot)),
        );

        let record = AuditRecord::new(OperationKind::ChildrenUpsert, AuditTarget::node(parent.id))
            .actor(request.actor.as_str())
            .group(request.group_id.clone())
            .payload(json!({
                "before": stored,
                "after": child_labels_by_slot(&after),
                "previous_version": parent.version,
                "new_version": new_version,
                "updated_ids": applied.updated_ids,
            }))
            .undo_data(UndoPayload::ChildrenUpsert {
                parent_id: parent.id,
                previous_version: parent.version,
                previous: applied.previous,
            });
        let audit_id = audit_insert_tx(&tx, &record, now_ms)?;

        if let Some(group_id) = request.group_id.as_deref() {
            group_record_item_tx(&tx, group_id, true)?;
        }

        tx.commit()?;
        tracing::info!(
            parent_id = parent.id,
            new_version,
            updated = applied.updated_ids.len(),
            "children upserted"
        );

        Ok(UpsertChildrenResult {
            parent_id: parent.id,
            new_version,
            missing_slots: missing,
            updated_ids: applied.updated_ids,
            audit_id,
        })
    }
}

pub(super) fn ensure_can_own_children(parent: &TreeNode) -> Result<(), StoreError> {
    if parent.can_have_children() {
        return Ok(());
    }
    if parent.depth >= MAX_DEPTH {
        return Err(StoreError::Validation(ValidationError::DepthLimit {
            node_id: parent.id,
            depth: parent.depth,
        }));
    }
    Err(StoreError::Validation(ValidationError::LeafNode {
        node_id: parent.id,
    }))
}

struct AppliedSlots {
    updated_ids: Vec<i64>,
    previous: Vec<SlotSnapshot>,
}

fn apply_slot_labels_tx(
    tx: &Transaction<'_>,
    parent: &TreeNode,
    existing: &[TreeNode],
    children: &[ChildInput],
    now_ms: i64,
) -> Result<AppliedSlots, StoreError> {
    let depth = parent.depth + 1;
    let mut updated_ids = Vec::new();
    let mut previous = Vec::new();

    for child in children {
        match existing.iter().find(|node| node.slot == Some(child.slot)) {
            Some(node) if node.label == child.label => {
                tracing::debug!(parent_id = parent.id, slot = child.slot, "slot unchanged");
            }
            Some(node) => {
                node_set_label_tx(tx, node.id, &child.label, now_ms)?;
                tracing::debug!(parent_id = parent.id, slot = child.slot, node_id = node.id, "slot relabelled");
                updated_ids.push(node.id);
                previous.push(SlotSnapshot {
                    slot: child.slot,
                    node_id: Some(node.id),
                    label: Some(node.label.clone()),
                });
            }
            None => {
                let node_id = node_insert_tx(
                    tx,
                    NodeInsert {
                        parent_id: Some(parent.id),
                        depth,
                        slot: child.slot,
                        label: &child.label,
                        is_leaf: depth == MAX_DEPTH,
                        now_ms,
                    },
                )?;
                tracing::debug!(parent_id = parent.id, slot = child.slot, node_id, "slot created");
                updated_ids.push(node_id);
                previous.push(SlotSnapshot {
                    slot: child.slot,
                    node_id: None,
                    label: None,
                });
            }
        }
    }

    Ok(AppliedSlots {
        updated_ids,
        previous,
    })
}

/// Puts captured slot state back: relabels surviving children and removes
/// children that were created at a slot, provided they have not grown a subtree.
pub(super) fn restore_slot_snapshots_tx(
    tx: &Transaction<'_>,
    parent_id: i64,
    previous: &[SlotSnapshot],
    now_ms: i64,
) -> Result<RestoredSlots, StoreError> {
    require_node_tx(tx, parent_id)?;
    let mut restored = RestoredSlots::default();

    for snapshot in previous {
        match (snapshot.node_id, snapshot.label.as_deref()) {
            (Some(node_id), Some(label)) => {
                let node =
                    node_get_tx(tx, node_id)?.ok_or(StoreError::NotFound(NotFound::Node(node_id)))?;
                if node.label != label {
                    node_set_label_tx(tx, node_id, label, now_ms)?;
                    restored.relabelled.push(node_id);
                }
            }
            _ => {
                let current = children_of_tx(tx, parent_id)?
                    .into_iter()
                    .find(|node| node.slot == Some(snapshot.slot));
                let Some(node) = current else {
                    continue;
                };
                let children = child_count_tx(tx, node.id)?;
                if children > 0 {
                    return Err(StoreError::Conflict(ConflictError::HasChildren {
                        node_id: node.id,
                        children,
                    }));
                }
                node_delete_tx(tx, node.id)?;
                restored.removed.push(node.id);
            }
        }
    }

    bump_node_version_tx(tx, parent_id, None, now_ms)?;
    Ok(restored)
}

#[derive(Debug, Default)]
pub(super) struct RestoredSlots {
    pub(super) relabelled: Vec<i64>,
    pub(super) removed: Vec<i64>,
}
