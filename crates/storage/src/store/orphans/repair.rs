#![forbid(unsafe_code)]

use super::super::support::{
    NodePosition, audit_insert_tx, child_count_tx, children_of_tx, descendants_tx,
    group_record_item_tx, is_descendant_tx, node_delete_tx, node_get_tx, node_restore_tx,
    node_set_label_tx, node_set_position_tx, require_node_tx, root_with_label_tx,
    touch_parent_tx,
};
use super::super::upsert::ensure_can_own_children;
use super::super::{
    ConflictError, NotFound, SqliteStore, StoreError, ValidationError, begin_write,
};
use super::detect::classify_node_tx;
use rusqlite::{Connection, Transaction};
use serde_json::json;
use std::collections::BTreeSet;
use triage_core::audit::{AuditRecord, AuditTarget, OperationKind, Severity, UndoPayload};
use triage_core::orphan::{OrphanKind, RepairAction, RepairOutcome, RepairParams, RepairRequest};
use triage_core::tree::{
    MAX_DEPTH, ROOT_SLOT, TreeNode, is_child_slot, lowest_free_slot, normalize_label,
};

struct Applied {
    after: Option<TreeNode>,
    sibling_before: Option<TreeNode>,
    message: String,
    warnings: Vec<String>,
}

impl SqliteStore {
    /// Applies one corrective action to one classified orphan, atomically.
    pub fn repair_orphan(&mut self, request: RepairRequest) -> Result<RepairOutcome, StoreError> {
        self.repair_orphan_grouped(request, None)
    }

    pub(super) fn repair_orphan_grouped(
        &mut self,
        request: RepairRequest,
        group_id: Option<&str>,
    ) -> Result<RepairOutcome, StoreError> {
        let now_ms = self.now_ms();
        let tx = begin_write(&mut self.conn)?;

        let before = node_get_tx(&tx, request.node_id)?
            .ok_or(StoreError::NotFound(NotFound::Orphan(request.node_id)))?;
        let kinds = classify_node_tx(&tx, &before)?;
        if kinds.is_empty() {
            return Err(StoreError::NotFound(NotFound::Orphan(before.id)));
        }

        let mut applied = match request.action {
            RepairAction::DeleteOrphan => delete_orphan_tx(&tx, &before)?,
            RepairAction::ReassignParent => {
                reassign_parent_tx(&tx, &before, &request.params, now_ms)?
            }
            RepairAction::FixDepth => fix_depth_tx(&tx, &before, now_ms)?,
            RepairAction::FixSlot => fix_slot_tx(&tx, &before, request.params.slot, now_ms)?,
            RepairAction::ConvertToRoot => convert_to_root_tx(&tx, &before, now_ms)?,
            RepairAction::MergeWithSibling => {
                merge_with_sibling_tx(&tx, &before, request.params.sibling_id, now_ms)?
            }
        };

        if !kinds
            .iter()
            .any(|kind| kind.actions().contains(&request.action))
        {
            applied.warnings.push(format!(
                "{} is not a recommended action for {}",
                request.action.as_str(),
                kind_list(&kinds)
            ));
        }

        verify_tx(&tx, request.action, applied.after.as_ref(), &mut applied.warnings)?;

        for parent_id in touched_parents(&before, applied.after.as_ref()) {
            touch_parent_tx(&tx, Some(parent_id), now_ms)?;
        }

        let severity = kinds
            .iter()
            .map(|kind| kind.severity())
            .max()
            .unwrap_or(Severity::Warning);
        let record = AuditRecord::new(OperationKind::OrphanRepair, AuditTarget::node(before.id))
            .actor(request.actor.as_str())
            .severity(severity)
            .group(group_id.map(str::to_string))
            .tags(kinds.iter().map(|kind| kind.as_str()))
            .payload(json!({
                "action": request.action,
                "params": request.params,
                "kinds": kinds,
                "before": before,
                "after": applied.after,
                "sibling_before": applied.sibling_before,
                "success": true,
                "message": applied.message,
                "warnings": applied.warnings,
            }))
            .undo_data(UndoPayload::OrphanRepair {
                action: request.action,
                before: before.clone(),
                sibling_before: applied.sibling_before.clone(),
            });
        let audit_id = audit_insert_tx(&tx, &record, now_ms)?;

        if let Some(group_id) = group_id {
            group_record_item_tx(&tx, group_id, true)?;
        }

        tx.commit()?;
        tracing::info!(
            node_id = before.id,
            action = request.action.as_str(),
            kinds = %kind_list(&kinds),
            warnings = applied.warnings.len(),
            "orphan repaired"
        );

        self.retry_slot_index();

        Ok(RepairOutcome {
            node_id: before.id,
            action: request.action,
            success: true,
            message: applied.message,
            warnings: applied.warnings,
            before,
            after: applied.after,
            audit_id,
        })
    }
}

fn kind_list(kinds: &[OrphanKind]) -> String {
    kinds
        .iter()
        .map(|kind| kind.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Existing parents whose child set changed: the old one and, if moved, the new one.
fn touched_parents(before: &TreeNode, after: Option<&TreeNode>) -> BTreeSet<i64> {
    before
        .parent_id
        .into_iter()
        .chain(after.and_then(|node| node.parent_id))
        .collect()
}

fn delete_orphan_tx(tx: &Transaction<'_>, before: &TreeNode) -> Result<Applied, StoreError> {
    let children = child_count_tx(tx, before.id)?;
    if children > 0 {
        return Err(StoreError::Conflict(ConflictError::HasChildren {
            node_id: before.id,
            children,
        }));
    }
    node_delete_tx(tx, before.id)?;
    Ok(Applied {
        after: None,
        sibling_before: None,
        message: format!("deleted orphan {}", before.id),
        warnings: Vec::new(),
    })
}

fn reassign_parent_tx(
    tx: &Transaction<'_>,
    before: &TreeNode,
    params: &RepairParams,
    now_ms: i64,
) -> Result<Applied, StoreError> {
    let new_parent_id = params.new_parent_id.ok_or(StoreError::Validation(
        ValidationError::Invalid("reassign_parent requires new_parent_id"),
    ))?;
    if new_parent_id == before.id {
        return Err(StoreError::Validation(ValidationError::Invalid(
            "a node cannot become its own parent",
        )));
    }
    let new_parent = require_node_tx(tx, new_parent_id)?;
    if is_descendant_tx(tx, before.id, new_parent.id)? {
        return Err(StoreError::Validation(ValidationError::Invalid(
            "new parent lies inside the orphan's subtree",
        )));
    }
    ensure_can_own_children(&new_parent)?;

    let slot = choose_slot_tx(tx, new_parent.id, before.id, params.slot)?;
    let position = NodePosition {
        parent_id: Some(new_parent.id),
        depth: new_parent.depth + 1,
        slot: Some(slot),
    };
    node_set_position_tx(tx, before.id, position, now_ms)?;

    let mut warnings = Vec::new();
    push_depth_warning(tx, before, position.depth, &mut warnings)?;
    Ok(Applied {
        after: Some(require_node_tx(tx, before.id)?),
        sibling_before: None,
        message: format!(
            "moved node {} under parent {} at slot {slot}",
            before.id, new_parent.id
        ),
        warnings,
    })
}

fn fix_depth_tx(
    tx: &Transaction<'_>,
    before: &TreeNode,
    now_ms: i64,
) -> Result<Applied, StoreError> {
    let parent = existing_parent_tx(tx, before)?;
    let depth = parent.depth + 1;
    if depth > MAX_DEPTH {
        return Err(StoreError::Validation(ValidationError::DepthLimit {
            node_id: parent.id,
            depth: parent.depth,
        }));
    }
    node_set_position_tx(
        tx,
        before.id,
        NodePosition {
            depth,
            ..NodePosition::of(before)
        },
        now_ms,
    )?;

    let mut warnings = Vec::new();
    push_depth_warning(tx, before, depth, &mut warnings)?;
    Ok(Applied {
        after: Some(require_node_tx(tx, before.id)?),
        sibling_before: None,
        message: format!("depth of node {} set to {depth}", before.id),
        warnings,
    })
}

fn fix_slot_tx(
    tx: &Transaction<'_>,
    before: &TreeNode,
    requested: Option<i64>,
    now_ms: i64,
) -> Result<Applied, StoreError> {
    let parent = existing_parent_tx(tx, before)?;
    let slot = choose_slot_tx(tx, parent.id, before.id, requested)?;
    node_set_position_tx(
        tx,
        before.id,
        NodePosition {
            slot: Some(slot),
            ..NodePosition::of(before)
        },
        now_ms,
    )?;
    Ok(Applied {
        after: Some(require_node_tx(tx, before.id)?),
        sibling_before: None,
        message: format!("node {} moved to slot {slot}", before.id),
        warnings: Vec::new(),
    })
}

fn convert_to_root_tx(
    tx: &Transaction<'_>,
    before: &TreeNode,
    now_ms: i64,
) -> Result<Applied, StoreError> {
    if root_with_label_tx(tx, &before.label, Some(before.id))?.is_some() {
        return Err(StoreError::Conflict(ConflictError::DuplicateRoot {
            label: before.label.clone(),
        }));
    }
    node_set_position_tx(
        tx,
        before.id,
        NodePosition {
            parent_id: None,
            depth: 0,
            slot: Some(ROOT_SLOT),
        },
        now_ms,
    )?;

    let mut warnings = Vec::new();
    push_depth_warning(tx, before, 0, &mut warnings)?;
    Ok(Applied {
        after: Some(require_node_tx(tx, before.id)?),
        sibling_before: None,
        message: format!("node {} converted to a root", before.id),
        warnings,
    })
}

fn merge_with_sibling_tx(
    tx: &Transaction<'_>,
    before: &TreeNode,
    sibling_id: Option<i64>,
    now_ms: i64,
) -> Result<Applied, StoreError> {
    let sibling_id = sibling_id.ok_or(StoreError::Validation(ValidationError::Invalid(
        "merge_with_sibling requires sibling_id",
    )))?;
    let sibling = require_node_tx(tx, sibling_id)?;
    if sibling.id == before.id || sibling.parent_id.is_none() || sibling.parent_id != before.parent_id
    {
        return Err(StoreError::Validation(ValidationError::Invalid(
            "merge requires a sibling under the same parent",
        )));
    }
    let children = child_count_tx(tx, before.id)?;
    if children > 0 {
        return Err(StoreError::Conflict(ConflictError::HasChildren {
            node_id: before.id,
            children,
        }));
    }

    let merged = normalize_label(&format!("{} / {}", sibling.label, before.label)).map_err(
        |error| ValidationError::InvalidLabel {
            slot: sibling.slot,
            error,
        },
    )?;
    node_set_label_tx(tx, sibling.id, &merged, now_ms)?;
    node_delete_tx(tx, before.id)?;

    Ok(Applied {
        after: None,
        message: format!("node {} merged into sibling {} as {merged:?}", before.id, sibling.id),
        sibling_before: Some(sibling),
        warnings: Vec::new(),
    })
}

fn existing_parent_tx(conn: &Connection, node: &TreeNode) -> Result<TreeNode, StoreError> {
    let parent_id = node.parent_id.ok_or(StoreError::Validation(ValidationError::Invalid(
        "node has no parent",
    )))?;
    require_node_tx(conn, parent_id)
}

/// Requested slot if free, otherwise the lowest free one under `parent_id`.
fn choose_slot_tx(
    conn: &Connection,
    parent_id: i64,
    node_id: i64,
    requested: Option<i64>,
) -> Result<i64, StoreError> {
    let taken = children_of_tx(conn, parent_id)?
        .into_iter()
        .filter(|child| child.id != node_id)
        .filter_map(|child| child.slot)
        .filter(|slot| is_child_slot(*slot))
        .collect::<BTreeSet<_>>();

    match requested {
        Some(slot) if !is_child_slot(slot) => Err(StoreError::Validation(
            ValidationError::Invalid("requested slot must be within 1..=5"),
        )),
        Some(slot) if taken.contains(&slot) => {
            Err(StoreError::Conflict(ConflictError::SlotTaken { parent_id, slot }))
        }
        Some(slot) => Ok(slot),
        None => lowest_free_slot(taken)
            .ok_or(StoreError::Conflict(ConflictError::NoFreeSlot { parent_id })),
    }
}

fn push_depth_warning(
    conn: &Connection,
    before: &TreeNode,
    new_depth: i64,
    warnings: &mut Vec<String>,
) -> Result<(), StoreError> {
    if new_depth == before.depth {
        return Ok(());
    }
    let below = descendants_tx(conn, before.id)?.len();
    if below > 0 {
        warnings.push(format!(
            "node {} has {below} descendant(s) whose depth no longer matches; re-run detection",
            before.id
        ));
    }
    Ok(())
}

/// Confirms the action removed the violation it targets.
fn verify_tx(
    conn: &Connection,
    action: RepairAction,
    after: Option<&TreeNode>,
    warnings: &mut Vec<String>,
) -> Result<(), StoreError> {
    let Some(after) = after else {
        return Ok(());
    };
    let remaining = classify_node_tx(conn, after)?;
    let resolved: &[OrphanKind] = match action {
        RepairAction::DeleteOrphan | RepairAction::MergeWithSibling => &[],
        RepairAction::ReassignParent | RepairAction::ConvertToRoot => &OrphanKind::ALL,
        RepairAction::FixDepth => &[OrphanKind::InvalidDepth],
        RepairAction::FixSlot => &[OrphanKind::InvalidSlot, OrphanKind::DuplicateSlot],
    };
    if let Some(kind) = remaining.iter().find(|kind| resolved.contains(kind)) {
        return Err(StoreError::Integrity {
            message: format!(
                "node {} still classified as {} after {}",
                after.id,
                kind.as_str(),
                action.as_str()
            ),
        });
    }
    for kind in remaining {
        warnings.push(format!("node {} is still classified as {}", after.id, kind.as_str()));
    }
    Ok(())
}

/// Inverse of a recorded repair. Constraints are enforced, so an inverse that
/// would re-create a dangling or duplicate reference fails as an integrity error.
pub(in crate::store) fn restore_repaired_tx(
    tx: &Transaction<'_>,
    action: RepairAction,
    before: &TreeNode,
    sibling_before: Option<&TreeNode>,
    now_ms: i64,
) -> Result<serde_json::Value, StoreError> {
    let current = node_get_tx(tx, before.id)?;
    match action {
        RepairAction::DeleteOrphan | RepairAction::MergeWithSibling => {
            if current.is_some() {
                return Err(StoreError::Integrity {
                    message: format!("node {} already exists", before.id),
                });
            }
            if let Some(sibling) = sibling_before {
                require_node_tx(tx, sibling.id)?;
                node_set_label_tx(tx, sibling.id, &sibling.label, now_ms)?;
            }
            node_restore_tx(tx, before, now_ms)?;
        }
        RepairAction::ReassignParent
        | RepairAction::FixDepth
        | RepairAction::FixSlot
        | RepairAction::ConvertToRoot => {
            if current.is_none() {
                return Err(StoreError::NotFound(NotFound::Node(before.id)));
            }
            node_set_position_tx(tx, before.id, NodePosition::of(before), now_ms)?;
        }
    }

    let restored = require_node_tx(tx, before.id)?;
    for parent_id in touched_parents(&restored, current.as_ref()) {
        touch_parent_tx(tx, Some(parent_id), now_ms)?;
    }

    Ok(json!({
        "action": action,
        "restored": restored,
        "sibling_restored": sibling_before.map(|sibling| sibling.id),
    }))
}
