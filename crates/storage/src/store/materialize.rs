#![forbid(unsafe_code)]

use super::support::{
    NODE_COLUMNS, NodeInsert, audit_insert_tx, bump_node_version_tx, children_of_tx,
    descendants_tx, node_delete_tx, node_from_row, node_get_tx, node_insert_tx, require_node_tx,
};
use super::upsert::ensure_can_own_children;
use super::{SqliteStore, StoreError, begin_write};
use rusqlite::{Connection, Transaction};
use serde_json::json;
use std::collections::BTreeSet;
use triage_core::audit::{AuditRecord, AuditTarget, OperationKind, UndoPayload};
use triage_core::materialize::{
    MaterializeReport, MaterializeRequest, MaterializeSample, MaterializeScope, SampleCategory,
};
use triage_core::tree::{
    MAX_DEPTH, TreeNode, is_child_slot, is_placeholder_label, missing_slots, placeholder_label,
};
use uuid::Uuid;

impl SqliteStore {
    /// Brings every targeted parent to exactly five children, or prunes a
    /// placeholder-only child set that is still incomplete. One transaction per call.
    pub fn materialize(
        &mut self,
        request: MaterializeRequest,
    ) -> Result<MaterializeReport, StoreError> {
        let started_at_ms = self.now_ms();
        let run_id = Uuid::new_v4().to_string();
        let mut report = MaterializeReport::start(run_id.clone(), started_at_ms);
        let mut created_ids = Vec::new();

        let tx = begin_write(&mut self.conn)?;
        let targets = resolve_targets_tx(&tx, &request.scope)?;

        for target in targets {
            let Some(parent) = node_get_tx(&tx, target.id)? else {
                tracing::debug!(run_id = %run_id, parent_id = target.id, "target removed earlier in run");
                report.skipped += 1;
                continue;
            };
            let children = children_of_tx(&tx, parent.id)?;
            let absent = missing_slots(children.iter().filter_map(|child| child.slot));

            // A complete child set always takes the kept path.
            if request.prune_safe
                && !children.is_empty()
                && !absent.is_empty()
                && is_prunable_tx(&tx, &children)?
            {
                let mut rows = 0;
                for child in &children {
                    rows += node_delete_tx(&tx, child.id)?;
                }
                report.pruned_rows += rows;
                report.record(
                    SampleCategory::Pruned,
                    MaterializeSample {
                        parent_id: parent.id,
                        slot: None,
                        node_id: None,
                        label: None,
                    },
                );
                bump_node_version_tx(&tx, parent.id, None, started_at_ms)?;
                tracing::debug!(run_id = %run_id, parent_id = parent.id, rows, "placeholder children pruned");
                continue;
            }

            for child in children.iter().filter(|child| child.slot.is_some_and(is_child_slot)) {
                report.record(
                    SampleCategory::Kept,
                    MaterializeSample {
                        parent_id: parent.id,
                        slot: child.slot,
                        node_id: Some(child.id),
                        label: Some(child.label.clone()),
                    },
                );
            }

            if !request.enforce_five {
                continue;
            }

            if absent.is_empty() {
                continue;
            }
            let depth = parent.depth + 1;
            for slot in &absent {
                let label = placeholder_label(*slot);
                let node_id = node_insert_tx(
                    &tx,
                    NodeInsert {
                        parent_id: Some(parent.id),
                        depth,
                        slot: *slot,
                        label: &label,
                        is_leaf: depth == MAX_DEPTH,
                        now_ms: started_at_ms,
                    },
                )?;
                created_ids.push(node_id);
                report.record(
                    SampleCategory::Added,
                    MaterializeSample {
                        parent_id: parent.id,
                        slot: Some(*slot),
                        node_id: Some(node_id),
                        label: Some(label),
                    },
                );
            }
            report.record(
                SampleCategory::Filled,
                MaterializeSample {
                    parent_id: parent.id,
                    slot: None,
                    node_id: None,
                    label: None,
                },
            );
            bump_node_version_tx(&tx, parent.id, None, started_at_ms)?;
        }

        report.finished_at_ms = self.clock.now_ms();

        if !report.is_noop() {
            let mut record = AuditRecord::new(OperationKind::Materialize, AuditTarget::tree(&run_id))
                .actor(request.actor.as_str())
                .payload(json!({
                    "scope": request.scope,
                    "enforce_five": request.enforce_five,
                    "prune_safe": request.prune_safe,
                    "added": report.added,
                    "filled": report.filled,
                    "pruned": report.pruned,
                    "pruned_rows": report.pruned_rows,
                    "kept": report.kept,
                    "skipped": report.skipped,
                    "created_ids": created_ids,
                }));
            if !created_ids.is_empty() {
                record = record.undo_data(UndoPayload::Materialize {
                    run_id: run_id.clone(),
                    started_at_ms,
                    created_ids,
                });
            }
            report.audit_id = Some(audit_insert_tx(&tx, &record, report.finished_at_ms)?);
        }

        tx.commit()?;
        tracing::info!(
            run_id = %report.run_id,
            added = report.added,
            filled = report.filled,
            pruned = report.pruned,
            kept = report.kept,
            skipped = report.skipped,
            "materialize finished"
        );
        Ok(report)
    }
}

fn resolve_targets_tx(
    conn: &Connection,
    scope: &MaterializeScope,
) -> Result<Vec<TreeNode>, StoreError> {
    let mut targets = match scope {
        MaterializeScope::All => {
            let mut stmt = conn.prepare(&format!(
                "SELECT {NODE_COLUMNS} FROM nodes p \
                 WHERE p.depth BETWEEN 0 AND ?1 AND p.is_leaf = 0 \
                   AND EXISTS (SELECT 1 FROM nodes c WHERE c.parent_id = p.id)"
            ))?;
            let rows = stmt.query_map([MAX_DEPTH - 1], node_from_row)?;
            let mut out = Vec::new();
            for row in rows {
                out.push(row?);
            }
            out
        }
        MaterializeScope::Parents(ids) => {
            let mut out = Vec::new();
            for id in ids.iter().copied().collect::<BTreeSet<_>>() {
                let node = require_node_tx(conn, id)?;
                ensure_can_own_children(&node)?;
                out.push(node);
            }
            out
        }
    };
    targets.sort_by_key(|node| (node.depth, node.id));
    Ok(targets)
}

/// True when every child is a placeholder and nothing beneath them carries content.
fn is_prunable_tx(conn: &Connection, children: &[TreeNode]) -> Result<bool, StoreError> {
    for child in children {
        if !is_placeholder_label(&child.label) {
            return Ok(false);
        }
        if descendants_tx(conn, child.id)?
            .iter()
            .any(|node| !is_placeholder_label(&node.label))
        {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Best-effort inverse of one run: removes only placeholders the run created
/// that are still untouched.
pub(super) fn undo_materialize_tx(
    tx: &Transaction<'_>,
    run_id: &str,
    started_at_ms: i64,
    created_ids: &[i64],
    now_ms: i64,
) -> Result<serde_json::Value, StoreError> {
    let mut removed = Vec::new();
    let mut kept = Vec::new();
    let mut parents = BTreeSet::new();

    for &node_id in created_ids {
        let Some(node) = node_get_tx(tx, node_id)? else {
            continue;
        };
        let untouched = is_placeholder_label(&node.label)
            && node.created_at_ms >= started_at_ms
            && children_of_tx(tx, node.id)?.is_empty();
        if !untouched {
            tracing::warn!(run_id, node_id, "placeholder changed since materialize; left in place");
            kept.push(node_id);
            continue;
        }
        node_delete_tx(tx, node_id)?;
        removed.push(node_id);
        if let Some(parent_id) = node.parent_id {
            parents.insert(parent_id);
        }
    }

    for parent_id in parents {
        if node_get_tx(tx, parent_id)?.is_some() {
            bump_node_version_tx(tx, parent_id, None, now_ms)?;
        }
    }

    Ok(json!({
        "run_id": run_id,
        "removed_ids": removed,
        "kept_ids": kept,
    }))
}
