#![forbid(unsafe_code)]

use super::super::super::{ConflictError, NotFound, StoreError};
use super::read::descendants_tx;
use rusqlite::{OptionalExtension, Transaction, params};
use triage_core::tree::TreeNode;

pub(in crate::store) struct NodeInsert<'a> {
    pub(in crate::store) parent_id: Option<i64>,
    pub(in crate::store) depth: i64,
    pub(in crate::store) slot: i64,
    pub(in crate::store) label: &'a str,
    pub(in crate::store) is_leaf: bool,
    pub(in crate::store) now_ms: i64,
}

pub(in crate::store) fn node_insert_tx(
    tx: &Transaction<'_>,
    args: NodeInsert<'_>,
) -> Result<i64, StoreError> {
    let NodeInsert {
        parent_id,
        depth,
        slot,
        label,
        is_leaf,
        now_ms,
    } = args;
    let inserted = tx.execute(
        "INSERT INTO nodes(parent_id, depth, slot, label, is_leaf, version, created_at_ms, updated_at_ms) \
         VALUES (?1, ?2, ?3, ?4, ?5, 1, ?6, ?6)",
        params![parent_id, depth, slot, label, is_leaf as i64, now_ms],
    );
    match inserted {
        Ok(_) => Ok(tx.last_insert_rowid()),
        Err(err) => Err(map_slot_conflict(err, parent_id, slot)),
    }
}

/// Re-inserts a previously captured row under its original id.
pub(in crate::store) fn node_restore_tx(
    tx: &Transaction<'_>,
    node: &TreeNode,
    now_ms: i64,
) -> Result<(), StoreError> {
    tx.execute(
        "INSERT INTO nodes(id, parent_id, depth, slot, label, is_leaf, version, created_at_ms, updated_at_ms) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            node.id,
            node.parent_id,
            node.depth,
            node.slot,
            node.label,
            node.is_leaf as i64,
            node.version + 1,
            node.created_at_ms,
            now_ms
        ],
    )?;
    Ok(())
}

pub(in crate::store) fn node_set_label_tx(
    tx: &Transaction<'_>,
    node_id: i64,
    label: &str,
    now_ms: i64,
) -> Result<i64, StoreError> {
    let changed = tx.execute(
        "UPDATE nodes SET label=?2, version=version + 1, updated_at_ms=?3 WHERE id=?1",
        params![node_id, label, now_ms],
    )?;
    if changed == 0 {
        return Err(StoreError::NotFound(NotFound::Node(node_id)));
    }
    current_version_tx(tx, node_id)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(in crate::store) struct NodePosition {
    pub(in crate::store) parent_id: Option<i64>,
    pub(in crate::store) depth: i64,
    pub(in crate::store) slot: Option<i64>,
}

impl NodePosition {
    pub(in crate::store) fn of(node: &TreeNode) -> Self {
        Self {
            parent_id: node.parent_id,
            depth: node.depth,
            slot: node.slot,
        }
    }
}

pub(in crate::store) fn node_set_position_tx(
    tx: &Transaction<'_>,
    node_id: i64,
    position: NodePosition,
    now_ms: i64,
) -> Result<i64, StoreError> {
    let changed = tx.execute(
        "UPDATE nodes SET parent_id=?2, depth=?3, slot=?4, version=version + 1, updated_at_ms=?5 \
         WHERE id=?1",
        params![
            node_id,
            position.parent_id,
            position.depth,
            position.slot,
            now_ms
        ],
    );
    match changed {
        Ok(0) => Err(StoreError::NotFound(NotFound::Node(node_id))),
        Ok(_) => current_version_tx(tx, node_id),
        Err(err) => match (position.parent_id, position.slot) {
            (Some(parent_id), Some(slot)) => Err(map_slot_conflict(err, Some(parent_id), slot)),
            _ => Err(err.into()),
        },
    }
}

/// Optimistic version bump; `expected` guards against concurrent writers.
pub(in crate::store) fn bump_node_version_tx(
    tx: &Transaction<'_>,
    node_id: i64,
    expected: Option<i64>,
    now_ms: i64,
) -> Result<i64, StoreError> {
    let current = current_version_tx(tx, node_id)?;

    if let Some(expected) = expected
        && expected != current
    {
        return Err(StoreError::Conflict(ConflictError::VersionMismatch {
            node_id,
            expected,
            actual: current,
        }));
    }

    let next = current + 1;
    tx.execute(
        "UPDATE nodes SET version=?2, updated_at_ms=?3 WHERE id=?1",
        params![node_id, next, now_ms],
    )?;
    Ok(next)
}

/// Bumps the parent if it still exists; used when a child set changes.
pub(in crate::store) fn touch_parent_tx(
    tx: &Transaction<'_>,
    parent_id: Option<i64>,
    now_ms: i64,
) -> Result<Option<i64>, StoreError> {
    let Some(parent_id) = parent_id else {
        return Ok(None);
    };
    match bump_node_version_tx(tx, parent_id, None, now_ms) {
        Ok(version) => Ok(Some(version)),
        Err(StoreError::NotFound(_)) => Ok(None),
        Err(err) => Err(err),
    }
}

/// Deletes a node and, through the cascade, its subtree. Returns rows removed.
pub(in crate::store) fn node_delete_tx(
    tx: &Transaction<'_>,
    node_id: i64,
) -> Result<u64, StoreError> {
    let below = descendants_tx(tx, node_id)?.len() as u64;
    let changed = tx.execute("DELETE FROM nodes WHERE id=?1", params![node_id])?;
    if changed == 0 {
        return Err(StoreError::NotFound(NotFound::Node(node_id)));
    }
    Ok(below + 1)
}

fn current_version_tx(tx: &Transaction<'_>, node_id: i64) -> Result<i64, StoreError> {
    tx.query_row(
        "SELECT version FROM nodes WHERE id=?1",
        params![node_id],
        |row| row.get(0),
    )
    .optional()?
    .ok_or(StoreError::NotFound(NotFound::Node(node_id)))
}

fn map_slot_conflict(err: rusqlite::Error, parent_id: Option<i64>, slot: i64) -> StoreError {
    if let (Some(parent_id), rusqlite::Error::SqliteFailure(_, Some(message))) =
        (parent_id, &err)
        && message.contains("nodes.parent_id, nodes.slot")
    {
        return StoreError::Conflict(ConflictError::SlotTaken { parent_id, slot });
    }
    err.into()
}
