#![forbid(unsafe_code)]

use super::super::support::{node_columns_as, node_from_row, node_get_tx};
use super::super::{SqliteStore, StoreError};
use rusqlite::Connection;
use std::collections::BTreeMap;
use triage_core::orphan::{OrphanKind, OrphanRecord};
use triage_core::tree::{SLOT_COUNT, TreeNode, is_child_slot};

fn predicate_sql(kind: OrphanKind) -> String {
    let columns = node_columns_as("n");
    let predicate = match kind {
        OrphanKind::MissingParent => {
            "n.parent_id IS NOT NULL \
             AND NOT EXISTS (SELECT 1 FROM nodes p WHERE p.id = n.parent_id)"
        }
        OrphanKind::InvalidDepth => {
            "EXISTS (SELECT 1 FROM nodes p WHERE p.id = n.parent_id AND n.depth <> p.depth + 1)"
        }
        OrphanKind::InvalidSlot => {
            "n.parent_id IS NOT NULL AND (n.slot IS NULL OR n.slot < 1 OR n.slot > ?1)"
        }
        OrphanKind::DuplicateSlot => {
            "n.parent_id IS NOT NULL AND n.slot IS NOT NULL \
             AND EXISTS (SELECT 1 FROM nodes s \
                         WHERE s.parent_id = n.parent_id AND s.slot = n.slot AND s.id <> n.id)"
        }
    };
    format!("SELECT {columns} FROM nodes n WHERE {predicate} ORDER BY n.id ASC")
}

fn nodes_matching(conn: &Connection, kind: OrphanKind) -> Result<Vec<TreeNode>, StoreError> {
    let mut stmt = conn.prepare(&predicate_sql(kind))?;
    let rows = match kind {
        OrphanKind::InvalidSlot => stmt.query_map([SLOT_COUNT], node_from_row)?,
        _ => stmt.query_map([], node_from_row)?,
    };
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

impl SqliteStore {
    /// Classifies every structural violation currently stored.
    ///
    /// The four predicates run independently, so one node can be reported under
    /// several kinds. Results are ordered by node id, then by kind.
    pub fn detect_orphans(&self) -> Result<Vec<OrphanRecord>, StoreError> {
        let mut by_node: BTreeMap<(i64, usize), OrphanRecord> = BTreeMap::new();
        for (rank, kind) in OrphanKind::ALL.into_iter().enumerate() {
            for node in nodes_matching(&self.conn, kind)? {
                by_node.insert((node.id, rank), OrphanRecord::new(node, kind));
            }
        }
        let records = by_node.into_values().collect::<Vec<_>>();
        if !records.is_empty() {
            tracing::info!(orphans = records.len(), "orphan detection found violations");
        }
        Ok(records)
    }
}

/// Kinds that currently apply to one node, in [`OrphanKind::ALL`] order.
pub(super) fn classify_node_tx(
    conn: &Connection,
    node: &TreeNode,
) -> Result<Vec<OrphanKind>, StoreError> {
    let Some(parent_id) = node.parent_id else {
        return Ok(Vec::new());
    };
    let mut kinds = Vec::new();

    match node_get_tx(conn, parent_id)? {
        None => kinds.push(OrphanKind::MissingParent),
        Some(parent) if node.depth != parent.depth + 1 => kinds.push(OrphanKind::InvalidDepth),
        Some(_) => {}
    }

    if !node.slot.is_some_and(is_child_slot) {
        kinds.push(OrphanKind::InvalidSlot);
    }

    if let Some(slot) = node.slot {
        let shared: i64 = conn.query_row(
            "SELECT COUNT(1) FROM nodes WHERE parent_id=?1 AND slot=?2 AND id<>?3",
            rusqlite::params![parent_id, slot, node.id],
            |row| row.get(0),
        )?;
        if shared > 0 {
            kinds.push(OrphanKind::DuplicateSlot);
        }
    }

    Ok(kinds)
}
