#![forbid(unsafe_code)]

use super::super::super::{NotFound, StoreError};
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::collections::BTreeMap;
use triage_core::tree::{TreeNode, label_key};
use triage_core::version::VersionInfo;

pub(in crate::store) const NODE_COLUMNS: &str =
    "id, parent_id, depth, slot, label, is_leaf, version, created_at_ms, updated_at_ms";

/// [`NODE_COLUMNS`] qualified with a table alias.
pub(in crate::store) fn node_columns_as(alias: &str) -> String {
    NODE_COLUMNS
        .split(", ")
        .map(|column| format!("{alias}.{column}"))
        .collect::<Vec<_>>()
        .join(", ")
}

pub(in crate::store) fn node_from_row(row: &Row<'_>) -> rusqlite::Result<TreeNode> {
    Ok(TreeNode {
        id: row.get(0)?,
        parent_id: row.get(1)?,
        depth: row.get(2)?,
        slot: row.get(3)?,
        label: row.get(4)?,
        is_leaf: row.get::<_, i64>(5)? != 0,
        version: row.get(6)?,
        created_at_ms: row.get(7)?,
        updated_at_ms: row.get(8)?,
    })
}

pub(in crate::store) fn node_get_tx(
    conn: &Connection,
    node_id: i64,
) -> Result<Option<TreeNode>, StoreError> {
    let node = conn
        .query_row(
            &format!("SELECT {NODE_COLUMNS} FROM nodes WHERE id=?1"),
            params![node_id],
            node_from_row,
        )
        .optional()?;
    Ok(node)
}

pub(in crate::store) fn require_node_tx(
    conn: &Connection,
    node_id: i64,
) -> Result<TreeNode, StoreError> {
    node_get_tx(conn, node_id)?.ok_or(StoreError::NotFound(NotFound::Node(node_id)))
}

pub(in crate::store) fn version_info_tx(
    conn: &Connection,
    node_id: i64,
) -> Result<Option<VersionInfo>, StoreError> {
    let info = conn
        .query_row(
            "SELECT version, updated_at_ms FROM nodes WHERE id=?1",
            params![node_id],
            |row| {
                Ok(VersionInfo {
                    node_id,
                    version: row.get(0)?,
                    updated_at_ms: row.get(1)?,
                })
            },
        )
        .optional()?;
    Ok(info)
}

/// Children in slot order; legacy rows with a null slot sort last.
pub(in crate::store) fn children_of_tx(
    conn: &Connection,
    parent_id: i64,
) -> Result<Vec<TreeNode>, StoreError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {NODE_COLUMNS} FROM nodes WHERE parent_id=?1 \
         ORDER BY slot IS NULL, slot ASC, id ASC"
    ))?;
    let rows = stmt.query_map(params![parent_id], node_from_row)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

/// Slot -> label for children that occupy a proper slot.
pub(in crate::store) fn child_labels_by_slot(children: &[TreeNode]) -> BTreeMap<i64, String> {
    children
        .iter()
        .filter_map(|child| child.slot.map(|slot| (slot, child.label.clone())))
        .collect()
}

pub(in crate::store) fn child_count_tx(conn: &Connection, node_id: i64) -> Result<i64, StoreError> {
    Ok(conn.query_row(
        "SELECT COUNT(1) FROM nodes WHERE parent_id=?1",
        params![node_id],
        |row| row.get(0),
    )?)
}

/// Every node strictly below `node_id`.
pub(in crate::store) fn descendants_tx(
    conn: &Connection,
    node_id: i64,
) -> Result<Vec<TreeNode>, StoreError> {
    let columns = node_columns_as("n");
    let mut stmt = conn.prepare(&format!(
        "WITH RECURSIVE sub(id) AS ( \
           SELECT id FROM nodes WHERE parent_id=?1 \
           UNION \
           SELECT n.id FROM nodes n JOIN sub s ON n.parent_id = s.id \
         ) \
         SELECT {columns} FROM nodes n JOIN sub s ON n.id = s.id \
         ORDER BY n.depth ASC, n.id ASC"
    ))?;
    let rows = stmt.query_map(params![node_id], node_from_row)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

pub(in crate::store) fn is_descendant_tx(
    conn: &Connection,
    ancestor_id: i64,
    candidate_id: i64,
) -> Result<bool, StoreError> {
    let found = conn
        .query_row(
            "WITH RECURSIVE sub(id) AS ( \
               SELECT id FROM nodes WHERE parent_id=?1 \
               UNION \
               SELECT n.id FROM nodes n JOIN sub s ON n.parent_id = s.id \
             ) \
             SELECT 1 FROM sub WHERE id=?2 LIMIT 1",
            params![ancestor_id, candidate_id],
            |_| Ok(()),
        )
        .optional()?;
    Ok(found.is_some())
}

/// Root whose label matches `label` under [`label_key`] comparison.
pub(in crate::store) fn root_with_label_tx(
    conn: &Connection,
    label: &str,
    exclude_id: Option<i64>,
) -> Result<Option<i64>, StoreError> {
    let key = label_key(label);
    Ok(list_roots_tx(conn)?
        .into_iter()
        .find(|root| Some(root.id) != exclude_id && label_key(&root.label) == key)
        .map(|root| root.id))
}

pub(in crate::store) fn list_roots_tx(conn: &Connection) -> Result<Vec<TreeNode>, StoreError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {NODE_COLUMNS} FROM nodes WHERE parent_id IS NULL ORDER BY id ASC"
    ))?;
    let rows = stmt.query_map([], node_from_row)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}
