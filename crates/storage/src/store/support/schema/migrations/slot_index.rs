#![forbid(unsafe_code)]

use super::super::super::super::StoreError;
use crate::store::error::is_constraint_violation;
use rusqlite::Connection;

const CREATE_SLOT_INDEX: &str =
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_nodes_parent_slot_unique ON nodes(parent_id, slot)";

/// Installs the sibling-slot uniqueness index.
///
/// Returns `false` when legacy duplicate slots still block it; the store keeps
/// working and retries after each successful orphan repair.
pub(in crate::store) fn ensure_slot_index(conn: &Connection) -> Result<bool, StoreError> {
    match conn.execute(CREATE_SLOT_INDEX, []) {
        Ok(_) => Ok(true),
        Err(err) if is_constraint_violation(&err) => {
            tracing::warn!(
                error = %err,
                "duplicate sibling slots block the (parent_id, slot) unique index; repair DUPLICATE_SLOT orphans"
            );
            Ok(false)
        }
        Err(err) => Err(StoreError::Sql(err)),
    }
}
