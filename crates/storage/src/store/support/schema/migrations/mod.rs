#![forbid(unsafe_code)]

mod audit_log;
mod slot_index;

use super::super::super::StoreError;
use rusqlite::Connection;

pub(in crate::store) use slot_index::ensure_slot_index;

pub(super) fn apply(conn: &Connection) -> Result<(), StoreError> {
    audit_log::apply(conn)?;
    Ok(())
}
