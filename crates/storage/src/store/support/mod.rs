#![forbid(unsafe_code)]

mod audit_tx;
mod node_tx;
mod schema;

pub(super) use audit_tx::*;
pub(super) use node_tx::read::*;
pub(super) use node_tx::write::*;
pub(super) use schema::{ensure_slot_index, migrate_sqlite_schema};
