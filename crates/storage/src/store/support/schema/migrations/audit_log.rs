#![forbid(unsafe_code)]

use super::super::super::super::StoreError;
use rusqlite::Connection;
use std::collections::BTreeSet;

/// Columns added after the first ledger release, with their declarations.
const LATER_COLUMNS: [(&str, &str); 3] = [
    ("group_id", "TEXT"),
    ("severity", "TEXT NOT NULL DEFAULT 'info'"),
    ("tags_json", "TEXT NOT NULL DEFAULT '[]'"),
];

pub(super) fn apply(conn: &Connection) -> Result<(), StoreError> {
    let present = ledger_columns(conn)?;
    for (column, decl) in LATER_COLUMNS {
        if present.contains(column) {
            continue;
        }
        conn.execute(&format!("ALTER TABLE audit_log ADD COLUMN {column} {decl}"), [])?;
        tracing::info!(column, "audit_log column added to legacy ledger");
    }
    Ok(())
}

fn ledger_columns(conn: &Connection) -> Result<BTreeSet<String>, StoreError> {
    let mut stmt = conn.prepare("SELECT name FROM pragma_table_info('audit_log')")?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<Result<BTreeSet<_>, _>>()?;
    Ok(names)
}
