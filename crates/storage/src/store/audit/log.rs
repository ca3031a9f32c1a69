#![forbid(unsafe_code)]

use super::super::support::{AUDIT_COLUMNS, audit_get_tx, audit_insert_tx, raw_audit_from_row};
use super::super::{SqliteStore, StoreError, begin_write};
use rusqlite::params;
use triage_core::audit::{AuditEntry, AuditQuery, AuditRecord};

const DEFAULT_LIST_LIMIT: usize = 100;
const MAX_LIST_LIMIT: usize = 1_000;

impl SqliteStore {
    /// Appends a standalone ledger row. Mutators write theirs inside their own transaction.
    pub fn log_operation(&mut self, record: AuditRecord) -> Result<i64, StoreError> {
        let now_ms = self.now_ms();
        let tx = begin_write(&mut self.conn)?;
        let id = audit_insert_tx(&tx, &record, now_ms)?;
        tx.commit()?;
        Ok(id)
    }

    pub fn get_audit_entry(&self, entry_id: i64) -> Result<AuditEntry, StoreError> {
        audit_get_tx(&self.conn, entry_id)
    }

    /// Newest first.
    pub fn list_audit(&self, query: &AuditQuery) -> Result<Vec<AuditEntry>, StoreError> {
        let limit = match query.limit {
            0 => DEFAULT_LIST_LIMIT,
            limit => limit.min(MAX_LIST_LIMIT),
        };
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {AUDIT_COLUMNS} FROM audit_log \
             WHERE (?1 IS NULL OR target_id=?1) \
               AND (?2 IS NULL OR operation=?2) \
               AND (?3 IS NULL OR group_id=?3) \
             ORDER BY created_at_ms DESC, id DESC \
             LIMIT ?4"
        ))?;
        let rows = stmt.query_map(
            params![
                query.target_id,
                query.operation.map(|operation| operation.as_str()),
                query.group_id,
                limit as i64
            ],
            raw_audit_from_row,
        )?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?.into_entry()?);
        }
        Ok(out)
    }
}
