#![forbid(unsafe_code)]

use super::super::support::audit_insert_tx;
use super::super::{SqliteStore, StoreError, begin_write};
use rusqlite::params;
use serde_json::json;
use triage_core::audit::{
    AuditRecord, AuditTarget, OperationKind, RetentionPolicy, RetentionReport,
};

const DAY_MS: i64 = 86_400_000;

impl SqliteStore {
    /// Applies the configured retention policy.
    pub fn prune_audit(&mut self) -> Result<RetentionReport, StoreError> {
        let policy = self.config.retention;
        self.prune_audit_with(policy)
    }

    /// Deletes oldest ledger rows first: everything past `max_age_days`, then
    /// enough rows to bring the ledger (including this run's own entry) down to
    /// `max_rows`. This is the only path that removes ledger rows.
    pub fn prune_audit_with(
        &mut self,
        policy: RetentionPolicy,
    ) -> Result<RetentionReport, StoreError> {
        let now_ms = self.now_ms();
        let tx = begin_write(&mut self.conn)?;
        let mut report = RetentionReport::default();

        if let Some(days) = policy.max_age_days {
            let cutoff_ms = now_ms.saturating_sub(i64::from(days).saturating_mul(DAY_MS));
            report.deleted_by_age = tx.execute(
                "DELETE FROM audit_log WHERE created_at_ms < ?1",
                params![cutoff_ms],
            )? as u64;
        }

        if let Some(max_rows) = policy.max_rows {
            let count = tx.query_row("SELECT COUNT(1) FROM audit_log", [], |row| {
                row.get::<_, i64>(0)
            })? as u64;
            let will_log = report.deleted_by_age > 0 || count > max_rows;
            let projected = count + u64::from(will_log);
            if projected > max_rows {
                let excess = (projected - max_rows).min(count);
                report.deleted_by_count = tx.execute(
                    "DELETE FROM audit_log WHERE id IN ( \
                       SELECT id FROM audit_log ORDER BY created_at_ms ASC, id ASC LIMIT ?1 \
                     )",
                    params![excess as i64],
                )? as u64;
            }
        }

        if report.total() > 0 {
            let record = AuditRecord::new(OperationKind::RetentionPrune, AuditTarget::audit_log())
                .payload(json!({
                    "deleted_by_age": report.deleted_by_age,
                    "deleted_by_count": report.deleted_by_count,
                    "max_age_days": policy.max_age_days,
                    "max_rows": policy.max_rows,
                }));
            audit_insert_tx(&tx, &record, now_ms)?;
        }

        tx.commit()?;
        if report.total() > 0 {
            tracing::info!(
                deleted_by_age = report.deleted_by_age,
                deleted_by_count = report.deleted_by_count,
                "audit retention pruned rows"
            );
        }
        Ok(report)
    }
}
