#![forbid(unsafe_code)]

use super::super::support::{group_get_tx, group_record_item_tx};
use super::super::{BeginGroupRequest, SqliteStore, StoreError, ValidationError, begin_write};
use rusqlite::params;
use triage_core::audit::{GroupStatus, OperationGroup};
use uuid::Uuid;

impl SqliteStore {
    pub fn begin_group(&mut self, request: BeginGroupRequest) -> Result<OperationGroup, StoreError> {
        let label = request.label.trim();
        if label.is_empty() {
            return Err(StoreError::Validation(ValidationError::Invalid(
                "group label must not be empty",
            )));
        }
        let group_id = Uuid::new_v4().to_string();
        let now_ms = self.now_ms();

        let tx = begin_write(&mut self.conn)?;
        tx.execute(
            "INSERT INTO audit_groups(group_id, label, actor, status, created_at_ms) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                group_id,
                label,
                request.actor,
                GroupStatus::Open.as_str(),
                now_ms
            ],
        )?;
        let group = group_get_tx(&tx, &group_id)?;
        tx.commit()?;
        tracing::debug!(group_id = %group.group_id, label = %group.label, "operation group opened");
        Ok(group)
    }

    /// Counts one finished item against an open group.
    pub fn record_group_item(
        &mut self,
        group_id: &str,
        success: bool,
    ) -> Result<OperationGroup, StoreError> {
        let tx = begin_write(&mut self.conn)?;
        group_record_item_tx(&tx, group_id, success)?;
        let group = group_get_tx(&tx, group_id)?;
        tx.commit()?;
        Ok(group)
    }

    /// Settles the terminal status from the counters. Finishing twice is a no-op.
    pub fn finish_group(&mut self, group_id: &str) -> Result<OperationGroup, StoreError> {
        let now_ms = self.now_ms();
        let tx = begin_write(&mut self.conn)?;
        let group = group_get_tx(&tx, group_id)?;
        if group.status != GroupStatus::Open {
            return Ok(group);
        }
        let status = GroupStatus::settle(group.completed, group.failed);
        tx.execute(
            "UPDATE audit_groups SET status=?2, finished_at_ms=?3 WHERE group_id=?1",
            params![group_id, status.as_str(), now_ms],
        )?;
        let group = group_get_tx(&tx, group_id)?;
        tx.commit()?;
        Ok(group)
    }

    pub fn get_group(&self, group_id: &str) -> Result<OperationGroup, StoreError> {
        group_get_tx(&self.conn, group_id)
    }
}
