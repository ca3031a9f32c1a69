#![forbid(unsafe_code)]

use super::super::support::group_record_item_tx;
use super::super::{BeginGroupRequest, BulkRepairRequest, SqliteStore, StoreError, begin_write};
use triage_core::orphan::{BulkRepairFailure, BulkRepairReport, RepairRequest};

impl SqliteStore {
    /// Repairs each id on its own; one failing item never rolls back another.
    pub fn bulk_repair_orphans(
        &mut self,
        request: BulkRepairRequest,
    ) -> Result<BulkRepairReport, StoreError> {
        let group = self.begin_group(BeginGroupRequest {
            label: format!("bulk orphan repair: {}", request.action.as_str()),
            actor: request.actor.clone(),
        })?;

        let mut succeeded = Vec::new();
        let mut failed = Vec::new();
        for &node_id in &request.node_ids {
            let item = RepairRequest::new(node_id, request.action, request.actor.as_str())
                .params(request.params.clone());
            match self.repair_orphan_grouped(item, Some(&group.group_id)) {
                Ok(outcome) => succeeded.push(outcome),
                Err(err) => {
                    tracing::warn!(
                        group_id = %group.group_id,
                        node_id,
                        code = err.code(),
                        error = %err,
                        "bulk repair item failed"
                    );
                    let tx = begin_write(&mut self.conn)?;
                    group_record_item_tx(&tx, &group.group_id, false)?;
                    tx.commit()?;
                    failed.push(BulkRepairFailure {
                        node_id,
                        error_kind: err.kind().as_str().to_string(),
                        code: err.code().to_string(),
                        message: err.to_string(),
                    });
                }
            }
        }

        let group = self.finish_group(&group.group_id)?;
        tracing::info!(
            group_id = %group.group_id,
            status = group.status.as_str(),
            completed = group.completed,
            failed = group.failed,
            "bulk repair finished"
        );
        Ok(BulkRepairReport {
            group_id: group.group_id,
            action: request.action,
            succeeded,
            failed,
        })
    }
}
