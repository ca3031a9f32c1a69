#![forbid(unsafe_code)]

use serde::Serialize;
use triage_core::orphan::{RepairAction, RepairParams};
use triage_core::tree::ChildInput;
use triage_core::version::ExpectedVersion;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CreateRootRequest {
    pub label: String,
    pub actor: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UpdateLabelRequest {
    pub node_id: i64,
    pub label: String,
    pub expected_version: Option<ExpectedVersion>,
    pub actor: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeleteSubtreeRequest {
    pub node_id: i64,
    pub expected_version: Option<ExpectedVersion>,
    pub actor: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DeleteSubtreeResult {
    pub node_id: i64,
    pub deleted_rows: u64,
    pub parent_version: Option<i64>,
    pub audit_id: i64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UpsertChildrenRequest {
    pub parent_id: i64,
    pub expected_version: Option<ExpectedVersion>,
    pub children: Vec<ChildInput>,
    pub actor: String,
    pub group_id: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BeginGroupRequest {
    pub label: String,
    pub actor: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BulkRepairRequest {
    pub node_ids: Vec<i64>,
    pub action: RepairAction,
    pub params: RepairParams,
    pub actor: String,
}
