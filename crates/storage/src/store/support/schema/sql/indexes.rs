#![forbid(unsafe_code)]

// The (parent_id, slot) unique index is not listed here: legacy duplicates may
// block it, so it is installed separately and retried after repairs.
pub(super) const SQL: &str = r#"

        CREATE INDEX IF NOT EXISTS idx_nodes_parent ON nodes(parent_id, slot);
        CREATE INDEX IF NOT EXISTS idx_nodes_depth ON nodes(depth);
        CREATE INDEX IF NOT EXISTS idx_audit_log_created ON audit_log(created_at_ms, id);
        CREATE INDEX IF NOT EXISTS idx_audit_log_target ON audit_log(target_id, id);
        CREATE INDEX IF NOT EXISTS idx_audit_log_group ON audit_log(group_id, id);
"#;
