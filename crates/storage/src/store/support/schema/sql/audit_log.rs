#![forbid(unsafe_code)]

pub(super) const SQL: &str = r#"

        CREATE TABLE IF NOT EXISTS audit_log (
          id INTEGER PRIMARY KEY AUTOINCREMENT,
          operation TEXT NOT NULL,
          target_id TEXT NOT NULL,
          target_type TEXT NOT NULL,
          actor TEXT NOT NULL,
          context_json TEXT,
          payload_json TEXT NOT NULL,
          undo_data_json TEXT,
          is_undoable INTEGER NOT NULL DEFAULT 0,
          undo_timeout_seconds INTEGER,
          requires_confirmation INTEGER NOT NULL DEFAULT 0,
          undone_by TEXT,
          undone_at_ms INTEGER,
          undo_reason TEXT,
          group_id TEXT,
          severity TEXT NOT NULL DEFAULT 'info',
          tags_json TEXT NOT NULL DEFAULT '[]',
          created_at_ms INTEGER NOT NULL
        );
"#;

// Installed after migrations, once legacy tables carry every listed column.
pub(super) const TRIGGERS: &str = r#"

        -- Rows are append-only: only the undo markers may be written after insert.
        CREATE TRIGGER IF NOT EXISTS audit_log_append_only
        BEFORE UPDATE OF id, operation, target_id, target_type, actor, context_json,
          payload_json, undo_data_json, is_undoable, undo_timeout_seconds,
          requires_confirmation, group_id, severity, tags_json, created_at_ms
        ON audit_log
        BEGIN
          SELECT RAISE(ABORT, 'audit_log rows are append-only');
        END;

        CREATE TRIGGER IF NOT EXISTS audit_log_undo_once
        BEFORE UPDATE OF undone_by, undone_at_ms, undo_reason ON audit_log
        WHEN OLD.undone_at_ms IS NOT NULL
        BEGIN
          SELECT RAISE(ABORT, 'audit_log entry already undone');
        END;
"#;
