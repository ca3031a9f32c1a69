#![forbid(unsafe_code)]

pub(super) const SQL: &str = r#"

        CREATE TABLE IF NOT EXISTS audit_groups (
          group_id TEXT PRIMARY KEY,
          label TEXT NOT NULL,
          actor TEXT NOT NULL,
          total INTEGER NOT NULL DEFAULT 0,
          completed INTEGER NOT NULL DEFAULT 0,
          failed INTEGER NOT NULL DEFAULT 0,
          status TEXT NOT NULL DEFAULT 'open',
          created_at_ms INTEGER NOT NULL,
          finished_at_ms INTEGER
        );
"#;
