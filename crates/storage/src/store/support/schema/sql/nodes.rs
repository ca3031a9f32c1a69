#![forbid(unsafe_code)]

// `slot` and `depth` carry no CHECK: imported legacy rows may violate the tree
// invariants and must stay readable so orphan detection can report them.
pub(super) const SQL: &str = r#"

        CREATE TABLE IF NOT EXISTS nodes (
          id INTEGER PRIMARY KEY AUTOINCREMENT,
          parent_id INTEGER REFERENCES nodes(id) ON DELETE CASCADE,
          depth INTEGER NOT NULL,
          slot INTEGER,
          label TEXT NOT NULL,
          is_leaf INTEGER NOT NULL DEFAULT 0,
          version INTEGER NOT NULL DEFAULT 1,
          created_at_ms INTEGER NOT NULL,
          updated_at_ms INTEGER NOT NULL
        );
"#;
