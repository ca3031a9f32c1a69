#![forbid(unsafe_code)]

mod audit;
mod config;
mod error;
mod materialize;
mod nodes;
mod orphans;
mod requests;
mod support;
mod upsert;
mod versions;

pub use config::*;
pub use error::{ConflictError, ErrorKind, NotFound, StoreError, UndoError, ValidationError};
pub use requests::*;

use rusqlite::{Connection, Transaction, TransactionBehavior};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use support::{ensure_slot_index, migrate_sqlite_schema};
use triage_core::clock::{Clock, SystemClock};

/// Single-database store for the triage tree and its audit ledger.
///
/// One instance owns one connection; mutating calls take `&mut self` and run as
/// exactly one `BEGIN IMMEDIATE` transaction each.
#[derive(Debug)]
pub struct SqliteStore {
    conn: Connection,
    config: StoreConfig,
    clock: Arc<dyn Clock>,
    slot_index_ready: bool,
}

impl SqliteStore {
    pub fn open(storage_dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        Self::open_with(StoreConfig::new(storage_dir), Arc::new(SystemClock))
    }

    pub fn open_with_config(config: StoreConfig) -> Result<Self, StoreError> {
        Self::open_with(config, Arc::new(SystemClock))
    }

    pub fn open_with(config: StoreConfig, clock: Arc<dyn Clock>) -> Result<Self, StoreError> {
        std::fs::create_dir_all(&config.storage_dir)?;

        let conn = Connection::open(config.db_path())?;
        conn.busy_timeout(Duration::from_millis(config.busy_timeout_ms))?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        migrate_sqlite_schema(&conn)?;
        let slot_index_ready = ensure_slot_index(&conn)?;

        tracing::debug!(
            db_path = %config.db_path().display(),
            slot_index_ready,
            "triage store opened"
        );

        Ok(Self {
            conn,
            config,
            clock,
            slot_index_ready,
        })
    }

    pub fn storage_dir(&self) -> &Path {
        &self.config.storage_dir
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Whether sibling slot uniqueness is enforced by the database.
    pub fn slot_index_ready(&self) -> bool {
        self.slot_index_ready
    }

    fn now_ms(&self) -> i64 {
        self.clock.now_ms()
    }

    /// Runs after a committed write, so a failure is logged and left for the next attempt.
    fn retry_slot_index(&mut self) {
        if self.slot_index_ready {
            return;
        }
        match ensure_slot_index(&self.conn) {
            Ok(ready) => {
                self.slot_index_ready = ready;
                if ready {
                    tracing::info!("sibling slot unique index installed after repair");
                }
            }
            Err(err) => {
                tracing::warn!(error = %err, "sibling slot unique index retry failed");
            }
        }
    }
}

/// Write transaction that takes the database write lock up front.
fn begin_write(conn: &mut Connection) -> Result<Transaction<'_>, StoreError> {
    Ok(conn.transaction_with_behavior(TransactionBehavior::Immediate)?)
}
