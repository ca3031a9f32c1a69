#![forbid(unsafe_code)]

use super::support::version_info_tx;
use super::{ConflictError, NotFound, SqliteStore, StoreError};
use triage_core::version::{ExpectedVersion, VersionCheck, VersionInfo, create_etag};

impl SqliteStore {
    pub fn get_version(&self, node_id: i64) -> Result<VersionInfo, StoreError> {
        version_info_tx(&self.conn, node_id)?.ok_or(StoreError::NotFound(NotFound::Node(node_id)))
    }

    pub fn create_etag(&self, info: &VersionInfo) -> String {
        create_etag(info)
    }

    /// Compares a client precondition against the stored version without locking.
    ///
    /// An unknown node is not an error here: the check reports `matches = false`
    /// with no current version.
    pub fn check_version_match(
        &self,
        node_id: i64,
        expected: ExpectedVersion,
    ) -> Result<VersionCheck, StoreError> {
        let current = version_info_tx(&self.conn, node_id)?;
        let matches = current
            .as_ref()
            .is_some_and(|current| expected.matches(current));
        if !matches {
            tracing::debug!(node_id, expected = ?expected, current = ?current, "version precondition failed");
        }
        Ok(VersionCheck {
            matches,
            current_etag: current.as_ref().map(create_etag),
            expected,
            current,
        })
    }

    pub fn check_version(
        &self,
        node_id: i64,
        expected: ExpectedVersion,
    ) -> Result<VersionCheck, StoreError> {
        self.check_version_match(node_id, expected)
    }
}

/// Enforces an optional client precondition inside a write transaction.
pub(super) fn ensure_expected_tx(
    conn: &rusqlite::Connection,
    node_id: i64,
    expected: Option<&ExpectedVersion>,
) -> Result<VersionInfo, StoreError> {
    let current =
        version_info_tx(conn, node_id)?.ok_or(StoreError::NotFound(NotFound::Node(node_id)))?;
    if let Some(expected) = expected
        && !expected.matches(&current)
    {
        tracing::warn!(node_id, expected = ?expected, actual = current.version, "stale version rejected");
        return Err(StoreError::Conflict(ConflictError::VersionMismatch {
            node_id,
            expected: expected.claimed_version().unwrap_or(-1),
            actual: current.version,
        }));
    }
    Ok(current)
}
