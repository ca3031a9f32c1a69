#![forbid(unsafe_code)]

use std::path::{Path, PathBuf};
use triage_core::audit::RetentionPolicy;

pub const DB_FILE_NAME: &str = "triage_tree.db";

const STORAGE_DIR_ENV: &str = "TRIAGE_STORAGE_DIR";
const BUSY_TIMEOUT_ENV: &str = "TRIAGE_BUSY_TIMEOUT_MS";
const AUDIT_MAX_AGE_DAYS_ENV: &str = "TRIAGE_AUDIT_MAX_AGE_DAYS";
const AUDIT_MAX_ROWS_ENV: &str = "TRIAGE_AUDIT_MAX_ROWS";

const DEFAULT_STORAGE_DIR: &str = ".triage";
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_AUDIT_MAX_AGE_DAYS: u32 = 365;
const DEFAULT_AUDIT_MAX_ROWS: u64 = 100_000;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoreConfig {
    pub storage_dir: PathBuf,
    pub busy_timeout_ms: u64,
    pub retention: RetentionPolicy,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            storage_dir: PathBuf::from(DEFAULT_STORAGE_DIR),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            retention: RetentionPolicy {
                max_age_days: Some(DEFAULT_AUDIT_MAX_AGE_DAYS),
                max_rows: Some(DEFAULT_AUDIT_MAX_ROWS),
            },
        }
    }
}

impl StoreConfig {
    pub fn new(storage_dir: impl AsRef<Path>) -> Self {
        Self {
            storage_dir: storage_dir.as_ref().to_path_buf(),
            ..Self::default()
        }
    }

    /// Defaults overridden by `TRIAGE_*` variables; unparseable values are ignored.
    /// A retention limit of `0` disables that limit.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let storage_dir =
            parse_path_env(lookup(STORAGE_DIR_ENV)).unwrap_or(defaults.storage_dir);
        let busy_timeout_ms = parse_u64_env(BUSY_TIMEOUT_ENV, lookup(BUSY_TIMEOUT_ENV))
            .unwrap_or(defaults.busy_timeout_ms);
        let max_age_days = match parse_u64_env(
            AUDIT_MAX_AGE_DAYS_ENV,
            lookup(AUDIT_MAX_AGE_DAYS_ENV),
        ) {
            Some(0) => None,
            Some(days) => Some(u32::try_from(days).unwrap_or(u32::MAX)),
            None => defaults.retention.max_age_days,
        };
        let max_rows = match parse_u64_env(AUDIT_MAX_ROWS_ENV, lookup(AUDIT_MAX_ROWS_ENV)) {
            Some(0) => None,
            Some(rows) => Some(rows),
            None => defaults.retention.max_rows,
        };
        Self {
            storage_dir,
            busy_timeout_ms,
            retention: RetentionPolicy {
                max_age_days,
                max_rows,
            },
        }
    }

    pub fn busy_timeout_ms(mut self, value: u64) -> Self {
        self.busy_timeout_ms = value;
        self
    }

    pub fn retention(mut self, retention: RetentionPolicy) -> Self {
        self.retention = retention;
        self
    }

    pub fn db_path(&self) -> PathBuf {
        self.storage_dir.join(DB_FILE_NAME)
    }
}

fn parse_path_env(raw: Option<String>) -> Option<PathBuf> {
    let raw = raw?;
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(PathBuf::from(trimmed))
}

fn parse_u64_env(key: &str, raw: Option<String>) -> Option<u64> {
    let raw = raw?;
    match raw.trim().parse::<u64>() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring unparseable configuration value");
            None
        }
    }
}
