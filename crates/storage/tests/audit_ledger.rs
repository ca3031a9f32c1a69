#![forbid(unsafe_code)]

use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use triage_core::audit::{
    AuditQuery, AuditRecord, AuditTarget, GroupStatus, OperationKind, RetentionPolicy,
    Severity, UndoPayload, UndoRequest,
};
use triage_core::clock::ManualClock;
use triage_core::tree::TreeNode;
use triage_storage::{
    BeginGroupRequest, CreateRootRequest, DeleteSubtreeRequest, ErrorKind, SqliteStore,
    StoreConfig, StoreError,
};

const T0: i64 = 1_700_000_000_000;
const DAY_SECS: i64 = 86_400;

fn temp_dir(test_name: &str) -> PathBuf {
    let base = std::env::temp_dir();
    let pid = std::process::id();
    let nonce = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    let dir = base.join(format!("triage_storage_{test_name}_{pid}_{nonce}"));
    std::fs::create_dir_all(&dir).expect("create temp dir");
    dir
}

fn open_at(storage_dir: &Path, clock: &ManualClock) -> SqliteStore {
    SqliteStore::open_with(StoreConfig::new(storage_dir), Arc::new(clock.clone()))
        .expect("open store")
}

fn open(test_name: &str) -> (SqliteStore, ManualClock) {
    let clock = ManualClock::new(T0);
    let store = open_at(&temp_dir(test_name), &clock);
    (store, clock)
}

fn root(store: &mut SqliteStore, label: &str) -> TreeNode {
    store
        .create_root(CreateRootRequest {
            label: label.to_string(),
            actor: "author".to_string(),
        })
        .expect("create root")
}

fn relabel_record(node_id: i64, previous_label: &str) -> AuditRecord {
    AuditRecord::new(OperationKind::NodeUpdate, AuditTarget::node(node_id))
        .actor("importer")
        .undo_data(UndoPayload::NodeUpdate {
            node_id,
            previous_label: previous_label.to_string(),
        })
}

fn undo_code(store: &mut SqliteStore, entry_id: i64) -> &'static str {
    let err: StoreError = store
        .undo_operation(UndoRequest::new(entry_id, "reviewer").confirmed())
        .expect_err("undo rejected");
    err.code()
}

#[test]
fn undo_window_includes_its_deadline() {
    let (mut store, clock) = open("undo_window_includes_its_deadline");
    let node = root(&mut store, "Cough");

    let first = store
        .log_operation(relabel_record(node.id, "Dry cough").undo_timeout_seconds(60))
        .expect("log");
    let second = store
        .log_operation(relabel_record(node.id, "Wet cough").undo_timeout_seconds(60))
        .expect("log");
    assert_eq!(
        store.get_audit_entry(first).expect("entry").undo_timeout_seconds,
        Some(60)
    );

    clock.advance_secs(59);
    let undone = store
        .undo_operation(UndoRequest::new(first, "reviewer").reason("typo"))
        .expect("inside window");
    assert_eq!(undone.operation, OperationKind::NodeUpdate);
    assert_eq!(store.get_node(node.id).expect("node").label, "Dry cough");

    let entry = store.get_audit_entry(first).expect("entry");
    assert_eq!(entry.undone_by.as_deref(), Some("reviewer"));
    assert_eq!(entry.undo_reason.as_deref(), Some("typo"));
    assert_eq!(entry.undone_at_ms, Some(T0 + 59_000));

    clock.advance_secs(2);
    let err = store
        .undo_operation(UndoRequest::new(second, "reviewer"))
        .expect_err("window closed");
    assert_eq!(err.kind(), ErrorKind::Undo);
    assert_eq!(err.code(), "undo_timeout_expired");
    assert_eq!(err.status(), 409);
    assert_eq!(store.get_node(node.id).expect("node").label, "Dry cough");
}

#[test]
fn policy_timeouts_cannot_be_widened() {
    let (mut store, _clock) = open("policy_timeouts_cannot_be_widened");
    let node = root(&mut store, "Rash");
    let id = store
        .log_operation(relabel_record(node.id, "Itchy rash").undo_timeout_seconds(86_400))
        .expect("log");
    assert_eq!(
        store.get_audit_entry(id).expect("entry").undo_timeout_seconds,
        Some(3600)
    );
}

#[test]
fn undo_rejections_follow_a_fixed_order() {
    let (mut store, clock) = open("undo_rejections_follow_a_fixed_order");
    let node = root(&mut store, "Headache");

    assert_eq!(undo_code(&mut store, 9_999), "audit_entry_not_found");

    let scratch = root(&mut store, "Scratch");
    let deleted = store
        .delete_subtree(DeleteSubtreeRequest {
            node_id: scratch.id,
            expected_version: None,
            actor: "author".to_string(),
        })
        .expect("delete");
    assert_eq!(undo_code(&mut store, deleted.audit_id), "not_undoable");

    let bare = store
        .log_operation(AuditRecord::new(
            OperationKind::NodeUpdate,
            AuditTarget::node(node.id),
        ))
        .expect("log");
    assert_eq!(undo_code(&mut store, bare), "no_undo_data");

    // Inverse data for another operation kind is not applied.
    let mismatched = store
        .log_operation(
            AuditRecord::new(OperationKind::NodeCreate, AuditTarget::node(node.id)).undo_data(
                UndoPayload::NodeUpdate {
                    node_id: node.id,
                    previous_label: "Migraine".to_string(),
                },
            ),
        )
        .expect("log");
    assert_eq!(undo_code(&mut store, mismatched), "no_undo_data");
    assert_eq!(store.get_node(node.id).expect("node").label, "Headache");

    let entry = store
        .log_operation(relabel_record(node.id, "Migraine").undo_timeout_seconds(10))
        .expect("log");
    store
        .undo_operation(UndoRequest::new(entry, "reviewer"))
        .expect("first undo");
    assert_eq!(undo_code(&mut store, entry), "already_undone");

    // Already-undone wins over an expired window.
    clock.advance_secs(60);
    assert_eq!(undo_code(&mut store, entry), "already_undone");
}

#[test]
fn undo_writes_its_own_ledger_row() {
    let (mut store, _clock) = open("undo_writes_its_own_ledger_row");
    let node = root(&mut store, "Nausea");
    let created = store
        .list_audit(&AuditQuery {
            target_id: Some(node.id.to_string()),
            ..AuditQuery::default()
        })
        .expect("list");
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].operation, "node_create");

    let result = store
        .undo_operation(UndoRequest::new(created[0].id, "reviewer"))
        .expect("undo create");
    assert!(store.get_node(node.id).is_err());

    let undo_entry = store.get_audit_entry(result.undo_entry_id).expect("undo entry");
    assert_eq!(undo_entry.operation, "undo");
    assert_eq!(undo_entry.target_type, "audit_entry");
    assert_eq!(undo_entry.target_id, created[0].id.to_string());
    assert_eq!(undo_entry.payload["undone_entry_id"], created[0].id);
    assert!(!undo_entry.is_undoable);
    assert_eq!(undo_code(&mut store, result.undo_entry_id), "not_undoable");
}

#[test]
fn ledger_rows_are_append_only() {
    let dir = temp_dir("ledger_rows_are_append_only");
    let clock = ManualClock::new(T0);
    let mut store = open_at(&dir, &clock);
    let node = root(&mut store, "Fatigue");
    let entry = store
        .log_operation(relabel_record(node.id, "Tiredness"))
        .expect("log");

    let conn = Connection::open(dir.join("triage_tree.db")).expect("raw connection");
    let rewrite = conn.execute(
        "UPDATE audit_log SET payload_json='{}' WHERE id=?1",
        [entry],
    );
    assert!(rewrite.is_err());
    let reassign = conn.execute("UPDATE audit_log SET actor='mallory' WHERE id=?1", [entry]);
    assert!(reassign.is_err());

    store
        .undo_operation(UndoRequest::new(entry, "reviewer"))
        .expect("undo");
    let second_mark = conn.execute(
        "UPDATE audit_log SET undone_at_ms=?2, undone_by='mallory' WHERE id=?1",
        [entry, T0 + 1],
    );
    assert!(second_mark.is_err());
    let stored = store.get_audit_entry(entry).expect("entry");
    assert_eq!(stored.undone_by.as_deref(), Some("reviewer"));
    assert_eq!(stored.actor, "importer");
}

#[test]
fn retention_prunes_by_age_then_by_count() {
    let (mut store, clock) = open("retention_prunes_by_age_then_by_count");
    for label in ["A", "B", "C"] {
        root(&mut store, label);
    }
    clock.advance_secs(10 * DAY_SECS);
    for label in ["D", "E", "F", "G"] {
        root(&mut store, label);
    }

    let noop = store
        .prune_audit_with(RetentionPolicy {
            max_age_days: Some(30),
            max_rows: Some(100),
        })
        .expect("noop prune");
    assert_eq!(noop.total(), 0);
    assert_eq!(store.list_audit(&AuditQuery::default()).expect("list").len(), 7);

    let by_age = store
        .prune_audit_with(RetentionPolicy {
            max_age_days: Some(5),
            max_rows: None,
        })
        .expect("prune by age");
    assert_eq!((by_age.deleted_by_age, by_age.deleted_by_count), (3, 0));

    let remaining = store.list_audit(&AuditQuery::default()).expect("list");
    assert_eq!(remaining.len(), 5);
    assert_eq!(remaining[0].operation, "retention_prune");
    assert_eq!(remaining[0].payload["deleted_by_age"], 3);

    // Five rows, cap of three: the prune row itself counts toward the cap.
    let by_count = store
        .prune_audit_with(RetentionPolicy {
            max_age_days: None,
            max_rows: Some(3),
        })
        .expect("prune by count");
    assert_eq!(by_count.deleted_by_count, 3);
    let remaining = store.list_audit(&AuditQuery::default()).expect("list");
    assert_eq!(remaining.len(), 3);
    assert_eq!(
        remaining.iter().map(|e| e.operation.as_str()).collect::<Vec<_>>(),
        vec!["retention_prune", "retention_prune", "node_create"]
    );
}

#[test]
fn configured_retention_applies_through_prune_audit() {
    let dir = temp_dir("configured_retention_applies_through_prune_audit");
    let clock = ManualClock::new(T0);
    let mut store = SqliteStore::open_with(
        StoreConfig::new(&dir).retention(RetentionPolicy {
            max_age_days: None,
            max_rows: Some(2),
        }),
        Arc::new(clock.clone()),
    )
    .expect("open store");
    for label in ["A", "B", "C", "D"] {
        root(&mut store, label);
    }
    let report = store.prune_audit().expect("prune");
    assert_eq!(report.deleted_by_count, 3);
    assert_eq!(store.list_audit(&AuditQuery::default()).expect("list").len(), 2);
}

#[test]
fn groups_track_counters_and_settle_once() {
    let (mut store, _clock) = open("groups_track_counters_and_settle_once");

    let err = store
        .begin_group(BeginGroupRequest {
            label: "   ".to_string(),
            actor: "curator".to_string(),
        })
        .expect_err("blank label");
    assert_eq!(err.status(), 422);

    let group = store
        .begin_group(BeginGroupRequest {
            label: "nightly import".to_string(),
            actor: "curator".to_string(),
        })
        .expect("begin");
    assert_eq!(group.status, GroupStatus::Open);
    assert_eq!((group.total, group.completed, group.failed), (0, 0, 0));

    store.record_group_item(&group.group_id, true).expect("item");
    store.record_group_item(&group.group_id, true).expect("item");
    let counted = store.record_group_item(&group.group_id, false).expect("item");
    assert_eq!((counted.total, counted.completed, counted.failed), (3, 2, 1));

    let finished = store.finish_group(&group.group_id).expect("finish");
    assert_eq!(finished.status, GroupStatus::Partial);
    let finished_at = finished.finished_at_ms;
    assert!(finished_at.is_some());

    let again = store.finish_group(&group.group_id).expect("finish twice");
    assert_eq!(again.status, GroupStatus::Partial);
    assert_eq!(again.finished_at_ms, finished_at);

    let err = store
        .record_group_item(&group.group_id, true)
        .expect_err("closed group");
    assert_eq!(err.status(), 422);

    let err = store.get_group("no-such-group").expect_err("unknown");
    assert_eq!(err.code(), "group_not_found");

    let clean = store
        .begin_group(BeginGroupRequest {
            label: "empty".to_string(),
            actor: "curator".to_string(),
        })
        .expect("begin");
    assert_eq!(
        store.finish_group(&clean.group_id).expect("finish").status,
        GroupStatus::Completed
    );
}

#[test]
fn list_audit_filters_and_limits() {
    let (mut store, clock) = open("list_audit_filters_and_limits");
    let a = root(&mut store, "Vertigo");
    clock.advance_ms(1);
    let b = root(&mut store, "Tinnitus");
    clock.advance_ms(1);
    store
        .log_operation(relabel_record(a.id, "Dizziness").tags(["Import", "import ", "legacy"]))
        .expect("log");

    let all = store.list_audit(&AuditQuery::default()).expect("list");
    assert_eq!(all.len(), 3);
    assert_eq!(all[0].operation, "node_update");
    assert_eq!(all[0].tags, vec!["import".to_string(), "legacy".to_string()]);

    let creates = store
        .list_audit(&AuditQuery {
            operation: Some(OperationKind::NodeCreate),
            ..AuditQuery::default()
        })
        .expect("list");
    assert_eq!(
        creates.iter().map(|e| e.target_id.clone()).collect::<Vec<_>>(),
        vec![b.id.to_string(), a.id.to_string()]
    );

    let for_a = store
        .list_audit(&AuditQuery {
            target_id: Some(a.id.to_string()),
            limit: 1,
            ..AuditQuery::default()
        })
        .expect("list");
    assert_eq!(for_a.len(), 1);
    assert_eq!(for_a[0].operation, "node_update");
}

#[test]
fn concurrent_handles_serialize_writes() {
    let dir = temp_dir("concurrent_handles_serialize_writes");
    let clock = ManualClock::new(T0);
    let first = open_at(&dir, &clock);
    let second = open_at(&dir, &clock);

    let handles = [(first, "left"), (second, "right")]
        .into_iter()
        .map(|(mut store, prefix)| {
            std::thread::spawn(move || {
                for i in 0..10 {
                    store
                        .create_root(CreateRootRequest {
                            label: format!("{prefix} {i}"),
                            actor: prefix.to_string(),
                        })
                        .expect("create root under contention");
                }
                store
            })
        })
        .collect::<Vec<_>>();
    let stores = handles
        .into_iter()
        .map(|handle| handle.join().expect("writer thread"))
        .collect::<Vec<_>>();

    let reader = &stores[0];
    assert_eq!(reader.list_roots().expect("roots").len(), 20);
    let creates = reader
        .list_audit(&AuditQuery {
            operation: Some(OperationKind::NodeCreate),
            ..AuditQuery::default()
        })
        .expect("list");
    assert_eq!(creates.len(), 20);
}

#[test]
fn legacy_ledgers_gain_grouping_and_tag_columns() {
    let dir = temp_dir("legacy_ledgers_gain_grouping_and_tag_columns");
    {
        let conn = Connection::open(dir.join("triage_tree.db")).expect("raw connection");
        conn.execute_batch(
            "CREATE TABLE audit_log (
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
               created_at_ms INTEGER NOT NULL
             );
             INSERT INTO audit_log(operation, target_id, target_type, actor, payload_json, created_at_ms)
             VALUES ('node_delete', '9', 'node', 'importer', '{}', 1);",
        )
        .expect("seed legacy ledger");
    }

    let clock = ManualClock::new(T0);
    let mut store = open_at(&dir, &clock);
    let legacy = store.get_audit_entry(1).expect("legacy entry");
    assert_eq!(legacy.severity, Severity::Info);
    assert!(legacy.tags.is_empty());
    assert_eq!(legacy.group_id, None);

    let group = store
        .begin_group(BeginGroupRequest {
            label: "legacy import".to_string(),
            actor: "importer".to_string(),
        })
        .expect("group");
    let id = store
        .log_operation(
            relabel_record(9, "Old")
                .severity(Severity::Warning)
                .tags(["import"])
                .group(Some(group.group_id.clone())),
        )
        .expect("log");
    let entry = store.get_audit_entry(id).expect("entry");
    assert_eq!(entry.severity, Severity::Warning);
    assert_eq!(entry.tags, vec!["import".to_string()]);
    assert_eq!(entry.group_id.as_deref(), Some(group.group_id.as_str()));
    drop(store);

    // Reopening finds every column already present.
    let store = open_at(&dir, &clock);
    assert_eq!(store.get_audit_entry(id).expect("entry").tags, vec!["import".to_string()]);
}
