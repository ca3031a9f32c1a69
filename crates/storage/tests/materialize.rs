#![forbid(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;
use triage_core::audit::UndoRequest;
use triage_core::clock::ManualClock;
use triage_core::materialize::{MaterializeRequest, MaterializeScope};
use triage_core::tree::{ChildInput, TreeNode};
use triage_storage::{
    CreateRootRequest, DeleteSubtreeRequest, SqliteStore, StoreConfig, UpdateLabelRequest,
    UpsertChildrenRequest,
};

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

fn open(test_name: &str) -> (SqliteStore, ManualClock) {
    let clock = ManualClock::new(1_700_000_000_000);
    let store = SqliteStore::open_with(
        StoreConfig::new(temp_dir(test_name)),
        Arc::new(clock.clone()),
    )
    .expect("open store");
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

fn fill(store: &mut SqliteStore, parent_id: i64, labels: [&str; 5]) -> Vec<i64> {
    store
        .upsert_children(UpsertChildrenRequest {
            parent_id,
            expected_version: None,
            children: labels
                .iter()
                .enumerate()
                .map(|(index, label)| ChildInput::new(index as i64 + 1, *label))
                .collect(),
            actor: "author".to_string(),
            group_id: None,
        })
        .expect("upsert")
        .updated_ids
}

const PLACEHOLDERS: [&str; 5] = ["Slot 1", "Slot 2", "Slot 3", "Slot 4", "Slot 5"];

fn child_slots(store: &SqliteStore, parent_id: i64) -> Vec<Option<i64>> {
    store
        .read_children_with_version(parent_id)
        .expect("read")
        .children
        .into_iter()
        .map(|child| child.slot)
        .collect()
}

#[test]
fn explicit_scope_fills_parent_to_five() {
    let (mut store, _clock) = open("explicit_scope_fills_parent_to_five");
    let parent = root(&mut store, "Abdominal pain");

    let report = store
        .materialize(MaterializeRequest::new(
            MaterializeScope::Parents(vec![parent.id]),
            "author",
        ))
        .expect("materialize");
    assert_eq!(report.added, 5);
    assert_eq!(report.filled, 1);
    assert_eq!(report.pruned, 0);
    assert_eq!(report.samples.added.len(), 3);
    assert!(report.audit_id.is_some());

    let snapshot = store.read_children_with_version(parent.id).expect("read");
    assert!(snapshot.missing_slots.is_empty());
    assert_eq!(
        snapshot.children.iter().map(|c| c.slot).collect::<Vec<_>>(),
        vec![Some(1), Some(2), Some(3), Some(4), Some(5)]
    );
    assert_eq!(snapshot.children[2].label, "Slot 3");
    assert_eq!(snapshot.version, parent.version + 1);
}

#[test]
fn materialize_all_is_idempotent() {
    let (mut store, _clock) = open("materialize_all_is_idempotent");
    let parent = root(&mut store, "Back pain");
    let ids = fill(&mut store, parent.id, ["Lower", "Upper", "Trauma", "Fever", "Numbness"]);
    for id in [ids[1], ids[3]] {
        store
            .delete_subtree(DeleteSubtreeRequest {
                node_id: id,
                expected_version: None,
                actor: "author".to_string(),
            })
            .expect("delete");
    }
    assert_eq!(child_slots(&store, parent.id), vec![Some(1), Some(3), Some(5)]);

    let first = store
        .materialize(MaterializeRequest::new(MaterializeScope::All, "author"))
        .expect("first run");
    assert_eq!(first.added, 2);
    assert_eq!(first.kept, 3);
    assert_eq!(first.pruned, 0);

    let second = store
        .materialize(MaterializeRequest::new(MaterializeScope::All, "author"))
        .expect("second run");
    assert_eq!(second.added, 0);
    assert_eq!(second.pruned, 0);
    assert_eq!(second.kept, 5);
    assert!(second.audit_id.is_none());
}

#[test]
fn incomplete_placeholder_children_are_pruned_with_their_subtrees() {
    let (mut store, _clock) =
        open("incomplete_placeholder_children_are_pruned_with_their_subtrees");
    let parent = root(&mut store, "Syncope");
    let ids = fill(&mut store, parent.id, PLACEHOLDERS);
    fill(&mut store, ids[0], PLACEHOLDERS);
    store
        .delete_subtree(DeleteSubtreeRequest {
            node_id: ids[4],
            expected_version: None,
            actor: "author".to_string(),
        })
        .expect("delete");

    let report = store
        .materialize(MaterializeRequest::new(
            MaterializeScope::Parents(vec![parent.id, ids[0]]),
            "author",
        ))
        .expect("materialize");
    assert_eq!(report.pruned, 1);
    assert_eq!(report.pruned_rows, 9);
    assert_eq!(report.skipped, 1);
    assert_eq!(report.added, 0);
    assert!(child_slots(&store, parent.id).is_empty());
}

#[test]
fn completed_parent_survives_repeated_runs() {
    let (mut store, _clock) = open("completed_parent_survives_repeated_runs");
    let parent = root(&mut store, "Dizziness");
    let explicit = || MaterializeRequest::new(MaterializeScope::Parents(vec![parent.id]), "author");

    let first = store.materialize(explicit()).expect("first run");
    assert_eq!((first.added, first.pruned), (5, 0));

    let all = store
        .materialize(MaterializeRequest::new(MaterializeScope::All, "author"))
        .expect("all parents");
    assert_eq!((all.added, all.pruned, all.kept), (0, 0, 5));
    assert!(all.audit_id.is_none());

    let again = store.materialize(explicit()).expect("repeat explicit");
    assert_eq!((again.added, again.pruned, again.kept), (0, 0, 5));

    let snapshot = store.read_children_with_version(parent.id).expect("read");
    assert_eq!(snapshot.children.len(), 5);
    assert!(snapshot.missing_slots.is_empty());
}

#[test]
fn real_descendants_block_pruning() {
    let (mut store, _clock) = open("real_descendants_block_pruning");
    let parent = root(&mut store, "Palpitations");
    let ids = fill(&mut store, parent.id, PLACEHOLDERS);
    fill(&mut store, ids[2], ["Exercise", "Rest", "Night", "Caffeine", "Stress"]);

    let report = store
        .materialize(MaterializeRequest::new(
            MaterializeScope::Parents(vec![parent.id]),
            "author",
        ))
        .expect("materialize");
    assert_eq!(report.pruned, 0);
    assert_eq!(report.kept, 5);
    assert_eq!(child_slots(&store, parent.id).len(), 5);

    let kept = store
        .materialize(
            MaterializeRequest::new(MaterializeScope::Parents(vec![ids[0]]), "author")
                .prune_safe(false),
        )
        .expect("fill leaf-less placeholder");
    assert_eq!(kept.added, 5);
}

#[test]
fn enforce_five_off_only_counts_kept() {
    let (mut store, _clock) = open("enforce_five_off_only_counts_kept");
    let parent = root(&mut store, "Vomiting");
    let ids = fill(&mut store, parent.id, ["Blood", "Bile", "Food", "Projectile", "Other"]);
    store
        .delete_subtree(DeleteSubtreeRequest {
            node_id: ids[4],
            expected_version: None,
            actor: "author".to_string(),
        })
        .expect("delete");

    let report = store
        .materialize(
            MaterializeRequest::new(MaterializeScope::All, "author").enforce_five(false),
        )
        .expect("materialize");
    assert_eq!(report.added, 0);
    assert_eq!(report.kept, 4);
    assert_eq!(child_slots(&store, parent.id).len(), 4);
}

#[test]
fn explicit_scope_ids_are_validated() {
    let (mut store, _clock) = open("explicit_scope_ids_are_validated");
    let err = store
        .materialize(MaterializeRequest::new(
            MaterializeScope::Parents(vec![77]),
            "author",
        ))
        .expect_err("unknown id");
    assert_eq!(err.status(), 404);

    let mut parent = root(&mut store, "Leaf chain");
    for _ in 0..5 {
        let ids = fill(&mut store, parent.id, ["A", "B", "C", "D", "E"]);
        parent = store.get_node(ids[0]).expect("child");
    }
    assert!(parent.is_leaf);
    let err = store
        .materialize(MaterializeRequest::new(
            MaterializeScope::Parents(vec![parent.id]),
            "author",
        ))
        .expect_err("leaf");
    assert_eq!(err.status(), 422);
}

#[test]
fn undo_removes_only_untouched_placeholders() {
    let (mut store, _clock) = open("undo_removes_only_untouched_placeholders");
    let parent = root(&mut store, "Weakness");
    let report = store
        .materialize(MaterializeRequest::new(
            MaterializeScope::Parents(vec![parent.id]),
            "author",
        ))
        .expect("materialize");
    let audit_id = report.audit_id.expect("audit id");

    let edited = store.read_children_with_version(parent.id).expect("read").children[0].clone();
    store
        .update_label(UpdateLabelRequest {
            node_id: edited.id,
            label: "Sudden onset".to_string(),
            expected_version: None,
            actor: "author".to_string(),
        })
        .expect("edit placeholder");

    let err = store
        .undo_operation(UndoRequest::new(audit_id, "reviewer"))
        .expect_err("confirmation required");
    assert_eq!(err.status(), 422);
    assert_eq!(err.code(), "confirmation_required");

    let undone = store
        .undo_operation(UndoRequest::new(audit_id, "reviewer").confirmed())
        .expect("undo");
    assert_eq!(undone.effects["removed_ids"].as_array().map(Vec::len), Some(4));
    assert_eq!(undone.effects["kept_ids"][0], edited.id);

    let remaining = store.read_children_with_version(parent.id).expect("read");
    assert_eq!(remaining.children.len(), 1);
    assert_eq!(remaining.children[0].label, "Sudden onset");
}

#[test]
fn materialize_undo_window_is_five_minutes() {
    let (mut store, clock) = open("materialize_undo_window_is_five_minutes");
    let parent = root(&mut store, "Confusion");
    let report = store
        .materialize(MaterializeRequest::new(
            MaterializeScope::Parents(vec![parent.id]),
            "author",
        ))
        .expect("materialize");

    clock.advance_secs(301);
    let err = store
        .undo_operation(UndoRequest::new(report.audit_id.expect("audit id"), "reviewer").confirmed())
        .expect_err("expired");
    assert_eq!(err.code(), "undo_timeout_expired");
    assert_eq!(child_slots(&store, parent.id).len(), 5);
}
