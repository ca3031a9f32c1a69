#![forbid(unsafe_code)]

use super::SLOT_COUNT;
use serde::Serialize;
use std::collections::BTreeSet;

pub fn is_child_slot(slot: i64) -> bool {
    (1..=SLOT_COUNT).contains(&slot)
}

pub fn all_slots() -> impl Iterator<Item = i64> {
    1..=SLOT_COUNT
}

/// Slots in `1..=5` that are not present in `present`, ascending.
pub fn missing_slots(present: impl IntoIterator<Item = i64>) -> Vec<i64> {
    let present = present.into_iter().collect::<BTreeSet<_>>();
    all_slots().filter(|slot| !present.contains(slot)).collect()
}

/// Lowest slot in `1..=5` not listed in `taken`.
pub fn lowest_free_slot(taken: impl IntoIterator<Item = i64>) -> Option<i64> {
    missing_slots(taken).into_iter().next()
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SlotSetError {
    pub missing: Vec<i64>,
    pub unexpected: Vec<i64>,
    pub duplicated: Vec<i64>,
}

impl SlotSetError {
    pub fn message(&self) -> String {
        let mut parts = Vec::new();
        if !self.missing.is_empty() {
            parts.push(format!("missing slots {:?}", self.missing));
        }
        if !self.unexpected.is_empty() {
            parts.push(format!("slots out of range {:?}", self.unexpected));
        }
        if !self.duplicated.is_empty() {
            parts.push(format!("duplicated slots {:?}", self.duplicated));
        }
        if parts.is_empty() {
            return "slot set is incomplete".to_string();
        }
        parts.join("; ")
    }
}

/// A complete child set names each of the slots `1..=5` exactly once.
pub fn validate_slot_set(slots: impl IntoIterator<Item = i64>) -> Result<(), SlotSetError> {
    let mut seen = BTreeSet::new();
    let mut unexpected = BTreeSet::new();
    let mut duplicated = BTreeSet::new();
    for slot in slots {
        if !is_child_slot(slot) {
            unexpected.insert(slot);
            continue;
        }
        if !seen.insert(slot) {
            duplicated.insert(slot);
        }
    }

    let missing = missing_slots(seen.iter().copied());
    if missing.is_empty() && unexpected.is_empty() && duplicated.is_empty() {
        return Ok(());
    }
    Err(SlotSetError {
        missing,
        unexpected: unexpected.into_iter().collect(),
        duplicated: duplicated.into_iter().collect(),
    })
}
