#![forbid(unsafe_code)]

use super::is_child_slot;
use std::collections::BTreeMap;

pub const MAX_LABEL_LEN: usize = 120;

const LABEL_PUNCTUATION: &[char] = &[
    '-', '_', '.', ',', ':', ';', '(', ')', '/', '\'', '&', '+', '%', '?', '!', '#', '<', '>', '=',
];

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LabelError {
    Empty,
    TooLong,
    InvalidChar { ch: char, index: usize },
}

impl std::fmt::Display for LabelError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => write!(f, "label must not be empty"),
            Self::TooLong => write!(f, "label exceeds {MAX_LABEL_LEN} characters"),
            Self::InvalidChar { ch, index } => {
                write!(f, "label contains disallowed character {ch:?} at {index}")
            }
        }
    }
}

fn is_allowed_label_char(ch: char) -> bool {
    ch.is_alphanumeric() || ch == ' ' || LABEL_PUNCTUATION.contains(&ch)
}

/// Trims the label and checks it against the allow-listed character class.
pub fn normalize_label(value: &str) -> Result<String, LabelError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(LabelError::Empty);
    }
    if trimmed.chars().count() > MAX_LABEL_LEN {
        return Err(LabelError::TooLong);
    }
    for (index, ch) in trimmed.chars().enumerate() {
        if !is_allowed_label_char(ch) {
            return Err(LabelError::InvalidChar { ch, index });
        }
    }
    Ok(trimmed.to_string())
}

/// Key under which two labels under one parent are considered the same.
pub fn label_key(value: &str) -> String {
    value.trim().to_lowercase()
}

pub fn placeholder_label(slot: i64) -> String {
    format!("Slot {slot}")
}

/// Blank labels and the deterministic `Slot N` fillers count as placeholders.
pub fn is_placeholder_label(value: &str) -> bool {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return true;
    }
    let Some(raw) = trimmed.strip_prefix("Slot ") else {
        return false;
    };
    raw.parse::<i64>().is_ok_and(is_child_slot)
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LabelCollision {
    pub label: String,
    pub slots: Vec<i64>,
}

/// First label (by key order) submitted for more than one slot.
pub fn find_label_collision<'a>(
    entries: impl IntoIterator<Item = (i64, &'a str)>,
) -> Option<LabelCollision> {
    let mut by_key: BTreeMap<String, (String, Vec<i64>)> = BTreeMap::new();
    for (slot, label) in entries {
        let entry = by_key
            .entry(label_key(label))
            .or_insert_with(|| (label.trim().to_string(), Vec::new()));
        entry.1.push(slot);
    }
    by_key
        .into_values()
        .find(|(_, slots)| slots.len() > 1)
        .map(|(label, mut slots)| {
            slots.sort_unstable();
            LabelCollision { label, slots }
        })
}
