#![forbid(unsafe_code)]

mod labels;
mod node;
mod slots;

pub use labels::*;
pub use node::*;
pub use slots::*;

/// Every non-leaf node owns exactly this many child slots (`1..=SLOT_COUNT`).
pub const SLOT_COUNT: i64 = 5;

/// Roots live at depth 0; nodes at `MAX_DEPTH` are always leaves.
pub const MAX_DEPTH: i64 = 5;

/// Slot value reserved for roots.
pub const ROOT_SLOT: i64 = 0;
