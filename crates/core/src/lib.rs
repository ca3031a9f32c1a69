#![forbid(unsafe_code)]

//! Domain types for the 5-ary triage tree: slot and label rules, version tokens,
//! conflict descriptors, orphan policy, the audit operation model and the clock.

pub mod audit;
pub mod clock;
pub mod materialize;
pub mod orphan;
pub mod tree;
pub mod version;
