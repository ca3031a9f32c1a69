#![forbid(unsafe_code)]
//! SQLite persistence for the five-slot triage tree: versioned child upserts,
//! materialization, orphan repair and the audit ledger with undo.

mod store;

pub use store::*;
