#![forbid(unsafe_code)]

mod bulk;
mod detect;
mod repair;

pub(super) use repair::restore_repaired_tx;
