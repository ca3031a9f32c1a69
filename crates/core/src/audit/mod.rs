#![forbid(unsafe_code)]

mod entry;
mod policy;
mod record;
mod undo;

pub use entry::*;
pub use policy::*;
pub use record::*;
pub use undo::*;
