#![forbid(unsafe_code)]

mod groups;
mod log;
mod retention;
mod undo;
