#![forbid(unsafe_code)]

pub(in crate::store) mod read;
pub(in crate::store) mod write;
