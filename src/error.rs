//! The error-kind taxonomy shared by every layer of the engine.
//!
//! Every fallible operation in this crate returns `Result<T, Error>`. The
//! variants mirror chidb's `CHIDB_E*` return codes rather than Rust
//! convention (one big enum instead of per-module errors) because the VM
//! opcode handlers need to match on the *kind* of failure (e.g. `Empty` is a
//! branch taken, not a bug) regardless of which layer produced it.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// The backing file is empty; the pager has no header to return yet.
    #[error("no header: file is empty")]
    NoHeader,

    #[error("corrupt header: {0}")]
    CorruptHeader(String),

    #[error("invalid page number: {0}")]
    InvalidPage(u32),

    #[error("invalid cell number: {0}")]
    InvalidCell(u32),

    #[error("not found")]
    NotFound,

    #[error("duplicate key")]
    Duplicate,

    #[error("empty")]
    Empty,

    #[error("out of memory")]
    NoMemory,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("parse/type error: {0}")]
    Parse(String),
}

pub type Result<T> = std::result::Result<T, Error>;
