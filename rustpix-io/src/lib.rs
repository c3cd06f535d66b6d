//! rustpix-io: memory-mapped offline capture reading.
//!
//! The live detector connection is handled by `rustpix-handler`'s TCP
//! reader thread; this crate only serves fixture-driven tests and the
//! `tools/` diagnostics binary, which both want to walk a recorded
//! capture file directly.

mod error;
mod reader;

pub use error::{Error, Result};
pub use reader::{ChunkWords, MappedFileReader};
