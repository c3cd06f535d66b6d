//! rustpix-tpx: TPX3 event-word decoding, chunk framing, and the
//! per-chip TOA reorder queue.
//!
//! This crate is purely stateless/single-threaded: the decoder functions
//! in [`decoder`] are pure functions over a raw event word, [`chunk`]
//! parses the framing words that bound a chunk, and [`ReorderQueue`]
//! buffers one chip's hits in TOA order. Everything that needs cross-chip
//! or cross-thread state (period prediction, histogram dispatch) lives
//! in `rustpix-period` and `rustpix-handler`.

mod chunk;
pub mod decoder;
mod error;
mod reorder;

pub use chunk::{ChunkHeader, PacketId};
pub use decoder::WordKind;
pub use error::{Error, Result};
pub use reorder::ReorderQueue;
