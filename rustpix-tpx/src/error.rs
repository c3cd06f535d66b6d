//! TPX3-specific error types.

use thiserror::Error;

/// Result type for TPX3 operations.
pub type Result<T> = std::result::Result<T, Error>;

/// TPX3-specific error types.
#[derive(Error, Debug)]
pub enum Error {
    /// A TDC word's fine-stamp field was outside the valid `[1, 12]` range.
    #[error("invalid TDC fract field: {0} (expected 1..=12)")]
    InvalidTdcFract(u64),

    /// A chunk header's payload length was not a multiple of 8 bytes.
    #[error("chunk payload length {0} is not a multiple of 8")]
    MisalignedChunk(u16),

    /// A word appeared where the stream framing did not expect it (e.g. a
    /// chunk-header or packet-id word inside a chunk body).
    #[error("unexpected word in stream: {0:#018x}")]
    UnexpectedWord(u64),

    /// I/O error.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Core library error.
    #[error("core error: {0}")]
    CoreError(#[from] rustpix_core::Error),
}
