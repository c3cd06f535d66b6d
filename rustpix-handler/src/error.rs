//! The error classes of §7: corrupt-stream, I/O, configuration, and
//! internal invariant violations. Back-pressure exhaustion is
//! deliberately absent — it is not an error, just elevated spin time.

use thiserror::Error;

/// Result type for rustpix-handler operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Fatal error classes for the reader/analyser pipeline.
#[derive(Error, Debug)]
pub enum Error {
    /// Bad TPX3 magic at a chunk boundary, a packet-id or chunk-header
    /// word inside a chunk body, an out-of-range TDC fract field, or a
    /// TDC timestamp that resolved to an undisputed period index.
    #[error("corrupt stream on chip {chip}: {detail}")]
    CorruptStream {
        /// Chip the corrupt word was observed on.
        chip: usize,
        /// Human-readable detail of what looked wrong.
        detail: String,
    },

    /// Short read, truncated chunk, or other transport failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Rejected configuration: detected before entering `collect`, never
    /// mid-run (e.g. pixel-map chip count mismatch, pixel index overflow).
    #[error("configuration rejected: {0}")]
    Configuration(String),

    /// A programmer-error invariant was violated (e.g. `register_start`
    /// called twice for the same period, or a buffer's tracked size
    /// diverged from its declared chunk size).
    #[error("internal invariant violated: {0}")]
    InvariantViolation(String),

    /// A lower-level decode error from rustpix-tpx.
    #[error("decode error: {0}")]
    Decode(#[from] rustpix_tpx::Error),

    /// A lower-level histogram/pixel-map error from rustpix-hist.
    #[error("histogram error: {0}")]
    Hist(#[from] rustpix_hist::Error),
}
