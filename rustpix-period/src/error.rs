//! Error types for period prediction and queue attribution.

use thiserror::Error;

/// Result type for rustpix-period operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced while attributing timestamps to periods.
#[derive(Error, Debug)]
pub enum Error {
    /// A TDC's predicted index came back undisputed when the protocol
    /// requires every TDC marker to land in the disputed boundary zone.
    #[error("TDC at tick {0} resolved to an undisputed period index (stream corrupt)")]
    TdcNotDisputed(i64),

    /// Core library error.
    #[error("core error: {0}")]
    CoreError(#[from] rustpix_core::Error),
}
