//! Error types for histogram assembly, writing, and the pixel-map
//! collaborator.

use thiserror::Error;

/// Result type for rustpix-hist operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced while assembling or persisting period histograms.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error while reading or writing a histogram or pixel-map file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The pixel-map JSON document did not parse.
    #[error("pixel map JSON error: {0}")]
    PixelMapJson(#[from] serde_json::Error),

    /// The pixel-map CSV document had a malformed row.
    #[error("pixel map CSV error: {0}")]
    PixelMapCsv(String),

    /// A persisted histogram file failed its header/size checks.
    #[error("corrupt histogram artefact: {0}")]
    CorruptArtefact(String),
}
