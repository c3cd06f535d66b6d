//! Error types for rustpix-core.

use thiserror::Error;

/// Result type alias for rustpix-core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types shared by the decode and period-histogram engine.
#[derive(Error, Debug)]
pub enum Error {
    /// A configuration value fell outside its valid range.
    #[error("configuration error: {0}")]
    ConfigError(String),
}
