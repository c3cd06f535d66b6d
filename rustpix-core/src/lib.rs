//! rustpix-core: shared primitives for the TPX3 decode and period-histogram
//! engine.
//!
//! This crate carries the pieces common to every other crate in the
//! workspace: the error type, pixel-coordinate geometry, and the `Period`
//! / `PeriodIndex` types that identify which TDC interval a timestamp
//! belongs to.

mod error;
mod period;
mod pixel;

pub use error::{Error, Result};
pub use period::{Period, PeriodIndex};
pub use pixel::PixelCoord;
