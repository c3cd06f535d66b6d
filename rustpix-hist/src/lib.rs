//! rustpix-hist: per-period TDSpectra histograms, the slot-pool
//! manager that assembles per-thread partial histograms into completed
//! ones, and the pixel-map / histogram-writer collaborators.

mod error;
mod manager;
mod pixel_map;
mod tdspectra;
mod writer;

pub use error::{Error, Result};
pub use manager::Manager;
pub use pixel_map::PixelMap;
pub use tdspectra::TDSpectra;
pub use writer::{
    read_tdspectra_file, BatchingWriter, FileHistogramWriter, HistogramWriter, WriterQueue,
};
