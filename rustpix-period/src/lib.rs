//! rustpix-period: per-chip TDC period prediction and disputed-boundary
//! period-queue attribution.
//!
//! [`PeriodPredictor`] extrapolates which period a timestamp falls in
//! from a short history of TDC pulses; [`PeriodQueues`] resolves the
//! fuzzy boundary between adjacent periods and holds the reorder queues
//! of hits that arrive before their enclosing period's start TDC does.

mod error;
mod predictor;
mod queues;

pub use error::{Error, Result};
pub use predictor::PeriodPredictor;
pub use queues::{PeriodQueues, DEFAULT_THRESHOLD};
