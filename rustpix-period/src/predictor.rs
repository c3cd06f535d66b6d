//! Per-chip TDC period predictor.
//!
//! Tracks a short history of TDC timestamps to extrapolate, for any
//! later timestamp, which TDC-to-TDC interval ("period") it falls in.
//! A median-of-differences interval estimate makes the prediction
//! robust to a single dropped or glitched TDC pulse.

use std::collections::VecDeque;

/// Ring size: the last `N` TDC timestamps are kept.
const RING_SIZE: usize = 4;

/// Minimum `update()` calls after `reset()` before predictions are trusted.
const READY_THRESHOLD: usize = 3;

/// Extrapolation limit: refuse predictions more than this many periods
/// past the reference timestamp without recalibration.
const MAX_EXTRAPOLATION_PERIODS: f64 = 100.0;

/// Predicts, from a chip's TDC timestamp history, which period a later
/// timestamp belongs to.
#[derive(Debug, Clone)]
pub struct PeriodPredictor {
    ring: VecDeque<i64>,
    start: i64,
    interval: f64,
    correction: i64,
    updates_since_reset: usize,
}

impl PeriodPredictor {
    /// Creates a predictor with no history. Call [`Self::reset`] with the
    /// first observed TDC timestamp before using it.
    #[must_use]
    pub fn new() -> Self {
        Self {
            ring: VecDeque::with_capacity(RING_SIZE),
            start: 0,
            interval: 1.0,
            correction: 0,
            updates_since_reset: 0,
        }
    }

    /// Initialises the ring to `[start - (N-1)*period, ..., start]`,
    /// sets `interval = period`, `correction = 0`, and clears the
    /// ready counter.
    pub fn reset(&mut self, start: i64, period: i64) {
        self.ring.clear();
        for i in (0..RING_SIZE).rev() {
            self.ring.push_back(start - (i as i64) * period);
        }
        self.start = start;
        self.interval = period as f64;
        self.correction = 0;
        self.updates_since_reset = 0;
    }

    /// Overwrites the oldest ring slot with `ts` and recomputes
    /// `interval` as the median of the `N-1` adjacent consecutive
    /// differences, in chronological order.
    pub fn update(&mut self, ts: i64) {
        if self.ring.len() == RING_SIZE {
            self.ring.pop_front();
        }
        self.ring.push_back(ts);

        let mut diffs: Vec<i64> = self
            .ring
            .iter()
            .zip(self.ring.iter().skip(1))
            .map(|(a, b)| b - a)
            .collect();
        diffs.sort_unstable();
        if !diffs.is_empty() {
            let median_idx = (diffs.len() - 1) / 2;
            self.interval = diffs[median_idx] as f64;
        }
        self.updates_since_reset += 1;
    }

    /// True once enough updates have been observed to trust predictions.
    #[must_use]
    pub fn ready(&self) -> bool {
        self.updates_since_reset >= READY_THRESHOLD
    }

    /// Predicted (fractional) period index for `ts`.
    #[must_use]
    pub fn period_prediction(&self, ts: i64) -> f64 {
        (ts - self.start) as f64 / self.interval + self.correction as f64
    }

    /// Rebases the reference timestamp to `new_start`, adjusting
    /// `correction` by the whole number of periods between the old and
    /// new reference.
    pub fn start_update(&mut self, new_start: i64) {
        let delta_periods = (new_start - self.start) as f64 / self.interval;
        self.correction += delta_periods.round() as i64;
        self.start = new_start;
    }

    /// True if `ts` is within the extrapolation limit of the current
    /// reference without recalibration.
    #[must_use]
    pub fn ok(&self, ts: i64) -> bool {
        (ts - self.start) as f64 / self.interval < MAX_EXTRAPOLATION_PERIODS
    }
}

impl Default for PeriodPredictor {
    fn default() -> Self {
        Self::new()
    }
}
