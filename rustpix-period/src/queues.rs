//! Per-chip period queues: the disputed-boundary resolution and
//! reorder-queue draining machinery sitting between the predictor and
//! the histogram manager.

use std::collections::BTreeMap;

use rustpix_core::{Period, PeriodIndex};
use rustpix_tpx::ReorderQueue;

/// Default disputed-boundary half-width, as a fraction of one period.
pub const DEFAULT_THRESHOLD: f64 = 0.1;

#[derive(Debug, Default)]
struct PeriodElement {
    start: Option<i64>,
    queue: ReorderQueue,
}

/// Ordered per-chip map from period to its pending state (an observed
/// start timestamp, a queue of disputed hits awaiting that start, or
/// both once a start has been registered and later hits still need
/// attribution against it).
#[derive(Debug)]
pub struct PeriodQueues {
    threshold: f64,
    map: BTreeMap<Period, PeriodElement>,
}

impl PeriodQueues {
    /// Creates an empty queue map with the default disputed-boundary
    /// threshold.
    #[must_use]
    pub fn new() -> Self {
        Self::with_threshold(DEFAULT_THRESHOLD)
    }

    /// Creates an empty queue map with an explicit threshold in `(0, 0.5)`.
    #[must_use]
    pub fn with_threshold(threshold: f64) -> Self {
        debug_assert!(threshold > 0.0 && threshold < 0.5);
        Self {
            threshold,
            map: BTreeMap::new(),
        }
    }

    /// Resolves a fractional period prediction into a [`PeriodIndex`].
    ///
    /// A window of width `2 * threshold` straddling each integer
    /// boundary is disputed and attributed to the adjacent pair of
    /// periods.
    #[must_use]
    pub fn period_index_for(&self, p: f64) -> PeriodIndex {
        let base = p.floor() as i64;
        let frac = p - base as f64;
        if frac > 1.0 - self.threshold {
            PeriodIndex::disputed(Period::new(base), Period::new(base + 1))
        } else if frac < self.threshold {
            PeriodIndex::disputed(Period::new(base - 1), Period::new(base))
        } else {
            PeriodIndex::resolved(Period::new(base))
        }
    }

    /// Attempts to resolve a disputed index against an already-registered
    /// start timestamp for its upper candidate. Leaves `idx` untouched
    /// (still disputed) if no start has been observed yet.
    #[must_use]
    pub fn refined_index(&mut self, mut idx: PeriodIndex, ts: i64) -> PeriodIndex {
        if !idx.disputed {
            return idx;
        }
        let Some(start) = self
            .map
            .get(&idx.disputed_period)
            .and_then(|e| e.start)
        else {
            return idx;
        };
        if ts < start {
            idx.disputed_period = idx.period;
        } else {
            idx.period = idx.disputed_period;
        }
        idx.disputed = false;
        idx
    }

    /// Registers the observed TDC start timestamp for a disputed index's
    /// upper candidate and returns its (now-draining) reorder queue.
    ///
    /// # Panics
    /// Panics if `idx` is not disputed.
    pub fn register_start(&mut self, idx: PeriodIndex, start_ts: i64) -> &mut ReorderQueue {
        assert!(idx.disputed, "register_start requires a disputed index");
        let element = self.map.entry(idx.disputed_period).or_default();
        element.start = Some(start_ts);
        &mut element.queue
    }

    /// Buffers a disputed hit `(toa, raw)` into `period`'s reorder queue
    /// while its TDC has not yet been observed. No-op-safe to call
    /// before any start is registered for `period`.
    pub fn enqueue_disputed(&mut self, period: Period, toa: i64, raw: u64) {
        self.map.entry(period).or_default().queue.push(toa, raw);
    }

    /// Looks up the registered start timestamp for `period`, if any.
    #[must_use]
    pub fn start_of(&self, period: Period) -> Option<i64> {
        self.map.get(&period).and_then(|e| e.start)
    }

    /// The oldest (smallest) period key currently tracked.
    #[must_use]
    pub fn oldest(&self) -> Option<Period> {
        self.map.keys().next().copied()
    }

    /// Removes the entry for `period`.
    pub fn erase(&mut self, period: Period) {
        self.map.remove(&period);
    }

    /// Number of tracked periods.
    #[must_use]
    pub fn size(&self) -> usize {
        self.map.len()
    }

    /// True if no periods are tracked.
    #[must_use]
    pub fn empty(&self) -> bool {
        self.map.is_empty()
    }
}

impl Default for PeriodQueues {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unambiguous_fraction_resolves_immediately() {
        let q = PeriodQueues::new();
        let idx = q.period_index_for(5.5);
        assert!(!idx.disputed);
        assert_eq!(idx.period.index(), 5);
    }

    #[test]
    fn upper_boundary_is_disputed() {
        let q = PeriodQueues::new();
        let idx = q.period_index_for(5.95);
        assert!(idx.disputed);
        assert_eq!(idx.period.index(), 5);
        assert_eq!(idx.disputed_period.index(), 6);
    }

    #[test]
    fn lower_boundary_is_disputed() {
        let q = PeriodQueues::new();
        let idx = q.period_index_for(5.05);
        assert!(idx.disputed);
        assert_eq!(idx.period.index(), 4);
        assert_eq!(idx.disputed_period.index(), 5);
    }

    #[test]
    fn refined_index_resolves_to_upper_once_start_known() {
        let mut q = PeriodQueues::new();
        let idx = q.period_index_for(5.95);
        q.register_start(idx, 1000);
        let refined = q.refined_index(idx, 1050);
        assert!(!refined.disputed);
        assert_eq!(refined.period.index(), 6);
    }

    #[test]
    fn refined_index_resolves_to_lower_before_start() {
        let mut q = PeriodQueues::new();
        let idx = q.period_index_for(5.95);
        q.register_start(idx, 1000);
        let refined = q.refined_index(idx, 950);
        assert!(!refined.disputed);
        assert_eq!(refined.period.index(), 5);
    }

    #[test]
    fn refined_index_stays_disputed_without_registered_start() {
        let mut q = PeriodQueues::new();
        let idx = q.period_index_for(5.95);
        let still = q.refined_index(idx, 950);
        assert!(still.disputed);
    }

    #[test]
    fn register_start_returns_draining_queue() {
        let mut q = PeriodQueues::new();
        let idx = q.period_index_for(5.95);
        let rq = q.register_start(idx, 1000);
        rq.push(990, 0xABCD);
        assert_eq!(q.size(), 1);
        assert_eq!(q.start_of(Period::new(6)), Some(1000));
    }

    #[test]
    fn erase_and_oldest_support_purging() {
        let mut q = PeriodQueues::new();
        q.register_start(PeriodIndex::disputed(Period::new(1), Period::new(2)), 100);
        q.register_start(PeriodIndex::disputed(Period::new(2), Period::new(3)), 200);
        assert_eq!(q.oldest(), Some(Period::new(2)));
        q.erase(Period::new(2));
        assert_eq!(q.size(), 1);
        assert!(!q.empty());
    }
}
