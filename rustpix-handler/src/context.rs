//! The shared control-plane surface, threaded explicitly through
//! `DataHandler` and `Manager` rather than kept as a process-wide
//! singleton (§9 design note).

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use rustpix_hist::PixelMap;

/// Static, run-for-its-lifetime configuration decided at startup.
#[derive(Debug, Clone, Copy)]
pub struct RunConfig {
    /// Seed interval (clock ticks) handed to each chip's predictor on
    /// its first-ever TDC.
    pub initial_period: i64,
    /// How many completed period intervals each chip keeps "live" to
    /// absorb out-of-order events before purging (default 2).
    pub max_period_queues: usize,
    /// Byte capacity of each pooled IO buffer.
    pub buffer_capacity: usize,
    /// Number of chips (and therefore analyser threads / histogram rows).
    pub n_chips: usize,
    /// Number of concurrently "live" histogram slots in the manager.
    pub n_period_slots: usize,
    /// Disputed-boundary half-width, as a fraction of one period.
    pub threshold: f64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            initial_period: 1000,
            max_period_queues: 2,
            buffer_capacity: 64 * 1024,
            n_chips: 1,
            n_period_slots: 4,
            threshold: rustpix_period::DEFAULT_THRESHOLD,
        }
    }
}

/// The control-plane-mutable state the core reads (and occasionally
/// writes, for `last_error`). Flags are atomics; the pixel map is an
/// atomically-swapped immutable snapshot behind a read-write lock.
pub struct RunContext {
    /// Static per-run configuration.
    pub config: RunConfig,
    stop: AtomicBool,
    stop_collect: AtomicBool,
    roi_start: AtomicI64,
    roi_step: AtomicI64,
    roi_bins: AtomicI64,
    pixel_map: RwLock<Arc<PixelMap>>,
    last_error: Mutex<Option<String>>,
    ready_count: AtomicI64,
}

impl RunContext {
    /// Builds a context with the given static config, ROI window, and
    /// initial pixel map.
    #[must_use]
    pub fn new(config: RunConfig, roi_start: i64, roi_step: i64, roi_bins: i64, pixel_map: PixelMap) -> Self {
        Self {
            config,
            stop: AtomicBool::new(false),
            stop_collect: AtomicBool::new(false),
            roi_start: AtomicI64::new(roi_start),
            roi_step: AtomicI64::new(roi_step),
            roi_bins: AtomicI64::new(roi_bins),
            pixel_map: RwLock::new(Arc::new(pixel_map)),
            last_error: Mutex::new(None),
            ready_count: AtomicI64::new(0),
        }
    }

    /// Cooperative shutdown: sets the stop flag. Threads drain through
    /// their next loop bottom; nothing is forcibly terminated.
    pub fn stop_now(&self) {
        self.stop.store(true, Ordering::Release);
    }

    /// True once `stop_now` has been called.
    #[must_use]
    pub fn is_stopping(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    /// Control-plane request to leave `collect` without a hard stop.
    pub fn stop_collect(&self) {
        self.stop_collect.store(true, Ordering::Release);
    }

    /// True once `stop_collect` has been requested.
    #[must_use]
    pub fn is_collect_stopped(&self) -> bool {
        self.stop_collect.load(Ordering::Acquire)
    }

    /// Current ROI window: `(t_roi_start, t_roi_step, t_bins)`.
    #[must_use]
    pub fn roi(&self) -> (i64, i64, i64) {
        (
            self.roi_start.load(Ordering::Acquire),
            self.roi_step.load(Ordering::Acquire),
            self.roi_bins.load(Ordering::Acquire),
        )
    }

    /// Replaces the ROI window (control-plane mutation).
    pub fn set_roi(&self, start: i64, step: i64, bins: i64) {
        self.roi_start.store(start, Ordering::Release);
        self.roi_step.store(step, Ordering::Release);
        self.roi_bins.store(bins, Ordering::Release);
    }

    /// A snapshot of the current pixel map.
    #[must_use]
    pub fn pixel_map(&self) -> Arc<PixelMap> {
        Arc::clone(&self.pixel_map.read().expect("pixel map lock poisoned"))
    }

    /// Atomically swaps in a new pixel map (control-plane mutation; the
    /// core never writes this itself).
    pub fn set_pixel_map(&self, map: PixelMap) {
        *self.pixel_map.write().expect("pixel map lock poisoned") = Arc::new(map);
    }

    /// Publishes an error message and requests a stop. Used by the
    /// reader/analyser threads' "set error" helper (§9).
    pub fn set_error(&self, message: impl Into<String>) {
        *self.last_error.lock().expect("last_error lock poisoned") = Some(message.into());
        self.stop_now();
    }

    /// The most recently published error message, if any.
    #[must_use]
    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().expect("last_error lock poisoned").clone()
    }

    /// Bumps the analyser-ready counter (release ordering) as each
    /// analyser thread finishes setup.
    pub fn mark_analyser_ready(&self) {
        self.ready_count.fetch_add(1, Ordering::Release);
    }

    /// True once every chip's analyser has reported ready.
    #[must_use]
    pub fn all_analysers_ready(&self) -> bool {
        self.ready_count.load(Ordering::Acquire) as usize >= self.config.n_chips
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stop_now_is_observable() {
        let ctx = RunContext::new(RunConfig::default(), 0, 1, 100, PixelMap::empty(1));
        assert!(!ctx.is_stopping());
        ctx.stop_now();
        assert!(ctx.is_stopping());
    }

    #[test]
    fn set_error_also_stops() {
        let ctx = RunContext::new(RunConfig::default(), 0, 1, 100, PixelMap::empty(1));
        ctx.set_error("socket reset");
        assert!(ctx.is_stopping());
        assert_eq!(ctx.last_error().as_deref(), Some("socket reset"));
    }

    #[test]
    fn analyser_ready_counter_gates_on_chip_count() {
        let mut config = RunConfig::default();
        config.n_chips = 2;
        let ctx = RunContext::new(config, 0, 1, 100, PixelMap::empty(1));
        assert!(!ctx.all_analysers_ready());
        ctx.mark_analyser_ready();
        assert!(!ctx.all_analysers_ready());
        ctx.mark_analyser_ready();
        assert!(ctx.all_analysers_ready());
    }

    #[test]
    fn pixel_map_swap_is_visible_to_new_readers() {
        let ctx = RunContext::new(RunConfig::default(), 0, 1, 100, PixelMap::empty(1));
        assert_eq!(ctx.pixel_map().n_energy_points(), 1);
        ctx.set_pixel_map(PixelMap::empty(4));
        assert_eq!(ctx.pixel_map().n_energy_points(), 4);
    }
}
