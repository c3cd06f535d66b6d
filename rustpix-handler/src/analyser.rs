//! Per-chip analyser: decode -> predictor/queues -> histogram
//! dispatch. One instance runs on its own OS thread per chip.

use std::sync::Arc;

use rustpix_core::{Period, PeriodIndex};
use rustpix_hist::{Manager, WriterQueue};
use rustpix_iobuf::BufferPool;
use rustpix_period::{PeriodPredictor, PeriodQueues};
use rustpix_tpx::decoder::{self, WordKind};

use crate::context::RunContext;
use crate::error::{Error, Result};

/// The per-thread LRU-of-one `(period, slot)` cache (§4.7) that lets
/// the hot path skip the manager's slot scan on a hit.
#[derive(Debug, Default)]
struct SlotCache {
    entry: Option<(Period, usize)>,
}

impl SlotCache {
    fn slot_for(&mut self, manager: &Manager, period: Period) -> usize {
        if let Some((p, slot)) = self.entry {
            if p == period {
                return slot;
            }
        }
        let slot = manager.data_for_period(period);
        self.entry = Some((period, slot));
        slot
    }

    fn invalidate(&mut self, period: Period) {
        if matches!(self.entry, Some((p, _)) if p == period) {
            self.entry = None;
        }
    }
}

/// Per-chip state owned exclusively by its analyser thread.
pub struct Analyser {
    chip: usize,
    predictor: PeriodPredictor,
    queues: PeriodQueues,
    predictor_ready: bool,
    first_tdc_seen: bool,
    cache: SlotCache,
}

impl Analyser {
    /// Creates fresh per-chip state for `chip`, with disputed-boundary
    /// resolution at `threshold`.
    #[must_use]
    pub fn new(chip: usize, threshold: f64) -> Self {
        Self {
            chip,
            predictor: PeriodPredictor::new(),
            queues: PeriodQueues::with_threshold(threshold),
            predictor_ready: false,
            first_tdc_seen: false,
            cache: SlotCache::default(),
        }
    }

    /// Runs the analyser's main loop against `pool` until it observes a
    /// `None` from the pool (shutdown path) or a fatal error.
    pub fn run(
        &mut self,
        pool: &BufferPool,
        ctx: &RunContext,
        manager: &Manager,
        writer_queue: &WriterQueue,
    ) -> Result<()> {
        ctx.mark_analyser_ready();
        loop {
            let Some((_packet_id, buf)) = pool.get_nonempty_buffer() else {
                break;
            };
            let content = buf.content();
            for word_bytes in content.chunks_exact(8) {
                let word = u64::from_le_bytes(word_bytes.try_into().unwrap());
                self.process_word(word, ctx, manager, writer_queue)?;
            }
            pool.return_empty_buffer(buf);
        }
        self.purge_all(ctx, manager, writer_queue);
        Ok(())
    }

    fn process_word(
        &mut self,
        word: u64,
        ctx: &RunContext,
        manager: &Manager,
        writer_queue: &WriterQueue,
    ) -> Result<()> {
        match decoder::classify(word) {
            WordKind::ChunkHeader => Err(Error::CorruptStream {
                chip: self.chip,
                detail: "chunk-header word inside a chunk body".into(),
            }),
            WordKind::PacketId => Err(Error::CorruptStream {
                chip: self.chip,
                detail: "packet-id word inside a chunk body".into(),
            }),
            WordKind::Hit => self.process_hit(word, ctx, manager),
            WordKind::Tdc => self.process_tdc_word(word, ctx, manager, writer_queue),
            WordKind::Unknown => {
                log::warn!("chip {}: unknown word {word:#018x}, skipping", self.chip);
                Ok(())
            }
        }
    }

    fn process_hit(&mut self, word: u64, ctx: &RunContext, manager: &Manager) -> Result<()> {
        if !self.predictor_ready {
            return Ok(());
        }
        let toa = decoder::toa_clock(word);
        let period_f = self.predictor.period_prediction(toa);
        let idx = self.queues.period_index_for(period_f);
        let idx = self.queues.refined_index(idx, toa);
        if !idx.disputed {
            self.process_event(idx.period, toa, word, ctx, manager)?;
        } else {
            self.queues.enqueue_disputed(idx.disputed_period, toa, word);
        }
        Ok(())
    }

    fn process_tdc_word(
        &mut self,
        word: u64,
        ctx: &RunContext,
        manager: &Manager,
        writer_queue: &WriterQueue,
    ) -> Result<()> {
        let tdc_clk = decoder::tdc_clock(word)? as i64;
        if !self.first_tdc_seen {
            self.predictor.reset(tdc_clk, ctx.config.initial_period);
            self.first_tdc_seen = true;
        } else {
            self.predictor.update(tdc_clk);
        }
        if self.predictor.ready() {
            self.predictor_ready = true;
            let period_f = self.predictor.period_prediction(tdc_clk);
            let idx = self.queues.period_index_for(period_f);
            if !idx.disputed {
                return Err(Error::CorruptStream {
                    chip: self.chip,
                    detail: format!("TDC at tick {tdc_clk} resolved to an undisputed period index"),
                });
            }
            if !self.predictor.ok(tdc_clk) {
                self.predictor.start_update(tdc_clk);
            }
            self.process_tdc(idx, tdc_clk, ctx, manager, writer_queue)?;
        }
        Ok(())
    }

    fn process_tdc(
        &mut self,
        idx: PeriodIndex,
        tdc_clk: i64,
        ctx: &RunContext,
        manager: &Manager,
        writer_queue: &WriterQueue,
    ) -> Result<()> {
        let drained = {
            let rq = self.queues.register_start(idx, tdc_clk);
            let mut drained = Vec::with_capacity(rq.len());
            while let Some(raw) = rq.pop() {
                drained.push((decoder::toa_clock(raw), raw));
            }
            drained
        };
        for (toa, raw) in drained {
            let period = if toa < tdc_clk {
                idx.period
            } else {
                idx.disputed_period
            };
            self.process_event(period, toa, raw, ctx, manager)?;
        }

        while self.queues.size() > ctx.config.max_period_queues {
            let Some(oldest) = self.queues.oldest() else {
                break;
            };
            self.queues.erase(oldest);
            self.purge_period(oldest, manager, writer_queue);
        }
        Ok(())
    }

    fn process_event(
        &mut self,
        period: Period,
        toa_abs: i64,
        raw: u64,
        ctx: &RunContext,
        manager: &Manager,
    ) -> Result<()> {
        let start = self.queues.start_of(period).ok_or_else(|| Error::InvariantViolation(
            format!("no registered start for period {} on chip {}", period.index(), self.chip),
        ))?;
        let toa_rel = toa_abs - start;
        let slot = self.cache.slot_for(manager, period);
        // SAFETY: this analyser thread is the sole writer entitled to
        // mutate `chip`'s row of `slot` (it owns `self.chip` exclusively
        // and only touches slots it or `process_tdc`'s purge path claimed).
        let spectra = unsafe { manager.spectra_mut(slot, self.chip) };

        let (roi_start, roi_step, roi_bins) = ctx.roi();
        let pixel_map = ctx.pixel_map();
        let (x, y) = decoder::xy(raw);
        let flat_pixel = u32::from(y) * 256 + u32::from(x);
        let contributions = pixel_map.lookup(self.chip as u8, flat_pixel);

        if roi_step <= 0 {
            return Err(Error::Configuration("T_roi_step must be positive".into()));
        }
        let t_bin = (toa_rel - roi_start).div_euclid(roi_step);
        if t_bin < 0 {
            spectra.record_before_roi();
        } else if t_bin >= roi_bins {
            spectra.record_after_roi();
        } else {
            let t_bin = t_bin as usize;
            for &(ep, weight) in contributions {
                spectra.accumulate(t_bin, ep as usize, weight);
            }
        }
        Ok(())
    }

    fn purge_period(&mut self, period: Period, manager: &Manager, writer_queue: &WriterQueue) {
        self.cache.invalidate(period);
        let slot = manager.data_for_period(period);
        if manager.return_data(slot).is_some() {
            writer_queue.push(slot);
        }
    }

    fn purge_all(&mut self, _ctx: &RunContext, manager: &Manager, writer_queue: &WriterQueue) {
        while let Some(period) = self.queues.oldest() {
            self.queues.erase(period);
            self.purge_period(period, manager, writer_queue);
        }
    }
}

/// Spawns and runs one chip's analyser loop to completion.
pub fn run_analyser(
    chip: usize,
    pool: Arc<BufferPool>,
    ctx: Arc<RunContext>,
    manager: Arc<Manager>,
    writer_queue: Arc<WriterQueue>,
) -> Result<()> {
    let mut analyser = Analyser::new(chip, ctx.config.threshold);
    let result = analyser.run(&pool, &ctx, &manager, &writer_queue);
    if let Err(ref e) = result {
        ctx.set_error(e.to_string());
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use rustpix_hist::{Manager, PixelMap, WriterQueue};
    use rustpix_period::DEFAULT_THRESHOLD;
    use rustpix_tpx::decoder::{HIT_NIBBLE, TDC_NIBBLE};

    use crate::context::{RunConfig, RunContext};

    /// Builds a hit word whose `toa_clock` equals `toa_ticks` exactly
    /// (`coarse` and `ftoa` held at zero); `toa_ticks` must be a
    /// multiple of 16.
    fn hit_word(toa_ticks: i64, enc: u16) -> u64 {
        assert_eq!(toa_ticks % 16, 0);
        let toa14 = (toa_ticks / 16) as u64;
        (u64::from(HIT_NIBBLE) << 60) | (u64::from(enc) << 44) | (toa14 << 30)
    }

    /// Builds a TDC word whose `tdc_clock` equals `tdc_ticks` exactly
    /// (`fract` held at 1); `tdc_ticks` must be even.
    fn tdc_word(tdc_ticks: i64) -> u64 {
        assert_eq!(tdc_ticks % 2, 0);
        let coarse35 = (tdc_ticks / 2) as u64;
        (u64::from(TDC_NIBBLE) << 60) | (coarse35 << 9) | (1u64 << 5)
    }

    fn test_rig(n_chips: usize, roi_bins: i64) -> (RunContext, Manager) {
        let config = RunConfig {
            n_chips,
            ..RunConfig::default()
        };
        let ctx = RunContext::new(config, 0, 1, roi_bins, PixelMap::empty(1));
        let manager = Manager::new(4, n_chips, roi_bins as usize, 1);
        (ctx, manager)
    }

    /// Warms a fresh analyser up to `predictor_ready`: one TDC to seed
    /// `reset`, three more to reach the ready threshold, landing
    /// exactly on period boundaries (so every prediction disputes the
    /// adjacent pair rather than resolving outright).
    fn warm_up(a: &mut Analyser, ctx: &RunContext, manager: &Manager, wq: &WriterQueue) {
        for tdc in [0i64, 1000, 2000, 3000] {
            a.process_word(tdc_word(tdc), ctx, manager, wq).unwrap();
        }
        assert!(a.predictor_ready, "predictor should be ready after 4 TDCs");
    }

    #[test]
    fn disputed_hit_preceding_its_tdc_resolves_to_the_period_it_arrived_in() {
        let pixel_map = PixelMap::from_csv_str("0, 0, 0, 1.0\n").unwrap();
        let config = RunConfig {
            n_chips: 1,
            ..RunConfig::default()
        };
        let ctx = RunContext::new(config, 0, 1, 10_000, pixel_map);
        let manager = Manager::new(4, 1, 10_000, 1);
        let wq = WriterQueue::new();
        let mut a = Analyser::new(0, DEFAULT_THRESHOLD);
        warm_up(&mut a, &ctx, &manager, &wq);

        // Arrives before the TDC that would open period 4; predictor puts
        // it in the disputed (3, 4) pair with no start yet known for 4,
        // so it is buffered rather than dispatched.
        a.process_word(hit_word(3952, 0), &ctx, &manager, &wq).unwrap();
        assert_eq!(a.queues.start_of(Period::new(4)), None);

        a.process_word(tdc_word(4000), &ctx, &manager, &wq).unwrap();

        // Its TOA (3952) precedes the TDC that resolved it (4000), so it
        // belongs to period 3, whose start (3000) was already registered,
        // not the newly opened period 4.
        let slot = manager.data_for_period(Period::new(3));
        // SAFETY: single-threaded test, no other writer touches this cell.
        let spectra = unsafe { manager.spectra_mut(slot, 0) };
        assert_eq!(spectra.counts()[952], 1.0);
        assert_eq!(spectra.before_roi(), 0);
    }

    #[test]
    fn two_chips_purge_independently_and_only_complete_once_both_release() {
        let (ctx, manager) = test_rig(2, 10_000);
        let wq = WriterQueue::new();
        let mut a0 = Analyser::new(0, DEFAULT_THRESHOLD);
        let mut a1 = Analyser::new(1, DEFAULT_THRESHOLD);
        warm_up(&mut a0, &ctx, &manager, &wq);
        warm_up(&mut a1, &ctx, &manager, &wq);

        let period = Period::new(3);
        let slot = manager.data_for_period(period);

        a0.purge_period(period, &manager, &wq);
        assert!(wq.pop_or_stop(&std::sync::atomic::AtomicBool::new(true)).is_none());

        a1.purge_period(period, &manager, &wq);
        assert_eq!(wq.pop_or_stop(&std::sync::atomic::AtomicBool::new(true)), Some(slot));
    }

    #[test]
    fn purge_all_drains_every_tracked_period_exactly_once() {
        let (ctx, manager) = test_rig(1, 10_000);
        let wq = WriterQueue::new();
        let mut a = Analyser::new(0, DEFAULT_THRESHOLD);
        warm_up(&mut a, &ctx, &manager, &wq);
        a.process_word(tdc_word(4000), &ctx, &manager, &wq).unwrap();

        assert!(!a.queues.empty());
        a.purge_all(&ctx, &manager, &wq);
        assert!(a.queues.empty());

        // every purged period's slot should have completed (n_chips == 1)
        // and been pushed for the writer exactly once.
        let mut flushed = 0;
        let stop = std::sync::atomic::AtomicBool::new(true);
        while wq.pop_or_stop(&stop).is_some() {
            flushed += 1;
        }
        assert!(flushed >= 1);
    }
}
