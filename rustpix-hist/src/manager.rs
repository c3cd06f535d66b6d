//! The per-period slot pool: each analyser thread accumulates into its
//! own cell of the currently-claimed slot for a period; once every chip
//! has released its cell, the slot is handed to the writer.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::time::Duration;

use rustpix_core::Period;

use crate::tdspectra::TDSpectra;

/// Interior-mutable cell for one chip's row within a slot.
///
/// Exactly one thread ever calls [`Self::get_mut`] while the slot is
/// "filling" (the analyser thread owning that chip index); the writer
/// thread is the only other caller, and only after `return_data` has
/// observed every chip's release for that slot, which establishes a
/// happens-before edge through the slot's `ready_count` atomic.
struct PerChipCell(UnsafeCell<TDSpectra>);

// SAFETY: access is serialised by the single-writer-per-chip invariant
// documented above; `TDSpectra` itself holds no interior mutability.
unsafe impl Sync for PerChipCell {}

impl PerChipCell {
    fn new(spectra: TDSpectra) -> Self {
        Self(UnsafeCell::new(spectra))
    }

    /// # Safety
    /// The caller must be the sole writer entitled to mutate this cell
    /// right now (see the struct-level invariant).
    #[allow(clippy::mut_from_ref)]
    unsafe fn get_mut(&self) -> &mut TDSpectra {
        &mut *self.0.get()
    }
}

struct Slot {
    period: AtomicI64,
    ready_count: AtomicUsize,
    chip_data: Vec<PerChipCell>,
}

/// Fixed-size ring of period slots shared by all of a detector's
/// analyser threads and the single writer thread.
pub struct Manager {
    n_chips: usize,
    slots: Vec<Slot>,
}

impl Manager {
    /// Allocates `n_periods` slots, each with one `TDSpectra` row per
    /// chip, `t_bins x e_points` wide.
    #[must_use]
    pub fn new(n_periods: usize, n_chips: usize, t_bins: usize, e_points: usize) -> Self {
        let slots = (0..n_periods)
            .map(|_| Slot {
                period: AtomicI64::new(Period::UNDEFINED.index()),
                ready_count: AtomicUsize::new(0),
                chip_data: (0..n_chips)
                    .map(|_| PerChipCell::new(TDSpectra::new(t_bins, e_points)))
                    .collect(),
            })
            .collect();
        Self { n_chips, slots }
    }

    /// Finds (or claims) the slot index holding `period`'s data.
    ///
    /// Scans for a slot already claimed for `period`; failing that,
    /// CASes the first `undefined` slot found. If every slot is taken by
    /// other periods, sleeps briefly and retries — a sign the writer is
    /// falling behind or there are too few slots configured.
    pub fn data_for_period(&self, period: Period) -> usize {
        loop {
            let mut free_slot = None;
            for (i, slot) in self.slots.iter().enumerate() {
                let p = slot.period.load(Ordering::Acquire);
                if p == period.index() {
                    return i;
                }
                if free_slot.is_none() && p == Period::UNDEFINED.index() {
                    free_slot = Some(i);
                }
            }
            if let Some(i) = free_slot {
                if self.slots[i]
                    .period
                    .compare_exchange(
                        Period::UNDEFINED.index(),
                        period.index(),
                        Ordering::AcqRel,
                        Ordering::Acquire,
                    )
                    .is_ok()
                {
                    return i;
                }
                continue;
            }
            log::warn!(
                "no free histogram slot for period {}; all {} slots occupied, retrying",
                period.index(),
                self.slots.len()
            );
            std::thread::sleep(Duration::from_micros(50));
        }
    }

    /// Mutably accesses `chip`'s row of `slot`.
    ///
    /// # Safety
    /// The caller must be the analyser thread that owns `chip`, and
    /// must hold `slot` from a `data_for_period` call for the period it
    /// is currently processing on that chip.
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn spectra_mut(&self, slot: usize, chip: usize) -> &mut TDSpectra {
        self.slots[slot].chip_data[chip].get_mut()
    }

    /// Called by `chip`'s analyser when it purges a period from its live
    /// window. Returns `Some(period)` once every chip has released the
    /// slot, signalling the writer should combine and flush it.
    pub fn return_data(&self, slot: usize) -> Option<Period> {
        let count = self.slots[slot].ready_count.fetch_add(1, Ordering::AcqRel) + 1;
        if count == self.n_chips {
            Some(Period::new(self.slots[slot].period.load(Ordering::Acquire)))
        } else {
            None
        }
    }

    /// Combines every chip's row of `slot` into one [`TDSpectra`], then
    /// zeroes the rows and frees the slot.
    ///
    /// Must only be called by the writer thread, and only after
    /// [`Self::return_data`] reported completion for `slot`: that call's
    /// `Acquire` load pairs with every analyser's `AcqRel` release,
    /// making each chip's final write visible here.
    pub fn combine_and_reset(&self, slot: usize) -> (Period, TDSpectra) {
        let period = Period::new(self.slots[slot].period.load(Ordering::Acquire));
        let rows = &self.slots[slot].chip_data;
        // SAFETY: every chip has released this slot (checked by the caller
        // via `return_data`), so no analyser thread still holds a live
        // `&mut` into any of these cells.
        let mut combined = unsafe { rows[0].get_mut().clone() };
        for cell in &rows[1..] {
            let row = unsafe { cell.get_mut() };
            combined.combine(row);
            row.clear();
        }
        unsafe {
            rows[0].get_mut().clear();
        }
        self.slots[slot].ready_count.store(0, Ordering::Release);
        self.slots[slot]
            .period
            .store(Period::UNDEFINED.index(), Ordering::Release);
        (period, combined)
    }

    /// Number of chips (per-thread rows) in each slot.
    #[must_use]
    pub fn n_chips(&self) -> usize {
        self.n_chips
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claims_a_free_slot_and_reuses_it_for_the_same_period() {
        let m = Manager::new(2, 1, 4, 4);
        let s1 = m.data_for_period(Period::new(7));
        let s2 = m.data_for_period(Period::new(7));
        assert_eq!(s1, s2);
    }

    #[test]
    fn different_periods_claim_different_slots() {
        let m = Manager::new(2, 1, 4, 4);
        let s1 = m.data_for_period(Period::new(1));
        let s2 = m.data_for_period(Period::new(2));
        assert_ne!(s1, s2);
    }

    #[test]
    fn return_data_completes_once_every_chip_releases() {
        let m = Manager::new(1, 2, 2, 2);
        let slot = m.data_for_period(Period::new(3));
        assert!(m.return_data(slot).is_none());
        assert_eq!(m.return_data(slot), Some(Period::new(3)));
    }

    #[test]
    fn combine_and_reset_sums_rows_and_frees_the_slot() {
        let m = Manager::new(1, 2, 1, 1);
        let slot = m.data_for_period(Period::new(5));
        unsafe {
            m.spectra_mut(slot, 0).accumulate(0, 0, 2.0);
            m.spectra_mut(slot, 1).accumulate(0, 0, 3.0);
        }
        m.return_data(slot);
        m.return_data(slot);
        let (period, combined) = m.combine_and_reset(slot);
        assert_eq!(period, Period::new(5));
        assert_eq!(combined.counts()[0], 5.0);

        // slot is free again and can be reclaimed for a new period
        let reclaimed = m.data_for_period(Period::new(9));
        assert_eq!(reclaimed, slot);
    }
}
