//! Single-chip TOA reorder queue.
//!
//! Hits arrive from the detector roughly, but not exactly, in time order
//! (the SPIDR readout interleaves pixel columns). A per-chip reorder
//! queue buffers hits in a min-heap keyed by ascending TOA so that
//! period attribution downstream sees a time-ordered sequence within
//! the window the queue spans. This queue is single-threaded: exactly
//! one analyser thread owns it per chip.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// A buffered hit, ordered by ascending TOA (min-heap via reversed `Ord`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Entry {
    toa: i64,
    raw: u64,
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; reverse so the smallest TOA sorts first.
        other.toa.cmp(&self.toa)
    }
}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A min-heap of raw hit words ordered by ascending TOA.
#[derive(Debug, Default)]
pub struct ReorderQueue {
    heap: BinaryHeap<Entry>,
}

impl ReorderQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
        }
    }

    /// Pushes a raw hit word keyed by its TOA.
    pub fn push(&mut self, toa: i64, raw: u64) {
        self.heap.push(Entry { toa, raw });
    }

    /// Returns the raw word with the smallest TOA without removing it.
    #[must_use]
    pub fn top(&self) -> Option<u64> {
        self.heap.peek().map(|e| e.raw)
    }

    /// Returns the smallest TOA currently queued, without removing it.
    #[must_use]
    pub fn top_toa(&self) -> Option<i64> {
        self.heap.peek().map(|e| e.toa)
    }

    /// Removes and returns the raw word with the smallest TOA.
    pub fn pop(&mut self) -> Option<u64> {
        self.heap.pop().map(|e| e.raw)
    }

    /// True if the queue holds no hits.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Number of hits currently queued.
    #[must_use]
    pub fn len(&self) -> usize {
        self.heap.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pops_in_ascending_toa_order() {
        let mut q = ReorderQueue::new();
        q.push(300, 3);
        q.push(100, 1);
        q.push(200, 2);
        assert_eq!(q.pop(), Some(1));
        assert_eq!(q.pop(), Some(2));
        assert_eq!(q.pop(), Some(3));
        assert!(q.pop().is_none());
    }

    #[test]
    fn top_does_not_remove() {
        let mut q = ReorderQueue::new();
        q.push(50, 9);
        assert_eq!(q.top(), Some(9));
        assert_eq!(q.len(), 1);
        assert_eq!(q.top_toa(), Some(50));
    }

    #[test]
    fn empty_queue_reports_empty() {
        let q = ReorderQueue::new();
        assert!(q.is_empty());
        assert_eq!(q.top(), None);
    }
}
