//! Per-chip bounded buffer pool: one reader (producer), one analyser
//! (consumer), two spin locks.

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};

use crate::buffer::IoBuffer;
use crate::spinlock::SpinLock;

/// A per-chip pool of [`IoBuffer`]s shared by exactly one producer
/// (reader thread) and one consumer (analyser thread).
///
/// The "full" side is an ordered multimap keyed by `packet_id`, so the
/// consumer always observes buffers in non-decreasing stream order even
/// though several buffers may share `packet_id = 0` on servers older
/// than protocol 3.20. The "free" side is a LIFO stack.
pub struct BufferPool {
    buffer_capacity: usize,
    free: SpinLock<Vec<IoBuffer>>,
    full: SpinLock<BTreeMap<u64, VecDeque<IoBuffer>>>,
    no_more_data: AtomicBool,
}

impl BufferPool {
    /// Creates an empty pool whose buffers are allocated with
    /// `buffer_capacity` bytes on demand.
    #[must_use]
    pub fn new(buffer_capacity: usize) -> Self {
        Self {
            buffer_capacity,
            free: SpinLock::new(Vec::new()),
            full: SpinLock::new(BTreeMap::new()),
            no_more_data: AtomicBool::new(false),
        }
    }

    /// Pops a buffer from the free-list, allocating a fresh one if it is
    /// empty. Always returns a buffer with `content_size == 0`.
    pub fn get_empty_buffer(&self) -> IoBuffer {
        let mut buf = {
            let mut free = self.free.lock();
            free.pop()
        }
        .unwrap_or_else(|| IoBuffer::new(self.buffer_capacity));
        buf.reset();
        buf
    }

    /// Hands a filled buffer to the consumer side, keyed by the
    /// stream-order `packet_id` it belongs to.
    pub fn put_nonempty_buffer(&self, packet_id: u64, buf: IoBuffer) {
        let mut full = self.full.lock();
        full.entry(packet_id).or_default().push_back(buf);
    }

    /// Extracts the lowest-`packet_id` buffer. Spin-retries (no
    /// condvar) while the pool is empty and more data is expected;
    /// returns `None` once the map is empty and [`Self::finish_writing`]
    /// has been called.
    pub fn get_nonempty_buffer(&self) -> Option<(u64, IoBuffer)> {
        loop {
            {
                let mut full = self.full.lock();
                match full.keys().next().copied() {
                    Some(packet_id) => {
                        let queue = full.get_mut(&packet_id).expect("key just observed");
                        let buf = queue.pop_front().expect("non-empty queue");
                        if queue.is_empty() {
                            full.remove(&packet_id);
                        }
                        return Some((packet_id, buf));
                    }
                    None if self.no_more_data.load(Ordering::Acquire) => return None,
                    None => {}
                }
            }
            std::hint::spin_loop();
        }
    }

    /// Returns a drained buffer to the free-list.
    pub fn return_empty_buffer(&self, mut buf: IoBuffer) {
        buf.reset();
        self.free.lock().push(buf);
    }

    /// Signals that the reader has stopped producing; the next drain
    /// loop returns `None` once the full map empties.
    pub fn finish_writing(&self) {
        log::debug!("buffer pool draining, no further chunks expected");
        self.no_more_data.store(true, Ordering::Release);
    }

    /// True once [`Self::finish_writing`] has been called.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.no_more_data.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_buffer_round_trips_through_free_list() {
        let pool = BufferPool::new(32);
        let buf = pool.get_empty_buffer();
        assert_eq!(buf.content_size(), 0);
        pool.return_empty_buffer(buf);
        let buf2 = pool.get_empty_buffer();
        assert_eq!(buf2.capacity(), 32);
    }

    #[test]
    fn nonempty_buffers_drain_in_packet_id_order() {
        let pool = BufferPool::new(8);
        let a = pool.get_empty_buffer();
        let b = pool.get_empty_buffer();
        pool.put_nonempty_buffer(2, a);
        pool.put_nonempty_buffer(1, b);
        let (id1, _) = pool.get_nonempty_buffer().unwrap();
        let (id2, _) = pool.get_nonempty_buffer().unwrap();
        assert_eq!(id1, 1);
        assert_eq!(id2, 2);
    }

    #[test]
    fn duplicate_packet_ids_preserve_insertion_order() {
        let pool = BufferPool::new(8);
        let mut a = pool.get_empty_buffer();
        a.begin_chunk(0, 8);
        a.advance(1);
        let mut b = pool.get_empty_buffer();
        b.begin_chunk(8, 8);
        b.advance(2);
        pool.put_nonempty_buffer(0, a);
        pool.put_nonempty_buffer(0, b);
        let (_, first) = pool.get_nonempty_buffer().unwrap();
        let (_, second) = pool.get_nonempty_buffer().unwrap();
        assert_eq!(first.content_size(), 1);
        assert_eq!(second.content_size(), 2);
    }

    #[test]
    fn finish_writing_unblocks_drained_consumer() {
        let pool = BufferPool::new(8);
        pool.finish_writing();
        assert!(pool.get_nonempty_buffer().is_none());
    }
}
