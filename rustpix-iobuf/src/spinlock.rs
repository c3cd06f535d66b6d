//! The spin-lock discipline shared by both sides of a buffer pool.
//!
//! Holding time under these locks must stay O(10) operations (a map
//! insert/remove, a `Vec` push/pop) — never I/O. Acquisition escalates
//! through three phases: a short burst of busy polling, then yielding
//! the thread, then a brief sleep, repeating until the lock is free.

use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

/// Busy-poll attempts before yielding the thread.
const SPIN_COUNT: u32 = 8;
/// Thread-yield attempts before sleeping.
const YIELD_COUNT: u32 = 128;
/// Sleep duration once spinning and yielding have both failed.
const SLEEP_DURATION: Duration = Duration::from_nanos(3);

/// A mutex whose acquisition follows the spin/yield/sleep escalation
/// policy instead of parking the thread immediately.
#[derive(Debug, Default)]
pub struct SpinLock<T> {
    inner: Mutex<T>,
}

impl<T> SpinLock<T> {
    /// Wraps `value` behind a new spin lock.
    pub fn new(value: T) -> Self {
        Self {
            inner: Mutex::new(value),
        }
    }

    /// Acquires the lock, escalating through busy-poll, yield, and sleep
    /// phases as contention persists.
    pub fn lock(&self) -> MutexGuard<'_, T> {
        for _ in 0..SPIN_COUNT {
            if let Ok(guard) = self.inner.try_lock() {
                return guard;
            }
            std::hint::spin_loop();
        }
        for _ in 0..YIELD_COUNT {
            if let Ok(guard) = self.inner.try_lock() {
                return guard;
            }
            std::thread::yield_now();
        }
        loop {
            if let Ok(guard) = self.inner.try_lock() {
                return guard;
            }
            std::thread::sleep(SLEEP_DURATION);
        }
    }
}
