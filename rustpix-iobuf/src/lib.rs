//! rustpix-iobuf: the per-chip bounded IO buffer pool that hands filled
//! chunks from the reader thread to each chip's analyser thread.
//!
//! The pool is the one place in the pipeline where the spin-lock
//! discipline (busy-poll, then yield, then sleep) applies: jitter below
//! a few microseconds matters here, and the two sides are expected to
//! be pinned to distinct cores.

mod buffer;
mod pool;
mod spinlock;

pub use buffer::IoBuffer;
pub use pool::BufferPool;
pub use spinlock::SpinLock;
