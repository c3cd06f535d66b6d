//! `DataHandler`: owns the per-chip buffer pools and orchestrates the
//! reader thread, one analyser thread per chip, and the writer thread.

use std::io::Read;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use rustpix_hist::{HistogramWriter, Manager, WriterQueue};
use rustpix_iobuf::BufferPool;

use crate::analyser::run_analyser;
use crate::context::RunContext;
use crate::error::Result;
use crate::reader::run_reader;

/// Owns the per-chip IO buffer pools and drives the reader/analyser/
/// writer thread topology for one detector connection.
pub struct DataHandler {
    ctx: Arc<RunContext>,
    manager: Arc<Manager>,
    pools: Vec<Arc<BufferPool>>,
    writer_queue: Arc<WriterQueue>,
}

impl DataHandler {
    /// Allocates the per-chip buffer pools for `ctx.config.n_chips` chips.
    #[must_use]
    pub fn new(ctx: Arc<RunContext>, manager: Arc<Manager>) -> Self {
        let pools = (0..ctx.config.n_chips)
            .map(|_| Arc::new(BufferPool::new(ctx.config.buffer_capacity)))
            .collect();
        Self {
            ctx,
            manager,
            pools,
            writer_queue: Arc::new(WriterQueue::new()),
        }
    }

    /// Runs the full pipeline against `stream` to completion: spawns
    /// one analyser thread per chip, a writer thread, waits for all
    /// analysers to report ready, then runs the reader loop on the
    /// calling thread. Blocks until the reader and every analyser have
    /// exited, and the writer has drained the queue and stopped.
    ///
    /// # Errors
    /// Returns the reader's error, if any; analyser and writer errors
    /// are published to `ctx.last_error()` and joined but not
    /// propagated here (each thread already called `ctx.set_error`).
    pub fn run<R: Read>(
        &self,
        stream: R,
        detector_name: &str,
        has_packet_id: bool,
        mut writer: Box<dyn HistogramWriter>,
    ) -> Result<()> {
        writer.start(detector_name)?;

        let analyser_handles: Vec<JoinHandle<Result<()>>> = (0..self.pools.len())
            .map(|chip| {
                let pool = Arc::clone(&self.pools[chip]);
                let ctx = Arc::clone(&self.ctx);
                let manager = Arc::clone(&self.manager);
                let writer_queue = Arc::clone(&self.writer_queue);
                thread::Builder::new()
                    .name(format!("rustpix-analyser-{chip}"))
                    .spawn(move || run_analyser(chip, pool, ctx, manager, writer_queue))
                    .expect("failed to spawn analyser thread")
            })
            .collect();

        let writer_stop = Arc::new(AtomicBool::new(false));
        let writer_handle = {
            let ctx = Arc::clone(&self.ctx);
            let manager = Arc::clone(&self.manager);
            let writer_queue = Arc::clone(&self.writer_queue);
            let writer_stop = Arc::clone(&writer_stop);
            thread::Builder::new()
                .name("rustpix-writer".into())
                .spawn(move || run_writer(&ctx, &manager, &writer_queue, &writer_stop, writer))
                .expect("failed to spawn writer thread")
        };

        // Reader spins until every analyser reports ready before the
        // first socket read, matching the handshake in §5.
        while !self.ctx.all_analysers_ready() {
            if self.ctx.is_stopping() {
                break;
            }
            thread::yield_now();
        }

        let reader_result = run_reader(stream, &self.ctx, &self.pools, has_packet_id);

        for handle in analyser_handles {
            let _ = handle.join().expect("analyser thread panicked");
        }
        writer_stop.store(true, Ordering::Release);
        self.writer_queue.push(usize::MAX); // wake the writer to re-check stop
        writer_handle.join().expect("writer thread panicked");

        reader_result
    }

    /// Requests cooperative shutdown of the whole pipeline.
    pub fn stop_now(&self) {
        self.ctx.stop_now();
    }
}

fn run_writer(
    ctx: &RunContext,
    manager: &Manager,
    writer_queue: &WriterQueue,
    stop: &AtomicBool,
    mut writer: Box<dyn HistogramWriter>,
) {
    loop {
        let Some(slot) = writer_queue.pop_or_stop(stop) else {
            break;
        };
        if slot == usize::MAX {
            continue;
        }
        let (period, combined) = manager.combine_and_reset(slot);
        if let Err(e) = writer.write(&combined, period) {
            log::error!("histogram writer failed: {e}");
            ctx.set_error(e.to_string());
            let _ = writer.stop(Some(&e.to_string()));
            return;
        }
        thread::sleep(Duration::from_nanos(0));
    }
    let err = ctx.last_error();
    let _ = writer.stop(err.as_deref());
}
