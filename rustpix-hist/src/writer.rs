//! The histogram-writer collaborator interface and the queue that hands
//! completed slots from analyser threads to the writer thread.

use std::collections::VecDeque;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Condvar, Mutex};

use rustpix_core::Period;

use crate::error::{Error, Result};
use crate::tdspectra::TDSpectra;

/// External collaborator that persists completed period histograms.
/// One instance per run; format and destination are owned entirely by
/// the implementation (file-per-period, TCP push, ...).
pub trait HistogramWriter: Send {
    /// Called once, before the first `write`, naming the detector.
    fn start(&mut self, detector: &str) -> Result<()>;

    /// Persists one completed, combined period histogram.
    fn write(&mut self, histogram: &TDSpectra, period: Period) -> Result<()>;

    /// Called once on shutdown; `error_message` is set if the run ended
    /// abnormally.
    fn stop(&mut self, error_message: Option<&str>) -> Result<()>;

    /// A human-readable description of where output is being written.
    fn dest(&self) -> String;
}

/// A queue of slot indices ready for the writer thread, guarded by a
/// mutex and signalled with a condition variable (the one blocking
/// wait point in the pipeline besides the reader's socket read).
#[derive(Default)]
pub struct WriterQueue {
    state: Mutex<VecDeque<usize>>,
    condvar: Condvar,
}

impl WriterQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(VecDeque::new()),
            condvar: Condvar::new(),
        }
    }

    /// Pushes a ready slot index and wakes the writer thread.
    pub fn push(&self, slot: usize) {
        let mut queue = self.state.lock().expect("writer queue poisoned");
        queue.push_back(slot);
        self.condvar.notify_one();
    }

    /// Blocks until a slot is ready or `stop` becomes true (checked each
    /// time the condition variable wakes); returns `None` on stop with
    /// an empty queue.
    pub fn pop_or_stop(&self, stop: &std::sync::atomic::AtomicBool) -> Option<usize> {
        let mut queue = self.state.lock().expect("writer queue poisoned");
        loop {
            if let Some(slot) = queue.pop_front() {
                return Some(slot);
            }
            if stop.load(std::sync::atomic::Ordering::Acquire) {
                return None;
            }
            let (guard, _timeout) = self
                .condvar
                .wait_timeout(queue, std::time::Duration::from_millis(50))
                .expect("writer queue poisoned");
            queue = guard;
        }
    }
}

/// A simple file-per-period [`HistogramWriter`]: one binary record file
/// named `<period>.tdspectra` under a destination directory.
pub struct FileHistogramWriter {
    dest_dir: PathBuf,
    detector: String,
}

impl FileHistogramWriter {
    /// Creates a writer that will place one file per period under
    /// `dest_dir`.
    #[must_use]
    pub fn new(dest_dir: impl Into<PathBuf>) -> Self {
        Self {
            dest_dir: dest_dir.into(),
            detector: String::new(),
        }
    }

    fn period_path(&self, period: Period) -> PathBuf {
        self.dest_dir.join(format!("{}.tdspectra", period.index()))
    }
}

impl HistogramWriter for FileHistogramWriter {
    fn start(&mut self, detector: &str) -> Result<()> {
        std::fs::create_dir_all(&self.dest_dir)?;
        self.detector = detector.to_string();
        Ok(())
    }

    fn write(&mut self, histogram: &TDSpectra, period: Period) -> Result<()> {
        let path = self.period_path(period);
        let file = std::fs::File::create(&path)?;
        let mut out = BufWriter::new(file);
        out.write_all(&(histogram.t_bins() as u32).to_le_bytes())?;
        out.write_all(&(histogram.e_points() as u32).to_le_bytes())?;
        out.write_all(&histogram.before_roi().to_le_bytes())?;
        out.write_all(&histogram.after_roi().to_le_bytes())?;
        for count in histogram.counts() {
            out.write_all(&count.to_le_bytes())?;
        }
        out.flush()?;
        Ok(())
    }

    fn stop(&mut self, error_message: Option<&str>) -> Result<()> {
        if let Some(msg) = error_message {
            log::warn!("histogram writer stopping after error: {msg}");
        }
        Ok(())
    }

    fn dest(&self) -> String {
        self.dest_dir.display().to_string()
    }
}

/// Batches `save_interval` consecutive completed periods into a single
/// combined write before forwarding to an inner writer, implementing
/// the `save_interval` control-plane knob ("periods per histogram
/// file"). The written period is the last one in each batch.
pub struct BatchingWriter {
    inner: Box<dyn HistogramWriter>,
    save_interval: usize,
    pending: Option<TDSpectra>,
    pending_count: usize,
}

impl BatchingWriter {
    /// Wraps `inner`, flushing every `save_interval` periods (clamped to
    /// at least 1).
    #[must_use]
    pub fn new(inner: Box<dyn HistogramWriter>, save_interval: usize) -> Self {
        Self {
            inner,
            save_interval: save_interval.max(1),
            pending: None,
            pending_count: 0,
        }
    }
}

impl HistogramWriter for BatchingWriter {
    fn start(&mut self, detector: &str) -> Result<()> {
        self.inner.start(detector)
    }

    fn write(&mut self, histogram: &TDSpectra, period: Period) -> Result<()> {
        match &mut self.pending {
            Some(acc) => acc.combine(histogram),
            None => self.pending = Some(histogram.clone()),
        }
        self.pending_count += 1;
        if self.pending_count == self.save_interval {
            let batch = self.pending.take().expect("just accumulated");
            self.pending_count = 0;
            self.inner.write(&batch, period)?;
        }
        Ok(())
    }

    fn stop(&mut self, error_message: Option<&str>) -> Result<()> {
        if self.pending.take().is_some() {
            log::warn!(
                "discarding an incomplete batch of {} period(s) at shutdown",
                self.pending_count
            );
        }
        self.inner.stop(error_message)
    }

    fn dest(&self) -> String {
        self.inner.dest()
    }
}

/// Reads back a file written by [`FileHistogramWriter`], for tests and
/// the `analyze-periods` diagnostic tool.
pub fn read_tdspectra_file(path: impl AsRef<Path>) -> Result<TDSpectra> {
    let bytes = std::fs::read(path)?;
    if bytes.len() < 24 {
        return Err(Error::CorruptArtefact("file too short for header".into()));
    }
    let t_bins = u32::from_le_bytes(bytes[0..4].try_into().unwrap()) as usize;
    let e_points = u32::from_le_bytes(bytes[4..8].try_into().unwrap()) as usize;
    let before_roi = u64::from_le_bytes(bytes[8..16].try_into().unwrap());
    let after_roi = u64::from_le_bytes(bytes[16..24].try_into().unwrap());
    let expected = 24 + t_bins * e_points * 8;
    if bytes.len() != expected {
        return Err(Error::CorruptArtefact(format!(
            "expected {expected} bytes, found {}",
            bytes.len()
        )));
    }
    let mut spectra = TDSpectra::new(t_bins, e_points);
    for (i, chunk) in bytes[24..].chunks_exact(8).enumerate() {
        let value = f64::from_le_bytes(chunk.try_into().unwrap());
        spectra.accumulate(i / e_points, i % e_points, value);
    }
    for _ in 0..before_roi {
        spectra.record_before_roi();
    }
    for _ in 0..after_roi {
        spectra.record_after_roi();
    }
    Ok(spectra)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_writer_round_trips_a_histogram() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = FileHistogramWriter::new(dir.path());
        writer.start("vulcan").unwrap();

        let mut spectra = TDSpectra::new(2, 2);
        spectra.accumulate(0, 1, 4.0);
        spectra.record_before_roi();
        writer.write(&spectra, Period::new(42)).unwrap();
        writer.stop(None).unwrap();

        let path = dir.path().join("42.tdspectra");
        let read_back = read_tdspectra_file(path).unwrap();
        assert_eq!(read_back.counts(), spectra.counts());
        assert_eq!(read_back.before_roi(), 1);
    }

    #[test]
    fn writer_queue_delivers_pushed_slots() {
        let queue = WriterQueue::new();
        let stop = std::sync::atomic::AtomicBool::new(false);
        queue.push(3);
        assert_eq!(queue.pop_or_stop(&stop), Some(3));
    }

    #[test]
    fn writer_queue_unblocks_on_stop() {
        let queue = WriterQueue::new();
        let stop = std::sync::atomic::AtomicBool::new(true);
        assert_eq!(queue.pop_or_stop(&stop), None);
    }

    #[test]
    fn batching_writer_only_flushes_every_save_interval_periods() {
        let dir = tempfile::tempdir().unwrap();
        let inner = Box::new(FileHistogramWriter::new(dir.path()));
        let mut writer = BatchingWriter::new(inner, 3);
        writer.start("vulcan").unwrap();

        let mut spectra = TDSpectra::new(1, 1);
        spectra.accumulate(0, 0, 1.0);

        writer.write(&spectra, Period::new(1)).unwrap();
        writer.write(&spectra, Period::new(2)).unwrap();
        assert!(!dir.path().join("2.tdspectra").exists());

        writer.write(&spectra, Period::new(3)).unwrap();
        let combined = read_tdspectra_file(dir.path().join("3.tdspectra")).unwrap();
        assert_eq!(combined.counts()[0], 3.0);
    }
}
