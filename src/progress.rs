use std::io::Read;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::cancel::Cancel;
use crate::config::{CANCEL_POLL_INTERVAL, PROGRESS_INTERVAL};

/// A snapshot of how far the compressed source has been consumed.
///
/// Delivered to the caller's progress callback every
/// [`PROGRESS_INTERVAL`](crate::config::PROGRESS_INTERVAL). The counter sits
/// on the compressed stream, so `bytes_read` can be compared against the
/// download size even while decompression runs ahead.
#[derive(Debug, Clone, PartialEq)]
pub struct Progress {
    /// Compressed bytes consumed so far.
    pub bytes_read: u64,
    /// Advertised size of the compressed source, when known.
    pub total_bytes: Option<u64>,
    /// Time since processing started.
    pub elapsed: Duration,
    /// Average compressed throughput in bytes per second.
    pub rate: f64,
}

/// Progress callback signature. Called from a dedicated metering thread.
pub type ProgressFn = Box<dyn Fn(&Cancel, &Progress) + Send + Sync>;

/// Reader wrapper counting every byte that passes through it.
pub(crate) struct CountingReader<R> {
    inner: R,
    count: Arc<AtomicU64>,
}

impl<R: Read> CountingReader<R> {
    pub(crate) fn new(inner: R, count: Arc<AtomicU64>) -> Self {
        Self { inner, count }
    }
}

impl<R: Read> Read for CountingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.count.fetch_add(n as u64, Ordering::Relaxed);
        Ok(n)
    }
}

/// Metering loop: emits a progress tick every interval until the pipeline
/// reports completion or the token is cancelled. Advisory only, it never
/// blocks any pipeline stage.
pub(crate) fn run_ticker(
    cancel: &Cancel,
    done: &AtomicBool,
    count: &AtomicU64,
    total: &Mutex<Option<u64>>,
    started: Instant,
    callback: &(dyn Fn(&Cancel, &Progress) + Send + Sync),
) {
    let mut last_tick = Instant::now();
    while !done.load(Ordering::Acquire) && !cancel.is_cancelled() {
        std::thread::sleep(CANCEL_POLL_INTERVAL);
        if last_tick.elapsed() < PROGRESS_INTERVAL {
            continue;
        }
        last_tick = Instant::now();
        callback(cancel, &snapshot(count, total, started));
    }
}

fn snapshot(count: &AtomicU64, total: &Mutex<Option<u64>>, started: Instant) -> Progress {
    let bytes_read = count.load(Ordering::Relaxed);
    let elapsed = started.elapsed();
    let secs = elapsed.as_secs_f64();
    Progress {
        bytes_read,
        total_bytes: total.lock().map(|t| *t).unwrap_or(None),
        elapsed,
        rate: if secs > 0.0 { bytes_read as f64 / secs } else { 0.0 },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counting_reader_tracks_bytes() {
        let data = vec![7u8; 1000];
        let count = Arc::new(AtomicU64::new(0));
        let mut reader = CountingReader::new(&data[..], Arc::clone(&count));
        let mut sink = Vec::new();
        reader.read_to_end(&mut sink).unwrap();
        assert_eq!(count.load(Ordering::Relaxed), 1000);
        assert_eq!(sink.len(), 1000);
    }

    #[test]
    fn snapshot_reports_rate_and_total() {
        let count = AtomicU64::new(4096);
        let total = Mutex::new(Some(8192));
        let started = Instant::now() - Duration::from_secs(2);
        let progress = snapshot(&count, &total, started);
        assert_eq!(progress.bytes_read, 4096);
        assert_eq!(progress.total_bytes, Some(8192));
        assert!(progress.rate > 0.0);
        assert!(progress.elapsed >= Duration::from_secs(2));
    }
}
