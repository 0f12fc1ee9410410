//! Progress reporting for a download job.
//!
//! Workers bump atomic counters; a reporter thread polls them and feeds a
//! caller-supplied callback, so rendering never slows the workers down.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Default poll interval of the reporter thread.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Point-in-time job progress.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgressSnapshot {
    /// Plaintext bytes resolved (written, resumed, or copied).
    pub bytes_done: u64,
    pub total_bytes: u64,
    /// Chunk destinations resolved, failures included.
    pub chunks_done: u64,
    pub total_chunks: u64,
    /// Raw bytes received from content servers.
    pub bytes_downloaded: u64,
}

/// Progress callback invoked from the reporter thread.
pub type ProgressCallback = Box<dyn Fn(ProgressSnapshot) + Send + Sync>;

/// Shared progress counters.
#[derive(Debug, Default)]
pub struct ProgressCounters {
    bytes_done: AtomicU64,
    chunks_done: AtomicU64,
    bytes_downloaded: AtomicU64,
    total_bytes: AtomicU64,
    total_chunks: AtomicU64,
    done: AtomicBool,
}

impl ProgressCounters {
    pub fn new(total_bytes: u64, total_chunks: u64) -> Self {
        Self {
            total_bytes: AtomicU64::new(total_bytes),
            total_chunks: AtomicU64::new(total_chunks),
            ..Default::default()
        }
    }

    /// Record one resolved chunk destination.
    pub fn add_chunk(&self, bytes: u64) {
        self.bytes_done.fetch_add(bytes, Ordering::Relaxed);
        self.chunks_done.fetch_add(1, Ordering::Relaxed);
    }

    /// Record raw bytes received.
    pub fn add_downloaded(&self, bytes: u64) {
        self.bytes_downloaded.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            bytes_done: self.bytes_done.load(Ordering::Relaxed),
            total_bytes: self.total_bytes.load(Ordering::Relaxed),
            chunks_done: self.chunks_done.load(Ordering::Relaxed),
            total_chunks: self.total_chunks.load(Ordering::Relaxed),
            bytes_downloaded: self.bytes_downloaded.load(Ordering::Relaxed),
        }
    }

    /// Signal that the job is done.
    pub fn signal_done(&self) {
        self.done.store(true, Ordering::SeqCst);
    }

    pub fn is_done(&self) -> bool {
        self.done.load(Ordering::SeqCst)
    }
}

/// Background thread that polls counters and invokes the callback.
///
/// Dropping the reporter stops the thread after one final report.
pub struct ProgressReporter {
    handle: Option<JoinHandle<()>>,
    counters: Arc<ProgressCounters>,
}

impl ProgressReporter {
    pub fn start(
        counters: Arc<ProgressCounters>,
        callback: Arc<ProgressCallback>,
        poll_interval: Duration,
    ) -> Self {
        let counters_clone = Arc::clone(&counters);

        let handle = thread::spawn(move || {
            while !counters_clone.is_done() {
                callback(counters_clone.snapshot());
                thread::sleep(poll_interval);
            }

            // Final report
            callback(counters_clone.snapshot());
        });

        Self {
            handle: Some(handle),
            counters,
        }
    }

    /// Stop the reporter and wait for it to finish.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.counters.signal_done();
        if let Some(handle) = self.handle.take() {
            handle.join().ok();
        }
    }
}

impl Drop for ProgressReporter {
    fn drop(&mut self) {
        self.shutdown();
    }
}
