//! Job outcome: per-file status, failed chunks, and statistics.

use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::fetch::{ChunkError, ErrorClass};
use crate::manifest::{ChunkId, Manifest};

/// Final state of one manifest entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileStatus {
    /// Every chunk is on disk and verified.
    Complete,
    /// At least one chunk failed permanently; the rest were written.
    PartiallyFailed,
    /// The file could not be opened or written.
    Failed,
    /// The job was cancelled before all chunks were resolved.
    Incomplete,
}

impl fmt::Display for FileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Complete => "complete",
            Self::PartiallyFailed => "partially failed",
            Self::Failed => "failed",
            Self::Incomplete => "incomplete",
        };
        f.write_str(s)
    }
}

/// Why a chunk failed permanently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// Retries exhausted on transport errors.
    Network,
    /// No content server was enabled.
    HostsExhausted,
    /// Every retry decoded to the wrong content.
    Integrity,
    /// No server returned a decodable payload; likely a wrong key.
    Undecodable,
    /// The destination file could not be written.
    Disk,
}

impl FailureKind {
    pub fn from_class(class: ErrorClass) -> Self {
        match class {
            ErrorClass::Network => Self::Network,
            ErrorClass::NoHost => Self::HostsExhausted,
            ErrorClass::Integrity => Self::Integrity,
            ErrorClass::Undecodable => Self::Undecodable,
        }
    }

    /// Kind for a chunk error; `None` for cancellation.
    pub fn from_error(error: &ChunkError) -> Option<Self> {
        error.class().map(Self::from_class)
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Network => "network",
            Self::HostsExhausted => "no server available",
            Self::Integrity => "integrity",
            Self::Undecodable => "undecodable (wrong key?)",
            Self::Disk => "disk",
        };
        f.write_str(s)
    }
}

/// A chunk destination that could not be satisfied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedChunk {
    pub file: PathBuf,
    pub chunk: ChunkId,
    pub offset: u64,
    pub kind: FailureKind,
    pub message: String,
}

/// Outcome for one manifest entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileReport {
    pub path: PathBuf,
    pub status: FileStatus,
    pub chunks_total: usize,
    pub chunks_done: usize,
    /// File-level error, for `Failed`.
    pub error: Option<String>,
}

/// Aggregate counters of a job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JobStats {
    /// Distinct chunks in the manifest.
    pub chunks_total: u64,
    /// Distinct chunks obtained over the network.
    pub chunks_fetched: u64,
    /// Destinations already verified on disk.
    pub chunks_resumed: u64,
    /// Destinations filled from another verified destination.
    pub chunks_copied: u64,
    pub fetch_requests: u64,
    pub bytes_downloaded: u64,
    pub bytes_written: u64,
}

/// Everything a job produced.
#[derive(Debug, Clone, Default)]
pub struct JobResult {
    pub files: Vec<FileReport>,
    pub failures: Vec<FailedChunk>,
    pub warnings: Vec<String>,
    pub stats: JobStats,
    pub cancelled: bool,
}

impl JobResult {
    /// Whether every file is complete.
    pub fn is_success(&self) -> bool {
        !self.cancelled && self.files.iter().all(|f| f.status == FileStatus::Complete)
    }

    /// Process exit status: 0 on full success, 1 otherwise.
    pub fn exit_code(&self) -> i32 {
        if self.is_success() {
            0
        } else {
            1
        }
    }

    pub fn count(&self, status: FileStatus) -> usize {
        self.files.iter().filter(|f| f.status == status).count()
    }

    pub fn failures_of(&self, kind: FailureKind) -> impl Iterator<Item = &FailedChunk> {
        self.failures.iter().filter(move |f| f.kind == kind)
    }

    pub fn file(&self, path: impl Into<PathBuf>) -> Option<&FileReport> {
        let path = path.into();
        self.files.iter().find(|f| f.path == path)
    }
}

/// Atomic counters behind [`JobStats`].
#[derive(Debug, Default)]
pub(crate) struct StatsCounters {
    pub chunks_fetched: AtomicU64,
    pub chunks_resumed: AtomicU64,
    pub chunks_copied: AtomicU64,
    pub fetch_requests: AtomicU64,
    pub bytes_downloaded: AtomicU64,
    pub bytes_written: AtomicU64,
}

impl StatsCounters {
    pub fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    pub fn snapshot(&self, chunks_total: u64) -> JobStats {
        JobStats {
            chunks_total,
            chunks_fetched: self.chunks_fetched.load(Ordering::Relaxed),
            chunks_resumed: self.chunks_resumed.load(Ordering::Relaxed),
            chunks_copied: self.chunks_copied.load(Ordering::Relaxed),
            fetch_requests: self.fetch_requests.load(Ordering::Relaxed),
            bytes_downloaded: self.bytes_downloaded.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Default)]
struct FileState {
    total: usize,
    done: usize,
    failed: usize,
    error: Option<String>,
}

/// Per-file bookkeeping shared by the workers.
#[derive(Debug)]
pub(crate) struct Ledger {
    paths: Vec<PathBuf>,
    files: Mutex<Vec<FileState>>,
    failures: Mutex<Vec<FailedChunk>>,
}

impl Ledger {
    pub fn new(manifest: &Manifest) -> Self {
        let files = manifest
            .files
            .iter()
            .map(|f| FileState {
                total: f.chunks.len(),
                ..Default::default()
            })
            .collect();
        Self {
            paths: manifest.files.iter().map(|f| f.path.clone()).collect(),
            files: Mutex::new(files),
            failures: Mutex::new(Vec::new()),
        }
    }

    pub fn path(&self, file: usize) -> &PathBuf {
        &self.paths[file]
    }

    /// A destination of `file` is on disk and verified.
    pub fn resolve(&self, file: usize) {
        self.files.lock()[file].done += 1;
    }

    /// A destination of `file` failed permanently.
    pub fn fail_chunk(&self, file: usize, chunk: ChunkId, offset: u64, kind: FailureKind, message: String) {
        self.files.lock()[file].failed += 1;
        self.failures.lock().push(FailedChunk {
            file: self.paths[file].clone(),
            chunk,
            offset,
            kind,
            message,
        });
    }

    /// The file itself is unusable.
    pub fn fail_file(&self, file: usize, error: String) {
        let mut files = self.files.lock();
        if files[file].error.is_none() {
            files[file].error = Some(error);
        }
    }

    pub fn is_failed(&self, file: usize) -> bool {
        self.files.lock()[file].error.is_some()
    }

    /// Build the per-file reports and the failure list.
    pub fn finish(self) -> (Vec<FileReport>, Vec<FailedChunk>) {
        let files = self.files.into_inner();
        let reports = files
            .into_iter()
            .zip(self.paths)
            .map(|(state, path)| {
                let status = if state.error.is_some() {
                    FileStatus::Failed
                } else if state.failed > 0 {
                    FileStatus::PartiallyFailed
                } else if state.done >= state.total {
                    FileStatus::Complete
                } else {
                    FileStatus::Incomplete
                };
                FileReport {
                    path,
                    status,
                    chunks_total: state.total,
                    chunks_done: state.done,
                    error: state.error,
                }
            })
            .collect();

        let mut failures = self.failures.into_inner();
        failures.sort_by(|a, b| a.file.cmp(&b.file).then(a.offset.cmp(&b.offset)));
        (reports, failures)
    }
}
