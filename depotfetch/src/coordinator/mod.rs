//! Job orchestration.
//!
//! [`DownloadCoordinator`] runs one depot download from start to finish:
//!
//! 1. Validate the manifest and resolve the depot key.
//! 2. Open one [`FileWriter`] per file and create directory entries.
//! 3. Group chunk references by hash into [`WorkItem`]s.
//! 4. Resume scan (parallel): destinations already on disk are satisfied;
//!    an item with some verified destinations fills the others locally.
//! 5. A fixed pool of worker threads drains the [`WorkQueue`], fetching each
//!    remaining item once and writing it to every pending destination.
//! 6. Sync files and build the [`JobResult`].
//!
//! Per-chunk and per-file failures never abort the job; they are recorded and
//! unrelated work continues.

mod progress;
mod result;
mod work;


pub use progress::{
    ProgressCallback, ProgressCounters, ProgressReporter, ProgressSnapshot, DEFAULT_POLL_INTERVAL,
};
pub use result::{FailedChunk, FailureKind, FileReport, FileStatus, JobResult, JobStats};
pub use work::{build_work_set, Destination, WorkItem, WorkQueue};

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

use rayon::prelude::*;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::{DepotError, DepotResult};
use crate::fetch::{ChunkFetcher, HttpClient, RetryPolicy};
use crate::host::HostPool;
use crate::keystore::{DistributionUnit, KeyStore};
use crate::manifest::{validate, ChunkId, Manifest};
use crate::processor::ChunkProcessor;
use crate::writer::FileWriter;
use result::{Ledger, StatsCounters};

/// Default number of worker threads.
pub const DEFAULT_CONCURRENCY: usize = 32;

/// Tunables for a job.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Directory the depot is reconstructed under.
    pub output_root: PathBuf,
    /// Worker threads.
    pub concurrency: usize,
    pub retry: RetryPolicy,
}

impl CoordinatorConfig {
    pub fn new(output_root: PathBuf) -> Self {
        Self {
            output_root,
            concurrency: DEFAULT_CONCURRENCY,
            retry: RetryPolicy::default(),
        }
    }

    /// Set the worker count (minimum 1).
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Exponential backoff with the given number of attempts.
    pub fn with_max_attempts(self, max_attempts: u32) -> Self {
        self.with_retry_policy(RetryPolicy::exponential(max_attempts))
    }
}

/// Shared state of one running job.
struct Job<'a> {
    writers: &'a [Option<FileWriter>],
    ledger: &'a Ledger,
    stats: &'a StatsCounters,
    counters: &'a ProgressCounters,
}

/// Runs download and verification jobs.
pub struct DownloadCoordinator {
    config: CoordinatorConfig,
    client: Arc<dyn HttpClient>,
    processor: ChunkProcessor,
    cancel: CancellationToken,
    progress: Option<Arc<ProgressCallback>>,
}

impl DownloadCoordinator {
    pub fn new(config: CoordinatorConfig, client: Arc<dyn HttpClient>) -> Self {
        Self {
            config,
            client,
            processor: ChunkProcessor::default(),
            cancel: CancellationToken::new(),
            progress: None,
        }
    }

    /// Use a different decrypt/decompress pipeline.
    pub fn with_processor(mut self, processor: ChunkProcessor) -> Self {
        self.processor = processor;
        self
    }

    /// Stop the job when `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Report progress to `callback` from a background thread.
    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(Arc::new(callback));
        self
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Token that cancels running jobs.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Download every file of `manifest` under the output root.
    ///
    /// Fails early only if the manifest is invalid, the key is unknown, or
    /// the output root cannot be created. Everything else is reported in the
    /// returned [`JobResult`].
    pub fn run(
        &self,
        manifest: &Manifest,
        keys: &KeyStore,
        hosts: &HostPool,
    ) -> DepotResult<JobResult> {
        validate(manifest)?;
        let unit = DistributionUnit::resolve(manifest, keys)?;
        let root = &self.config.output_root;
        fs::create_dir_all(root).map_err(|e| DepotError::Io {
            path: root.clone(),
            source: e,
        })?;

        info!(
            depot = unit.depot_id,
            manifest = unit.manifest_id,
            files = manifest.files.len(),
            chunks = manifest.chunk_refs(),
            distinct = manifest.distinct_chunks(),
            bytes = manifest.total_size(),
            output = %root.display(),
            "starting download"
        );

        let ledger = Ledger::new(manifest);
        let writers = self.open_writers(manifest, &ledger);
        let items = build_work_set(manifest);
        let chunks_total = items.len() as u64;

        let stats = StatsCounters::default();
        let counters = Arc::new(ProgressCounters::new(
            manifest.total_size(),
            manifest.chunk_refs() as u64,
        ));
        let reporter = self.progress.as_ref().map(|cb| {
            ProgressReporter::start(Arc::clone(&counters), Arc::clone(cb), DEFAULT_POLL_INTERVAL)
        });

        let job = Job {
            writers: &writers,
            ledger: &ledger,
            stats: &stats,
            counters: &counters,
        };

        let pending: Vec<WorkItem> = items
            .into_par_iter()
            .filter_map(|item| job.resume(item))
            .collect();
        debug!(pending = pending.len(), "resume scan finished");

        let queue = WorkQueue::new(pending);
        let fetcher = ChunkFetcher::new(
            self.client.as_ref(),
            hosts,
            &self.processor,
            &self.config.retry,
            unit.depot_id,
            &unit.key,
        );
        let workers = self.config.concurrency.max(1).min(queue.len());

        thread::scope(|s| {
            for _ in 0..workers {
                s.spawn(|| {
                    while !self.cancel.is_cancelled() {
                        let Some(item) = queue.pop() else { break };
                        job.fetch(&fetcher, item, &self.cancel);
                    }
                });
            }
        });

        let cancelled = self.cancel.is_cancelled();
        if cancelled {
            let abandoned = queue.drain().len();
            warn!(abandoned, "download cancelled");
        }

        for (file, writer) in writers.iter().enumerate() {
            if let Some(writer) = writer {
                if let Err(e) = writer.sync() {
                    error!(error = %e, "failed to sync file");
                    ledger.fail_file(file, e.to_string());
                }
            }
        }

        if let Some(reporter) = reporter {
            reporter.stop();
        }
        drop(writers);

        let (files, failures) = ledger.finish();
        let mut warnings = Vec::new();
        if hosts.was_exhausted() {
            let failed_fast = failures
                .iter()
                .filter(|f| f.kind == FailureKind::HostsExhausted)
                .count();
            warnings.push(format!(
                "all content servers were disabled; {} chunk destinations failed without a request",
                failed_fast
            ));
        }

        let result = JobResult {
            files,
            failures,
            warnings,
            stats: stats.snapshot(chunks_total),
            cancelled,
        };
        info!(
            complete = result.count(FileStatus::Complete),
            partially_failed = result.count(FileStatus::PartiallyFailed),
            failed = result.count(FileStatus::Failed),
            incomplete = result.count(FileStatus::Incomplete),
            fetched = result.stats.chunks_fetched,
            resumed = result.stats.chunks_resumed,
            downloaded = result.stats.bytes_downloaded,
            "download finished"
        );
        Ok(result)
    }

    /// Check which files under the output root already match the manifest.
    ///
    /// No network access and no file is modified. Files with unverified
    /// chunks are reported `Incomplete`.
    pub fn verify(&self, manifest: &Manifest) -> DepotResult<JobResult> {
        validate(manifest)?;
        let root = &self.config.output_root;
        let ledger = Ledger::new(manifest);
        let stats = StatsCounters::default();

        manifest
            .files
            .par_iter()
            .enumerate()
            .for_each(|(file, entry)| {
                if entry.is_directory() {
                    return;
                }
                let reader = match FileWriter::inspect(root, entry) {
                    Ok(Some(reader)) => reader,
                    Ok(None) => return,
                    Err(e) => {
                        ledger.fail_file(file, e.to_string());
                        return;
                    }
                };
                for chunk in &entry.chunks {
                    let len = chunk.identity.original_len as usize;
                    if reader.verify_existing(chunk.offset, len, &chunk.identity.id) {
                        ledger.resolve(file);
                        StatsCounters::add(&stats.chunks_resumed, 1);
                    }
                }
            });

        let (mut files, failures) = ledger.finish();
        for (report, entry) in files.iter_mut().zip(&manifest.files) {
            let path = root.join(&entry.path);
            let present = if entry.is_directory() {
                path.is_dir()
            } else {
                fs::metadata(&path).is_ok_and(|m| m.is_file() && m.len() == entry.size)
            };
            if !present && report.status == FileStatus::Complete {
                report.status = FileStatus::Incomplete;
            }
        }

        let result = JobResult {
            files,
            failures,
            warnings: Vec::new(),
            stats: stats.snapshot(manifest.distinct_chunks() as u64),
            cancelled: false,
        };
        info!(
            complete = result.count(FileStatus::Complete),
            incomplete = result.count(FileStatus::Incomplete),
            "verification finished"
        );
        Ok(result)
    }

    fn open_writers(&self, manifest: &Manifest, ledger: &Ledger) -> Vec<Option<FileWriter>> {
        let root = &self.config.output_root;
        manifest
            .files
            .iter()
            .enumerate()
            .map(|(file, entry)| {
                let opened = if entry.is_directory() {
                    FileWriter::create_directory(root, entry).map(|_| None)
                } else {
                    FileWriter::open(root, entry).map(Some)
                };
                opened.unwrap_or_else(|e| {
                    error!(error = %e, "cannot prepare output file");
                    ledger.fail_file(file, e.to_string());
                    None
                })
            })
            .collect()
    }
}

impl Job<'_> {
    /// Destinations whose file is still writable.
    fn live(&self, destinations: &[Destination]) -> Vec<Destination> {
        destinations
            .iter()
            .copied()
            .filter(|d| self.writers[d.file].is_some() && !self.ledger.is_failed(d.file))
            .collect()
    }

    /// Satisfy what is already on disk. Returns the item if it still needs
    /// a fetch.
    fn resume(&self, item: WorkItem) -> Option<WorkItem> {
        let id = item.identity.id;
        let len = item.identity.original_len as usize;

        let (verified, missing): (Vec<Destination>, Vec<Destination>) =
            self.live(&item.destinations).into_iter().partition(|d| {
                self.writers[d.file]
                    .as_ref()
                    .is_some_and(|w| w.verify_existing(d.offset, len, &id))
            });

        for d in &verified {
            self.ledger.resolve(d.file);
            self.counters.add_chunk(len as u64);
        }
        StatsCounters::add(&self.stats.chunks_resumed, verified.len() as u64);

        if missing.is_empty() {
            return None;
        }

        if let Some(source) = verified.first() {
            let data = self.writers[source.file]
                .as_ref()
                .map(|w| w.read_range(source.offset, len));
            if let Some(Ok(data)) = data {
                for d in &missing {
                    if self.write(d, &id, &data) {
                        StatsCounters::add(&self.stats.chunks_copied, 1);
                    }
                }
                return None;
            }
        }

        Some(WorkItem {
            identity: item.identity,
            destinations: missing,
        })
    }

    /// Fetch one item and write it to every live destination.
    fn fetch(&self, fetcher: &ChunkFetcher<'_>, item: WorkItem, cancel: &CancellationToken) {
        let destinations = self.live(&item.destinations);
        if destinations.is_empty() {
            return;
        }
        let id = item.identity.id;

        match fetcher.fetch(&item.identity, cancel) {
            Ok(chunk) => {
                StatsCounters::add(&self.stats.chunks_fetched, 1);
                StatsCounters::add(&self.stats.fetch_requests, u64::from(chunk.requests));
                StatsCounters::add(&self.stats.bytes_downloaded, chunk.bytes_received);
                self.counters.add_downloaded(chunk.bytes_received);
                for d in &destinations {
                    self.write(d, &id, &chunk.plaintext);
                }
            }
            Err(failure) => {
                StatsCounters::add(&self.stats.fetch_requests, u64::from(failure.requests));
                StatsCounters::add(&self.stats.bytes_downloaded, failure.bytes_received);
                self.counters.add_downloaded(failure.bytes_received);

                let Some(kind) = FailureKind::from_error(&failure.error) else {
                    return;
                };
                warn!(
                    chunk = %id,
                    attempts = failure.attempts,
                    %kind,
                    error = %failure.error,
                    "chunk failed permanently"
                );
                for d in &destinations {
                    self.ledger
                        .fail_chunk(d.file, id, d.offset, kind, failure.error.to_string());
                    self.counters.add_chunk(0);
                }
            }
        }
    }

    /// Write verified plaintext to one destination. Returns `false` if the
    /// file failed.
    fn write(&self, d: &Destination, id: &ChunkId, data: &[u8]) -> bool {
        let Some(writer) = self.writers[d.file].as_ref() else {
            return false;
        };
        match writer.write(d.offset, data) {
            Ok(()) => {
                self.ledger.resolve(d.file);
                self.counters.add_chunk(data.len() as u64);
                StatsCounters::add(&self.stats.bytes_written, data.len() as u64);
                true
            }
            Err(e) => {
                error!(file = %self.ledger.path(d.file).display(), error = %e, "write failed");
                self.ledger.fail_file(d.file, e.to_string());
                self.ledger
                    .fail_chunk(d.file, *id, d.offset, FailureKind::Disk, e.to_string());
                false
            }
        }
    }
}
