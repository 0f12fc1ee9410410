//! Content server pool with per-host health tracking.
//!
//! All servers in the pool can serve any chunk. Workers pick servers in
//! round-robin order and report the outcome of every request back to the
//! pool. A server whose failure streak reaches the threshold is disabled for a
//! cool-down period and skipped by selection until the cool-down elapses.
//!
//! # State Machine (per server)
//!
//! ```text
//! Healthy --[failure, streak < threshold]--> Healthy (streak + 1)
//! Healthy --[failure, streak >= threshold]--> Disabled (until now + cooldown)
//! Disabled --[cooldown elapsed]--> Probation (selectable, streak kept)
//! Probation --[failure]--> Disabled
//! any --[success]--> Healthy (streak reset)
//! ```
//!
//! # Thread Safety
//!
//! Health is guarded by a per-server `parking_lot::Mutex`; contention only
//! happens when requests complete. The rotation cursor is an atomic.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use thiserror::Error;

use crate::manifest::ChunkId;

/// Consecutive failures that disable a server.
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 3;

/// How long a disabled server is skipped (seconds).
pub const DEFAULT_COOLDOWN_SECS: u64 = 30;

/// Errors for pool construction.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HostPoolError {
    /// No server URLs were supplied.
    #[error("no content servers configured")]
    NoServers,

    /// A server URL is not http(s).
    #[error("invalid server URL '{0}': expected http:// or https://")]
    InvalidUrl(String),
}

/// Health policy for the pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostPoolConfig {
    /// Failure streak at which a server is disabled.
    pub failure_threshold: u32,
    /// How long a disabled server is skipped.
    pub cooldown: Duration,
}

impl Default for HostPoolConfig {
    fn default() -> Self {
        Self {
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            cooldown: Duration::from_secs(DEFAULT_COOLDOWN_SECS),
        }
    }
}

impl HostPoolConfig {
    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold.max(1);
        self
    }

    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }
}

/// Point-in-time health of one server.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostHealth {
    /// Consecutive failed requests.
    pub failure_streak: u32,
    pub last_failure: Option<Instant>,
    /// The server is skipped until this instant.
    pub disabled_until: Option<Instant>,
}

impl HostHealth {
    /// Whether the server is disabled at `now`.
    pub fn is_disabled_at(&self, now: Instant) -> bool {
        self.disabled_until.is_some_and(|until| now < until)
    }
}

/// One content server.
#[derive(Debug)]
pub struct ServerCandidate {
    base_url: String,
    health: Mutex<HostHealth>,
    requests: AtomicU64,
    failures: AtomicU64,
}

impl ServerCandidate {
    fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            health: Mutex::new(HostHealth::default()),
            requests: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        }
    }

    /// Base URL without trailing slash.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// URL of a chunk of a depot on this server.
    pub fn chunk_url(&self, depot_id: u32, chunk: &ChunkId) -> String {
        format!("{}/depot/{}/chunk/{}", self.base_url, depot_id, chunk)
    }

    /// Snapshot of the current health.
    pub fn health(&self) -> HostHealth {
        self.health.lock().clone()
    }

    pub fn is_available_at(&self, now: Instant) -> bool {
        !self.health.lock().is_disabled_at(now)
    }

    /// Total requests made against this server.
    pub fn request_count(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }

    /// Total failed requests against this server.
    pub fn failure_count(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }
}

/// Rotating set of content servers shared by all workers of a job.
#[derive(Debug)]
pub struct HostPool {
    candidates: Vec<ServerCandidate>,
    config: HostPoolConfig,
    cursor: AtomicUsize,
    exhausted: AtomicBool,
}

impl HostPool {
    /// Create a pool from base URLs, in priority order.
    ///
    /// Blank entries are ignored and duplicates collapse to the first
    /// occurrence.
    pub fn new<I, S>(urls: I, config: HostPoolConfig) -> Result<Self, HostPoolError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut candidates: Vec<ServerCandidate> = Vec::new();
        for url in urls {
            let url = url.as_ref().trim();
            if url.is_empty() {
                continue;
            }
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(HostPoolError::InvalidUrl(url.to_string()));
            }
            let candidate = ServerCandidate::new(url);
            if candidates.iter().all(|c| c.base_url != candidate.base_url) {
                candidates.push(candidate);
            }
        }

        if candidates.is_empty() {
            return Err(HostPoolError::NoServers);
        }

        Ok(Self {
            candidates,
            config,
            cursor: AtomicUsize::new(0),
            exhausted: AtomicBool::new(false),
        })
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn config(&self) -> &HostPoolConfig {
        &self.config
    }

    pub fn candidate(&self, index: usize) -> &ServerCandidate {
        &self.candidates[index]
    }

    pub fn candidates(&self) -> &[ServerCandidate] {
        &self.candidates
    }

    /// Starting position for a new work item.
    ///
    /// Successive items start on successive servers so load spreads across
    /// the pool.
    pub fn next_start(&self) -> usize {
        self.cursor.fetch_add(1, Ordering::Relaxed) % self.candidates.len()
    }

    /// First enabled server at or after `from` (wrapping) that is not in
    /// `exclude`.
    pub fn select(&self, from: usize, exclude: &[usize]) -> Option<usize> {
        let now = Instant::now();
        let len = self.candidates.len();
        (0..len)
            .map(|step| (from + step) % len)
            .find(|idx| !exclude.contains(idx) && self.candidates[*idx].is_available_at(now))
    }

    /// Number of servers currently enabled, excluding `except` if given.
    pub fn enabled_count(&self, except: Option<usize>) -> usize {
        let now = Instant::now();
        self.candidates
            .iter()
            .enumerate()
            .filter(|(idx, c)| Some(*idx) != except && c.is_available_at(now))
            .count()
    }

    /// Number of enabled servers that are not in `tried`.
    pub fn untried_count(&self, tried: &[usize]) -> usize {
        let now = Instant::now();
        self.candidates
            .iter()
            .enumerate()
            .filter(|(idx, c)| !tried.contains(idx) && c.is_available_at(now))
            .count()
    }

    /// Record a successful request; resets the failure streak.
    pub fn record_success(&self, index: usize) {
        let candidate = &self.candidates[index];
        candidate.requests.fetch_add(1, Ordering::Relaxed);

        let mut health = candidate.health.lock();
        if health.failure_streak > 0 || health.disabled_until.is_some() {
            tracing::debug!(server = %candidate.base_url, "content server recovered");
        }
        health.failure_streak = 0;
        health.disabled_until = None;
    }

    /// Record a failed request.
    ///
    /// Returns `true` if this failure disabled the server.
    pub fn record_failure(&self, index: usize) -> bool {
        let candidate = &self.candidates[index];
        candidate.requests.fetch_add(1, Ordering::Relaxed);
        candidate.failures.fetch_add(1, Ordering::Relaxed);

        let now = Instant::now();
        let mut health = candidate.health.lock();
        health.failure_streak += 1;
        health.last_failure = Some(now);

        if health.failure_streak >= self.config.failure_threshold && !health.is_disabled_at(now) {
            health.disabled_until = Some(now + self.config.cooldown);
            tracing::warn!(
                server = %candidate.base_url,
                streak = health.failure_streak,
                cooldown_secs = self.config.cooldown.as_secs(),
                "content server disabled"
            );
            return true;
        }
        false
    }

    /// Whether every server is currently disabled.
    pub fn all_disabled(&self) -> bool {
        self.enabled_count(None) == 0
    }

    /// Note that a request found no enabled server.
    ///
    /// Returns `true` only the first time, so the condition is logged once.
    pub fn mark_exhausted(&self) -> bool {
        !self.exhausted.swap(true, Ordering::Relaxed)
    }

    /// Whether any request of this job found no enabled server.
    pub fn was_exhausted(&self) -> bool {
        self.exhausted.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(n: usize, threshold: u32, cooldown: Duration) -> HostPool {
        let urls: Vec<String> = (0..n).map(|i| format!("http://cdn{}.example.com/", i)).collect();
        HostPool::new(
            urls,
            HostPoolConfig::default()
                .with_failure_threshold(threshold)
                .with_cooldown(cooldown),
        )
        .unwrap()
    }

    #[test]
    fn test_new_rejects_empty_and_invalid() {
        assert_eq!(
            HostPool::new(Vec::<String>::new(), HostPoolConfig::default()).unwrap_err(),
            HostPoolError::NoServers
        );
        assert_eq!(
            HostPool::new([" ", ""], HostPoolConfig::default()).unwrap_err(),
            HostPoolError::NoServers
        );
        assert!(matches!(
            HostPool::new(["ftp://x"], HostPoolConfig::default()),
            Err(HostPoolError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_new_deduplicates_and_trims() {
        let pool = HostPool::new(
            ["http://a.example.com/", "http://a.example.com", "https://b.example.com"],
            HostPoolConfig::default(),
        )
        .unwrap();
        assert_eq!(pool.len(), 2);
        assert_eq!(pool.candidate(0).base_url(), "http://a.example.com");
    }

    #[test]
    fn test_chunk_url() {
        let pool = pool(1, 3, Duration::from_secs(30));
        let id = ChunkId::of(b"hello world");
        assert_eq!(
            pool.candidate(0).chunk_url(731, &id),
            "http://cdn0.example.com/depot/731/chunk/2aae6c35c94fcfb415dbe95f408b9ce91ee846ed"
        );
    }

    #[test]
    fn test_next_start_rotates() {
        let pool = pool(3, 3, Duration::from_secs(30));
        let starts: Vec<usize> = (0..6).map(|_| pool.next_start()).collect();
        assert_eq!(starts, vec![0, 1, 2, 0, 1, 2]);
    }

    #[test]
    fn test_select_wraps_and_excludes() {
        let pool = pool(3, 3, Duration::from_secs(30));
        assert_eq!(pool.select(2, &[]), Some(2));
        assert_eq!(pool.select(2, &[2]), Some(0));
        assert_eq!(pool.select(0, &[0, 1, 2]), None);
    }

    #[test]
    fn test_failure_streak_disables_host() {
        let pool = pool(2, 2, Duration::from_secs(60));

        assert!(!pool.record_failure(0));
        assert!(pool.candidate(0).is_available_at(Instant::now()));

        assert!(pool.record_failure(0));
        assert!(!pool.candidate(0).is_available_at(Instant::now()));
        assert_eq!(pool.candidate(0).health().failure_streak, 2);

        // Disabled host is skipped
        assert_eq!(pool.select(0, &[]), Some(1));
        assert_eq!(pool.enabled_count(None), 1);
        assert_eq!(pool.untried_count(&[1]), 0);
    }

    #[test]
    fn test_success_resets_streak() {
        let pool = pool(1, 3, Duration::from_secs(60));
        pool.record_failure(0);
        pool.record_failure(0);
        pool.record_success(0);

        let health = pool.candidate(0).health();
        assert_eq!(health.failure_streak, 0);
        assert!(health.last_failure.is_some());
        assert_eq!(pool.candidate(0).request_count(), 3);
        assert_eq!(pool.candidate(0).failure_count(), 2);
    }

    #[test]
    fn test_cooldown_expiry_reenables_with_probation() {
        let pool = pool(1, 1, Duration::ZERO);

        assert!(pool.record_failure(0));
        // Zero cooldown: selectable again right away
        assert_eq!(pool.select(0, &[]), Some(0));

        // Still on probation: the next failure disables it again
        assert!(pool.record_failure(0));
        assert_eq!(pool.candidate(0).health().failure_streak, 2);
    }

    #[test]
    fn test_all_disabled_and_exhausted_flag() {
        let pool = pool(2, 1, Duration::from_secs(60));
        pool.record_failure(0);
        assert!(!pool.all_disabled());
        pool.record_failure(1);
        assert!(pool.all_disabled());
        assert_eq!(pool.select(0, &[]), None);

        assert!(!pool.was_exhausted());
        assert!(pool.mark_exhausted());
        assert!(!pool.mark_exhausted());
        assert!(pool.was_exhausted());
    }
}
