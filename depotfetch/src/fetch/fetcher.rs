//! Per-chunk retrieval with retry and failover.

use std::time::{Duration, Instant};

use bytes::Bytes;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use super::error::FetchError;
use super::http::HttpClient;
use super::retry::{decide, AttemptContext, ErrorClass, RetryDecision, RetryPolicy};
use crate::host::HostPool;
use crate::keystore::DepotKey;
use crate::manifest::ChunkIdentity;
use crate::processor::{ChunkProcessor, ProcessError};

/// Granularity of cancellable backoff sleeps.
const SLEEP_SLICE: Duration = Duration::from_millis(50);

/// Why an attempt at a chunk failed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ChunkError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Process(#[from] ProcessError),

    /// The job was cancelled.
    #[error("cancelled")]
    Cancelled,
}

impl ChunkError {
    /// Class used by the retry decision. `None` for cancellation.
    pub fn class(&self) -> Option<ErrorClass> {
        match self {
            Self::Fetch(FetchError::NoHostAvailable) => Some(ErrorClass::NoHost),
            Self::Fetch(_) => Some(ErrorClass::Network),
            Self::Process(e) if e.is_structural() => Some(ErrorClass::Undecodable),
            Self::Process(_) => Some(ErrorClass::Integrity),
            Self::Cancelled => None,
        }
    }
}

/// A verified chunk.
#[derive(Debug, Clone)]
pub struct FetchedChunk {
    pub plaintext: Vec<u8>,
    /// Raw bytes received over all requests for this chunk.
    pub bytes_received: u64,
    /// HTTP requests made, failovers included.
    pub requests: u32,
}

/// A chunk that could not be obtained.
#[derive(Debug, Clone)]
pub struct ChunkFailure {
    /// Error of the last attempt.
    pub error: ChunkError,
    /// Attempts consumed from the retry budget.
    pub attempts: u32,
    pub requests: u32,
    pub bytes_received: u64,
}

impl ChunkFailure {
    pub fn is_cancelled(&self) -> bool {
        self.error == ChunkError::Cancelled
    }
}

/// Fetches and verifies chunks of one depot.
///
/// Holds only borrowed, shared state and is cheap to create per worker.
pub struct ChunkFetcher<'a> {
    client: &'a dyn HttpClient,
    hosts: &'a HostPool,
    processor: &'a ChunkProcessor,
    policy: &'a RetryPolicy,
    depot_id: u32,
    key: &'a DepotKey,
}

impl<'a> ChunkFetcher<'a> {
    pub fn new(
        client: &'a dyn HttpClient,
        hosts: &'a HostPool,
        processor: &'a ChunkProcessor,
        policy: &'a RetryPolicy,
        depot_id: u32,
        key: &'a DepotKey,
    ) -> Self {
        Self {
            client,
            hosts,
            processor,
            policy,
            depot_id,
            key,
        }
    }

    /// One GET against one server, with the outcome recorded in the pool.
    ///
    /// A body whose length differs from the declared download size counts
    /// as a failed request. A declared size of zero is not checked.
    pub fn request(&self, identity: &ChunkIdentity, host: usize) -> Result<Bytes, FetchError> {
        let candidate = self.hosts.candidate(host);
        let url = candidate.chunk_url(self.depot_id, &identity.id);
        trace!(url = %url, "requesting chunk");

        let result = match identity.compressed_len {
            0 => self.client.get(&url),
            expected => self.client.get_exact(&url, u64::from(expected)),
        };

        match &result {
            Ok(_) => self.hosts.record_success(host),
            Err(e) => {
                debug!(chunk = %identity.id, error = %e, "chunk request failed");
                self.hosts.record_failure(host);
            }
        }
        result
    }

    /// Obtain verified plaintext for a chunk.
    ///
    /// Attempts are driven by [`decide`]; backoff sleeps end early when
    /// `cancel` fires.
    pub fn fetch(
        &self,
        identity: &ChunkIdentity,
        cancel: &CancellationToken,
    ) -> Result<FetchedChunk, ChunkFailure> {
        let mut tried: Vec<usize> = Vec::new();
        let mut undecodable: Vec<usize> = Vec::new();
        let mut attempts = 0u32;
        let mut requests = 0u32;
        let mut bytes_received = 0u64;

        let fail = |error: ChunkError,
                    attempts: u32,
                    requests: u32,
                    bytes_received: u64|
         -> Result<FetchedChunk, ChunkFailure> {
            Err(ChunkFailure {
                error,
                attempts,
                requests,
                bytes_received,
            })
        };

        let mut next = self.hosts.select(self.hosts.next_start(), &[]);
        loop {
            if cancel.is_cancelled() {
                return fail(ChunkError::Cancelled, attempts, requests, bytes_received);
            }

            let Some(host) = next else {
                if self.hosts.mark_exhausted() {
                    warn!("all content servers are disabled");
                }
                let error = ChunkError::Fetch(FetchError::NoHostAvailable);
                return fail(error, attempts.max(1), requests, bytes_received);
            };
            if !tried.contains(&host) {
                tried.push(host);
            }

            requests += 1;
            let error = match self.request(identity, host) {
                Ok(raw) => {
                    bytes_received += raw.len() as u64;
                    match self.processor.process(&raw, identity, self.key) {
                        Ok(plaintext) => {
                            return Ok(FetchedChunk {
                                plaintext,
                                bytes_received,
                                requests,
                            })
                        }
                        Err(e) => ChunkError::Process(e),
                    }
                }
                Err(e) => ChunkError::Fetch(e),
            };

            let Some(class) = error.class() else {
                return fail(error, attempts, requests, bytes_received);
            };
            if class == ErrorClass::Undecodable && !undecodable.contains(&host) {
                undecodable.push(host);
            }

            let ctx = AttemptContext {
                attempt: attempts + 1,
                max_attempts: self.policy.max_attempts(),
                host_disabled: !self.hosts.candidate(host).is_available_at(Instant::now()),
                other_hosts: self.hosts.enabled_count(Some(host)),
                untried_hosts: self.hosts.untried_count(&tried),
                undecodable_hosts: undecodable.len(),
                total_hosts: self.hosts.len(),
            };
            let decision = decide(&ctx, class);
            if decision.consumes_attempt() {
                attempts += 1;
            }
            debug!(
                chunk = %identity.id,
                attempt = ctx.attempt,
                ?class,
                ?decision,
                error = %error,
                "chunk attempt failed"
            );

            next = match decision {
                RetryDecision::GiveUp => {
                    return fail(error, attempts, requests, bytes_received);
                }
                RetryDecision::Failover => self.hosts.select(host + 1, &tried),
                RetryDecision::RetryNextHost => {
                    if !self.backoff(attempts, cancel) {
                        return fail(ChunkError::Cancelled, attempts, requests, bytes_received);
                    }
                    self.hosts
                        .select(host + 1, &[host])
                        .or_else(|| self.hosts.select(host, &[]))
                }
                RetryDecision::RetrySameHost => {
                    if !self.backoff(attempts, cancel) {
                        return fail(ChunkError::Cancelled, attempts, requests, bytes_received);
                    }
                    self.hosts.select(host, &[])
                }
            };
        }
    }

    /// Sleep before the next attempt. Returns `false` if cancelled.
    fn backoff(&self, attempt: u32, cancel: &CancellationToken) -> bool {
        let delay = self.policy.delay_for_attempt(attempt).unwrap_or_default();
        let deadline = Instant::now() + delay;
        loop {
            if cancel.is_cancelled() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            std::thread::sleep((deadline - now).min(SLEEP_SLICE));
        }
    }
}
