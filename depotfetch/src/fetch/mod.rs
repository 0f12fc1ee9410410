//! Chunk retrieval from content servers.
//!
//! - [`HttpClient`]: blocking GET abstraction, [`ReqwestClient`] in production
//! - [`RetryPolicy`] and [`decide`]: how many attempts, which host next
//! - [`ChunkFetcher`]: drives attempts for one chunk against the
//!   [`HostPool`](crate::host::HostPool) and hands bodies to the
//!   [`ChunkProcessor`](crate::processor::ChunkProcessor)

mod error;
mod fetcher;
mod http;
mod retry;

pub use error::FetchError;
pub use fetcher::{ChunkError, ChunkFailure, ChunkFetcher, FetchedChunk};
pub use http::{HttpClient, ReqwestClient, DEFAULT_TIMEOUT_SECS};
pub use retry::{
    decide, AttemptContext, ErrorClass, RetryDecision, RetryPolicy, DEFAULT_MAX_ATTEMPTS,
};

#[cfg(test)]
pub(crate) use http::tests as mock;
