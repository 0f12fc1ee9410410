//! HTTP client abstraction for testability

use std::io::{self, Read};
use std::time::Duration;

use bytes::Bytes;

use super::error::FetchError;

/// Default request timeout (seconds).
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Trait for HTTP client operations.
///
/// This abstraction allows for dependency injection and easier testing
/// by enabling fake content servers in tests.
pub trait HttpClient: Send + Sync {
    /// Performs an HTTP GET request and returns the full body.
    ///
    /// Non-success statuses are errors.
    fn get(&self, url: &str) -> Result<Bytes, FetchError>;

    /// GET a body that must be exactly `expected` bytes long.
    ///
    /// Any other length is a [`FetchError::SizeMismatch`]. Implementations
    /// should stop reading once the body is known to be too long.
    fn get_exact(&self, url: &str, expected: u64) -> Result<Bytes, FetchError> {
        let body = self.get(url)?;
        check_len(url, expected, body.len() as u64)?;
        Ok(body)
    }
}

fn check_len(url: &str, expected: u64, received: u64) -> Result<(), FetchError> {
    if received != expected {
        return Err(FetchError::SizeMismatch {
            url: url.to_string(),
            expected,
            received,
        });
    }
    Ok(())
}

/// Real HTTP client implementation using reqwest.
pub struct ReqwestClient {
    client: reqwest::blocking::Client,
}

impl ReqwestClient {
    /// Creates a new ReqwestClient with the default timeout.
    pub fn new() -> Result<Self, FetchError> {
        Self::with_timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    /// Creates a new ReqwestClient with a custom timeout.
    pub fn with_timeout(timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("depotfetch/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FetchError::Client(e.to_string()))?;

        Ok(Self { client })
    }
}

fn request_error(url: &str, e: reqwest::Error) -> FetchError {
    if e.is_timeout() {
        FetchError::Timeout {
            url: url.to_string(),
        }
    } else {
        FetchError::Request {
            url: url.to_string(),
            reason: e.to_string(),
        }
    }
}

fn read_error(url: &str, e: io::Error) -> FetchError {
    if e.kind() == io::ErrorKind::TimedOut {
        FetchError::Timeout {
            url: url.to_string(),
        }
    } else {
        FetchError::Request {
            url: url.to_string(),
            reason: e.to_string(),
        }
    }
}

impl ReqwestClient {
    fn send(&self, url: &str) -> Result<reqwest::blocking::Response, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|e| request_error(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response)
    }
}

impl HttpClient for ReqwestClient {
    fn get(&self, url: &str) -> Result<Bytes, FetchError> {
        self.send(url)?.bytes().map_err(|e| request_error(url, e))
    }

    /// Rejects a wrong `Content-Length` before reading the body, and never
    /// reads more than one byte past `expected`.
    fn get_exact(&self, url: &str, expected: u64) -> Result<Bytes, FetchError> {
        let response = self.send(url)?;
        if let Some(declared) = response.content_length() {
            check_len(url, expected, declared)?;
        }

        let mut body = Vec::with_capacity(expected as usize);
        response
            .take(expected.saturating_add(1))
            .read_to_end(&mut body)
            .map_err(|e| read_error(url, e))?;
        check_len(url, expected, body.len() as u64)?;
        Ok(Bytes::from(body))
    }
}
