//! Errors for single chunk requests.

use thiserror::Error;

/// Why a single request against one content server failed.
///
/// Every variant except [`NoHostAvailable`](FetchError::NoHostAvailable)
/// counts as a failure against the server that was asked.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    /// The client could not be built.
    #[error("failed to create HTTP client: {0}")]
    Client(String),

    /// Connection or transfer error.
    #[error("request to {url} failed: {reason}")]
    Request { url: String, reason: String },

    /// The request timed out.
    #[error("request to {url} timed out")]
    Timeout { url: String },

    /// The server answered with a non-success status.
    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },

    /// The body does not have the declared download size.
    #[error("expected {expected} bytes from {url}, received {received}")]
    SizeMismatch {
        url: String,
        expected: u64,
        received: u64,
    },

    /// Every content server is disabled.
    #[error("no content server available")]
    NoHostAvailable,
}

impl FetchError {
    /// The URL involved, if any.
    pub fn url(&self) -> Option<&str> {
        match self {
            Self::Request { url, .. }
            | Self::Timeout { url }
            | Self::Status { url, .. }
            | Self::SizeMismatch { url, .. } => Some(url),
            Self::Client(_) | Self::NoHostAvailable => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let err = FetchError::Status {
            url: "http://a/depot/1/chunk/ff".to_string(),
            status: 503,
        };
        assert_eq!(err.to_string(), "HTTP 503 from http://a/depot/1/chunk/ff");

        let err = FetchError::SizeMismatch {
            url: "http://a".to_string(),
            expected: 10,
            received: 4,
        };
        assert_eq!(err.to_string(), "expected 10 bytes from http://a, received 4");
    }

    #[test]
    fn test_url() {
        assert_eq!(
            FetchError::Timeout {
                url: "http://a".to_string()
            }
            .url(),
            Some("http://a")
        );
        assert_eq!(FetchError::NoHostAvailable.url(), None);
    }
}
