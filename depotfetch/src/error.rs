//! Crate-level error type.
//!
//! Each layer has its own error enum; `DepotError` collects the ones that can
//! abort a job before any chunk work starts (bad manifest, missing key, no
//! servers, unreadable configuration). Per-chunk and per-file failures never
//! surface here, they are recorded in the `JobResult` instead.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::config::ConfigError;
use crate::fetch::FetchError;
use crate::host::HostPoolError;
use crate::keystore::KeyError;
use crate::manifest::ManifestError;

/// Result type for job-level operations.
pub type DepotResult<T> = Result<T, DepotError>;

/// Errors that prevent a job from starting or completing its bookkeeping.
#[derive(Debug, Error)]
pub enum DepotError {
    /// The manifest could not be loaded or is malformed.
    #[error(transparent)]
    Manifest(#[from] ManifestError),

    /// No usable decryption key.
    #[error(transparent)]
    Key(#[from] KeyError),

    /// The configuration file is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The content server list is unusable.
    #[error(transparent)]
    Hosts(#[from] HostPoolError),

    /// The HTTP client could not be created.
    #[error(transparent)]
    Http(#[from] FetchError),

    /// Filesystem error outside of a single output file.
    #[error("I/O error on {}: {source}", path.display())]
    Io { path: PathBuf, source: io::Error },

    /// Logging could not be initialized.
    #[error("failed to initialize logging: {0}")]
    Logging(String),
}
