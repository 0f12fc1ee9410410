//! Error types for manifest loading and validation.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading or validating a manifest.
#[derive(Debug, Error)]
pub enum ManifestError {
    /// Failed to read the manifest file.
    #[error("failed to read manifest {}: {source}", path.display())]
    ReadFailed { path: PathBuf, source: io::Error },

    /// The manifest document could not be parsed.
    #[error("failed to parse manifest: {0}")]
    Parse(String),

    /// A chunk hash is not 40 hex characters.
    #[error("invalid chunk hash '{0}'")]
    InvalidHash(String),

    /// A file path is absolute, empty, or escapes the output root.
    #[error("invalid path {}: {reason}", path.display())]
    InvalidPath { path: PathBuf, reason: String },

    /// The same path appears more than once.
    #[error("duplicate file entry {}", path.display())]
    DuplicatePath { path: PathBuf },

    /// A directory entry lists chunks.
    #[error("directory {} must not contain chunks", path.display())]
    DirectoryWithChunks { path: PathBuf },

    /// Chunk offsets go backwards.
    #[error("chunks of {} are not ordered: offset {offset} follows {previous}", path.display())]
    UnorderedChunks {
        path: PathBuf,
        offset: u64,
        previous: u64,
    },

    /// Two chunks of one file cover the same bytes.
    #[error("chunk at offset {offset} overlaps previous chunk ending at {previous_end} in {}", path.display())]
    OverlappingChunks {
        path: PathBuf,
        offset: u64,
        previous_end: u64,
    },

    /// A chunk ends beyond the declared file size.
    #[error("chunk at offset {offset} ends at {end}, past size {size} of {}", path.display())]
    ChunkOutOfBounds {
        path: PathBuf,
        offset: u64,
        end: u64,
        size: u64,
    },

    /// Chunk lengths do not add up to the file size.
    #[error("chunks of {} sum to {actual} bytes, declared size is {declared}", path.display())]
    SizeMismatch {
        path: PathBuf,
        declared: u64,
        actual: u64,
    },

    /// One chunk hash is declared with different lengths.
    #[error("chunk {chunk} is declared with {field} {first} and {second}")]
    InconsistentChunk {
        chunk: String,
        /// `original_len` or `compressed_len`.
        field: &'static str,
        first: u32,
        second: u32,
    },
}
