//! In-memory manifest types.

use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use sha1::{Digest, Sha1};

use super::error::ManifestError;

/// Length of a chunk content hash (SHA-1) in bytes.
pub const CHUNK_ID_LEN: usize = 20;

/// File flag marking a directory entry.
pub const FLAG_DIRECTORY: u32 = 0x40;

/// Content hash of a chunk's plaintext.
///
/// Two chunks with the same id have the same plaintext, wherever they are
/// referenced. Displayed as 40 lowercase hex characters, which is also the
/// form used in chunk URLs.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChunkId([u8; CHUNK_ID_LEN]);

impl ChunkId {
    /// Wrap raw hash bytes.
    pub const fn new(bytes: [u8; CHUNK_ID_LEN]) -> Self {
        Self(bytes)
    }

    /// Hash `data` to get the id it would be stored under.
    pub fn of(data: &[u8]) -> Self {
        Self(Sha1::digest(data).into())
    }

    /// Parse a 40-character hex string.
    pub fn from_hex(s: &str) -> Result<Self, ManifestError> {
        let mut bytes = [0u8; CHUNK_ID_LEN];
        hex::decode_to_slice(s.trim(), &mut bytes)
            .map_err(|_| ManifestError::InvalidHash(s.to_string()))?;
        Ok(Self(bytes))
    }

    /// Lowercase hex representation.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Raw hash bytes.
    pub fn as_bytes(&self) -> &[u8; CHUNK_ID_LEN] {
        &self.0
    }
}

impl FromStr for ChunkId {
    type Err = ManifestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChunkId({})", self.to_hex())
    }
}

/// Addressing and size information for one chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChunkIdentity {
    /// Content hash of the plaintext.
    pub id: ChunkId,
    /// Size of the payload as served (encrypted and compressed).
    pub compressed_len: u32,
    /// Size of the plaintext.
    pub original_len: u32,
}

impl ChunkIdentity {
    /// Create a new chunk identity.
    pub fn new(id: ChunkId, compressed_len: u32, original_len: u32) -> Self {
        Self {
            id,
            compressed_len,
            original_len,
        }
    }
}

/// A chunk placed at an offset inside a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkRef {
    pub identity: ChunkIdentity,
    /// Offset in the file where the plaintext begins.
    pub offset: u64,
}

impl ChunkRef {
    pub fn new(identity: ChunkIdentity, offset: u64) -> Self {
        Self { identity, offset }
    }

    /// First byte past this chunk.
    pub fn end(&self) -> u64 {
        self.offset + u64::from(self.identity.original_len)
    }
}

/// One file (or directory) of the depot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    /// Path relative to the output root.
    pub path: PathBuf,
    /// Total size in bytes.
    pub size: u64,
    /// Raw manifest flags.
    pub flags: u32,
    /// Chunks ordered by offset.
    pub chunks: Vec<ChunkRef>,
}

impl FileEntry {
    /// Create a regular file entry.
    pub fn new(path: impl Into<PathBuf>, size: u64, chunks: Vec<ChunkRef>) -> Self {
        Self {
            path: path.into(),
            size,
            flags: 0,
            chunks,
        }
    }

    /// Create a directory entry.
    pub fn directory(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            size: 0,
            flags: FLAG_DIRECTORY,
            chunks: Vec::new(),
        }
    }

    pub fn is_directory(&self) -> bool {
        self.flags & FLAG_DIRECTORY != 0
    }

    /// Sum of the plaintext lengths of all chunks.
    pub fn chunk_bytes(&self) -> u64 {
        self.chunks
            .iter()
            .map(|c| u64::from(c.identity.original_len))
            .sum()
    }

    /// Sort chunks by offset.
    pub fn sort_chunks(&mut self) {
        self.chunks.sort_by_key(|c| c.offset);
    }
}

/// A depot manifest: the full file list of one depot revision.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    pub depot_id: u32,
    /// Manifest revision id.
    pub manifest_id: u64,
    pub files: Vec<FileEntry>,
}

impl Manifest {
    pub fn new(depot_id: u32, manifest_id: u64, files: Vec<FileEntry>) -> Self {
        Self {
            depot_id,
            manifest_id,
            files,
        }
    }

    /// Total plaintext size of all files.
    pub fn total_size(&self) -> u64 {
        self.files.iter().map(|f| f.size).sum()
    }

    /// Number of chunk references, counting duplicates.
    pub fn chunk_refs(&self) -> usize {
        self.files.iter().map(|f| f.chunks.len()).sum()
    }

    /// Number of distinct chunks.
    pub fn distinct_chunks(&self) -> usize {
        self.files
            .iter()
            .flat_map(|f| f.chunks.iter().map(|c| c.identity.id))
            .collect::<HashSet<_>>()
            .len()
    }

    /// Sort the chunks of every file by offset.
    pub fn normalize(&mut self) {
        for file in &mut self.files {
            file.sort_chunks();
        }
    }
}
