//! Chunk decryption, decompression, and verification.
//!
//! [`ChunkProcessor`] turns the raw bytes served for a chunk into verified
//! plaintext:
//!
//! ```text
//! raw ──► ChunkCipher::decrypt ──► ChunkDecompressor::decompress ──► length + SHA-1 check
//! ```
//!
//! Both stages are trait objects so other formats can be plugged in. The
//! defaults are [`SymmetricCipher`] and [`ChunkCodec`].
//!
//! Nothing produced by a failed check ever reaches a file.

mod cipher;
mod codec;
#[cfg(test)]
pub(crate) mod fixtures;

pub use cipher::SymmetricCipher;
pub use codec::ChunkCodec;

use thiserror::Error;

use crate::keystore::DepotKey;
use crate::manifest::{ChunkId, ChunkIdentity};

/// Errors from processing one chunk.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProcessError {
    /// The payload could not be decrypted.
    #[error("decryption failed: {0}")]
    Decrypt(String),

    /// The decrypted payload is not a valid envelope.
    #[error("decompression failed: {0}")]
    Decompress(String),

    /// The envelope checksum does not match its content.
    #[error("payload checksum mismatch: expected {expected:08x}, got {actual:08x}")]
    ChecksumMismatch { expected: u32, actual: u32 },

    /// Plaintext has the wrong length.
    #[error("plaintext length mismatch: expected {expected}, got {actual}")]
    LengthMismatch { expected: u64, actual: u64 },

    /// Plaintext hash differs from the chunk id.
    #[error("hash mismatch: expected {expected}, got {actual}")]
    HashMismatch { expected: ChunkId, actual: ChunkId },
}

impl ProcessError {
    /// Whether the payload could not be decoded at all, as opposed to
    /// decoding to the wrong content.
    pub fn is_structural(&self) -> bool {
        matches!(self, Self::Decrypt(_) | Self::Decompress(_))
    }
}

/// Decrypts a served chunk.
pub trait ChunkCipher: Send + Sync {
    fn decrypt(&self, key: &DepotKey, data: &[u8]) -> Result<Vec<u8>, ProcessError>;
}

/// Unpacks a decrypted chunk.
pub trait ChunkDecompressor: Send + Sync {
    fn decompress(&self, payload: &[u8], identity: &ChunkIdentity)
        -> Result<Vec<u8>, ProcessError>;
}

/// Stateless decrypt, decompress, and verify pipeline.
pub struct ChunkProcessor {
    cipher: Box<dyn ChunkCipher>,
    decompressor: Box<dyn ChunkDecompressor>,
}

impl Default for ChunkProcessor {
    fn default() -> Self {
        Self::new(Box::new(SymmetricCipher), Box::new(ChunkCodec))
    }
}

impl ChunkProcessor {
    pub fn new(cipher: Box<dyn ChunkCipher>, decompressor: Box<dyn ChunkDecompressor>) -> Self {
        Self {
            cipher,
            decompressor,
        }
    }

    /// Turn raw served bytes into verified plaintext.
    pub fn process(
        &self,
        raw: &[u8],
        identity: &ChunkIdentity,
        key: &DepotKey,
    ) -> Result<Vec<u8>, ProcessError> {
        let decrypted = self.cipher.decrypt(key, raw)?;
        let plaintext = self.decompressor.decompress(&decrypted, identity)?;
        verify(&plaintext, identity)?;
        Ok(plaintext)
    }
}

/// Check length and hash of a plaintext against its identity.
pub fn verify(plaintext: &[u8], identity: &ChunkIdentity) -> Result<(), ProcessError> {
    let actual_len = plaintext.len() as u64;
    if actual_len != u64::from(identity.original_len) {
        return Err(ProcessError::LengthMismatch {
            expected: u64::from(identity.original_len),
            actual: actual_len,
        });
    }

    let actual = ChunkId::of(plaintext);
    if actual != identity.id {
        return Err(ProcessError::HashMismatch {
            expected: identity.id,
            actual,
        });
    }
    Ok(())
}
