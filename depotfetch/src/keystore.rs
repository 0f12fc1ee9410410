//! Depot decryption keys.
//!
//! Every depot is encrypted with one AES-256 key. Keys are supplied as hex
//! strings (on the command line or in the `[depots]` section of the config
//! file) and stay read-only for the duration of a job.

use std::collections::HashMap;
use std::fmt;

use thiserror::Error;

use crate::manifest::Manifest;

/// Length of a depot key in bytes.
pub const KEY_LEN: usize = 32;

/// Errors for key parsing and lookup.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum KeyError {
    /// The key is not valid hex.
    #[error("invalid hex key: {0}")]
    InvalidHex(String),

    /// The key has the wrong number of bytes.
    #[error("key must be {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    /// No key is known for the depot.
    #[error("no decryption key for depot {depot_id}")]
    Missing { depot_id: u32 },
}

/// A depot decryption key.
///
/// `Debug` output never includes the key material.
#[derive(Clone, PartialEq, Eq)]
pub struct DepotKey([u8; KEY_LEN]);

impl DepotKey {
    /// Create a key from raw bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, KeyError> {
        let key: [u8; KEY_LEN] = bytes.try_into().map_err(|_| KeyError::InvalidLength {
            expected: KEY_LEN,
            actual: bytes.len(),
        })?;
        Ok(Self(key))
    }

    /// Parse a 64-character hex key.
    pub fn from_hex(s: &str) -> Result<Self, KeyError> {
        let bytes = hex::decode(s.trim()).map_err(|e| KeyError::InvalidHex(e.to_string()))?;
        Self::from_bytes(&bytes)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl fmt::Debug for DepotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DepotKey(..)")
    }
}

/// Maps depot ids to their decryption keys.
#[derive(Debug, Clone, Default)]
pub struct KeyStore {
    keys: HashMap<u32, DepotKey>,
}

impl KeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a key, replacing any previous key for the depot.
    pub fn insert(&mut self, depot_id: u32, key: DepotKey) -> Option<DepotKey> {
        self.keys.insert(depot_id, key)
    }

    /// Builder form of [`insert`](Self::insert).
    pub fn with_key(mut self, depot_id: u32, key: DepotKey) -> Self {
        self.insert(depot_id, key);
        self
    }

    /// Builder form taking a hex key.
    pub fn with_hex_key(self, depot_id: u32, hex_key: &str) -> Result<Self, KeyError> {
        Ok(self.with_key(depot_id, DepotKey::from_hex(hex_key)?))
    }

    pub fn get(&self, depot_id: u32) -> Option<&DepotKey> {
        self.keys.get(&depot_id)
    }

    /// Look up a key, failing if the depot is unknown.
    pub fn require(&self, depot_id: u32) -> Result<&DepotKey, KeyError> {
        self.get(depot_id).ok_or(KeyError::Missing { depot_id })
    }

    /// Copy every key of `other` into this store; existing entries win.
    pub fn merge_missing(&mut self, other: &KeyStore) {
        for (depot_id, key) in &other.keys {
            self.keys.entry(*depot_id).or_insert_with(|| key.clone());
        }
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// One depot revision together with the key that decrypts it.
#[derive(Debug, Clone)]
pub struct DistributionUnit {
    pub depot_id: u32,
    pub manifest_id: u64,
    pub key: DepotKey,
}

impl DistributionUnit {
    /// Resolve the unit a manifest belongs to.
    pub fn resolve(manifest: &Manifest, keys: &KeyStore) -> Result<Self, KeyError> {
        Ok(Self {
            depot_id: manifest.depot_id,
            manifest_id: manifest.manifest_id,
            key: keys.require(manifest.depot_id)?.clone(),
        })
    }
}
