//! JSON manifest loader.
//!
//! Reads the JSON rendition of a decoded depot manifest:
//!
//! ```json
//! {
//!   "depot_id": 228988,
//!   "manifest_id": 6102811536209856935,
//!   "files": [
//!     {
//!       "filename": "bin\\game.exe",
//!       "size": 1048576,
//!       "flags": 0,
//!       "chunks": [
//!         { "sha": "2aae6c35...", "offset": 0, "cb_original": 1048576, "cb_compressed": 401232 }
//!       ]
//!     }
//!   ]
//! }
//! ```
//!
//! Backslash separators are normalized, chunks are sorted by offset, and the
//! result is validated before it is returned.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use super::error::ManifestError;
use super::model::{ChunkId, ChunkIdentity, ChunkRef, FileEntry, Manifest};
use super::validate::validate;

#[derive(Debug, Deserialize)]
struct ManifestDocument {
    depot_id: u32,
    #[serde(default)]
    manifest_id: u64,
    #[serde(default)]
    files: Vec<FileDocument>,
}

#[derive(Debug, Deserialize)]
struct FileDocument {
    filename: String,
    #[serde(default)]
    size: u64,
    #[serde(default)]
    flags: u32,
    #[serde(default)]
    chunks: Vec<ChunkDocument>,
}

#[derive(Debug, Deserialize)]
struct ChunkDocument {
    sha: String,
    offset: u64,
    cb_original: u32,
    cb_compressed: u32,
}

/// Load and validate a manifest from a JSON file.
pub fn load_manifest(path: &Path) -> Result<Manifest, ManifestError> {
    let content = fs::read_to_string(path).map_err(|e| ManifestError::ReadFailed {
        path: path.to_path_buf(),
        source: e,
    })?;
    parse_manifest(&content)
}

/// Parse and validate a manifest from a JSON string.
pub fn parse_manifest(json: &str) -> Result<Manifest, ManifestError> {
    let document: ManifestDocument =
        serde_json::from_str(json).map_err(|e| ManifestError::Parse(e.to_string()))?;

    let files = document
        .files
        .into_iter()
        .map(FileDocument::into_entry)
        .collect::<Result<Vec<_>, _>>()?;

    let mut manifest = Manifest::new(document.depot_id, document.manifest_id, files);
    manifest.normalize();
    validate(&manifest)?;
    Ok(manifest)
}

impl FileDocument {
    fn into_entry(self) -> Result<FileEntry, ManifestError> {
        let chunks = self
            .chunks
            .into_iter()
            .map(|c| {
                let id = ChunkId::from_hex(&c.sha)?;
                Ok(ChunkRef::new(
                    ChunkIdentity::new(id, c.cb_compressed, c.cb_original),
                    c.offset,
                ))
            })
            .collect::<Result<Vec<_>, ManifestError>>()?;

        Ok(FileEntry {
            path: normalize_path(&self.filename),
            size: self.size,
            flags: self.flags,
            chunks,
        })
    }
}

/// Manifests use the publisher's separator; rebuild the path per component.
fn normalize_path(name: &str) -> PathBuf {
    name.split(['\\', '/'])
        .filter(|part| !part.is_empty())
        .collect()
}
