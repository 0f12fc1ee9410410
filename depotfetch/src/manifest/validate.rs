//! Manifest well-formedness checks.
//!
//! Writers rely on chunk ranges never overlapping, so this runs before a job
//! opens any file. Checks per file:
//! - the path is relative and stays inside the output root
//! - offsets never go backwards and ranges never overlap
//! - every chunk ends within the declared size
//! - chunk lengths add up to the declared size
//!
//! Across the manifest, paths must be unique and a chunk id must always be
//! declared with the same plaintext and download lengths.

use std::collections::{HashMap, HashSet};
use std::path::{Component, Path};

use super::error::ManifestError;
use super::model::{ChunkId, ChunkIdentity, FileEntry, Manifest};

/// Validate a manifest. Chunks must already be sorted by offset.
pub fn validate(manifest: &Manifest) -> Result<(), ManifestError> {
    let mut paths = HashSet::new();
    let mut identities: HashMap<ChunkId, ChunkIdentity> = HashMap::new();

    for file in &manifest.files {
        check_path(&file.path)?;
        if !paths.insert(file.path.as_path()) {
            return Err(ManifestError::DuplicatePath {
                path: file.path.clone(),
            });
        }

        if file.is_directory() {
            if !file.chunks.is_empty() {
                return Err(ManifestError::DirectoryWithChunks {
                    path: file.path.clone(),
                });
            }
            continue;
        }

        check_layout(file)?;

        for chunk in &file.chunks {
            let identity = chunk.identity;
            match identities.get(&identity.id) {
                Some(first) => check_same_identity(first, &identity)?,
                None => {
                    identities.insert(identity.id, identity);
                }
            }
        }
    }

    Ok(())
}

fn check_path(path: &Path) -> Result<(), ManifestError> {
    let invalid = |reason: &str| ManifestError::InvalidPath {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    };

    if path.as_os_str().is_empty() {
        return Err(invalid("path is empty"));
    }
    for component in path.components() {
        match component {
            Component::Normal(_) | Component::CurDir => {}
            Component::ParentDir => return Err(invalid("path escapes the output root")),
            Component::RootDir | Component::Prefix(_) => {
                return Err(invalid("path must be relative"))
            }
        }
    }
    Ok(())
}

fn check_layout(file: &FileEntry) -> Result<(), ManifestError> {
    let mut previous: Option<(u64, u64)> = None;

    for chunk in &file.chunks {
        let end = chunk.end();
        if let Some((prev_offset, prev_end)) = previous {
            if chunk.offset < prev_offset {
                return Err(ManifestError::UnorderedChunks {
                    path: file.path.clone(),
                    offset: chunk.offset,
                    previous: prev_offset,
                });
            }
            if chunk.offset < prev_end {
                return Err(ManifestError::OverlappingChunks {
                    path: file.path.clone(),
                    offset: chunk.offset,
                    previous_end: prev_end,
                });
            }
        }
        if end > file.size {
            return Err(ManifestError::ChunkOutOfBounds {
                path: file.path.clone(),
                offset: chunk.offset,
                end,
                size: file.size,
            });
        }
        previous = Some((chunk.offset, end));
    }

    let actual = file.chunk_bytes();
    if actual != file.size {
        return Err(ManifestError::SizeMismatch {
            path: file.path.clone(),
            declared: file.size,
            actual,
        });
    }

    Ok(())
}

fn check_same_identity(first: &ChunkIdentity, second: &ChunkIdentity) -> Result<(), ManifestError> {
    let mismatch = |field: &'static str, a: u32, b: u32| ManifestError::InconsistentChunk {
        chunk: first.id.to_hex(),
        field,
        first: a,
        second: b,
    };
    if first.original_len != second.original_len {
        return Err(mismatch("original_len", first.original_len, second.original_len));
    }
    if first.compressed_len != second.compressed_len {
        return Err(mismatch("compressed_len", first.compressed_len, second.compressed_len));
    }
    Ok(())
}
