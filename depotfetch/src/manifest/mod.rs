//! Depot manifest model.
//!
//! A manifest lists the files of one depot revision and, for each file, the
//! chunks it is assembled from. This module provides:
//! - The in-memory model (`model`)
//! - Well-formedness validation (`validate`)
//! - A JSON loader for decoded manifests (`json`)
//!
//! Binary manifest decoding is not handled here; the loader reads the JSON
//! rendition that a decoder produces.

mod error;
mod json;
mod model;
mod validate;

pub use error::ManifestError;
pub use json::{load_manifest, parse_manifest};
pub use model::{
    ChunkId, ChunkIdentity, ChunkRef, FileEntry, Manifest, CHUNK_ID_LEN, FLAG_DIRECTORY,
};
pub use validate::validate;
