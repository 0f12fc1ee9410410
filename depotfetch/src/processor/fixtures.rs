//! Payload builders for tests.

use std::io::{Cursor, Write};

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use super::cipher::SymmetricCipher;
use crate::keystore::DepotKey;
use crate::manifest::{ChunkId, ChunkIdentity};

/// Wrap `data` in a VZ envelope.
pub fn vz_payload(data: &[u8]) -> Vec<u8> {
    let mut lzma = Vec::new();
    lzma_rs::lzma_compress(&mut Cursor::new(data), &mut lzma).unwrap();

    // lzma_rs writes props (5) + unpacked size (8) before the stream.
    let mut out = b"VZa".to_vec();
    out.extend_from_slice(&[0u8; 4]);
    out.extend_from_slice(&lzma[..5]);
    out.extend_from_slice(&lzma[13..]);
    out.extend_from_slice(&crc32fast::hash(data).to_le_bytes());
    out.extend_from_slice(&(data.len() as u32).to_le_bytes());
    out.extend_from_slice(b"zv");
    out
}

/// Wrap `data` in a single-entry zip archive.
pub fn zip_payload(data: &[u8]) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    writer.start_file("z", options).unwrap();
    writer.write_all(data).unwrap();
    writer.finish().unwrap().into_inner()
}

/// A served chunk: identity plus the encrypted VZ payload.
pub fn served_chunk(key: &DepotKey, data: &[u8]) -> (ChunkIdentity, Vec<u8>) {
    let encrypted = SymmetricCipher::encrypt(key, [0x11; 16], &vz_payload(data)).unwrap();
    let identity = ChunkIdentity::new(
        ChunkId::of(data),
        encrypted.len() as u32,
        data.len() as u32,
    );
    (identity, encrypted)
}

pub fn test_key() -> DepotKey {
    DepotKey::from_bytes(&[0x2b; 32]).unwrap()
}
