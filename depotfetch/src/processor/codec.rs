//! Chunk payload decompression.
//!
//! Decrypted payloads come in one of two envelopes:
//!
//! - **VZ**: `"VZ"`, version byte `'a'`, 4 bytes of metadata, 5 bytes of LZMA
//!   properties, a raw LZMA1 stream, then a footer of CRC-32 (LE), plaintext
//!   size (LE) and `"zv"`.
//! - **Zip**: a PKZIP archive whose first entry is the plaintext.

use std::io::{Cursor, Read};

use lzma_rs::decompress::{Options, UnpackedSize};

use super::{ChunkDecompressor, ProcessError};
use crate::manifest::ChunkIdentity;

const VZ_MAGIC: &[u8; 2] = b"VZ";
const VZ_FOOTER_MAGIC: &[u8; 2] = b"zv";
const VZ_VERSION: u8 = b'a';
const VZ_HEADER_LEN: usize = 7;
const VZ_PROPS_LEN: usize = 5;
const VZ_FOOTER_LEN: usize = 10;

/// Auto-detecting decompressor for VZ and zip payloads.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChunkCodec;

impl ChunkDecompressor for ChunkCodec {
    fn decompress(&self, payload: &[u8], identity: &ChunkIdentity) -> Result<Vec<u8>, ProcessError> {
        if payload.starts_with(VZ_MAGIC) {
            decode_vz(payload, identity)
        } else {
            decode_zip(payload, identity)
        }
    }
}

fn decode_vz(payload: &[u8], identity: &ChunkIdentity) -> Result<Vec<u8>, ProcessError> {
    if payload.len() < VZ_HEADER_LEN + VZ_PROPS_LEN + VZ_FOOTER_LEN {
        return Err(ProcessError::Decompress(format!(
            "VZ payload too short ({} bytes)",
            payload.len()
        )));
    }
    if payload[2] != VZ_VERSION {
        return Err(ProcessError::Decompress(format!(
            "unsupported VZ version {:#04x}",
            payload[2]
        )));
    }

    let footer = &payload[payload.len() - VZ_FOOTER_LEN..];
    if &footer[8..] != VZ_FOOTER_MAGIC {
        return Err(ProcessError::Decompress("missing VZ footer".to_string()));
    }
    let expected_crc = u32::from_le_bytes([footer[0], footer[1], footer[2], footer[3]]);
    let size = u32::from_le_bytes([footer[4], footer[5], footer[6], footer[7]]);
    if size != identity.original_len {
        return Err(ProcessError::Decompress(format!(
            "VZ footer declares {} bytes, chunk has {}",
            size, identity.original_len
        )));
    }

    let stream = &payload[VZ_HEADER_LEN..payload.len() - VZ_FOOTER_LEN];
    let options = Options {
        unpacked_size: UnpackedSize::UseProvided(Some(u64::from(size))),
        ..Default::default()
    };
    let mut output = Vec::with_capacity(size as usize);
    lzma_rs::lzma_decompress_with_options(&mut Cursor::new(stream), &mut output, &options)
        .map_err(|e| ProcessError::Decompress(format!("LZMA: {}", e)))?;

    let actual_crc = crc32fast::hash(&output);
    if actual_crc != expected_crc {
        return Err(ProcessError::ChecksumMismatch {
            expected: expected_crc,
            actual: actual_crc,
        });
    }
    Ok(output)
}

fn decode_zip(payload: &[u8], identity: &ChunkIdentity) -> Result<Vec<u8>, ProcessError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(payload))
        .map_err(|e| ProcessError::Decompress(format!("zip: {}", e)))?;
    let mut entry = archive
        .by_index(0)
        .map_err(|e| ProcessError::Decompress(format!("zip: {}", e)))?;

    let mut output = Vec::with_capacity(identity.original_len as usize);
    entry
        .read_to_end(&mut output)
        .map_err(|e| ProcessError::Decompress(format!("zip: {}", e)))?;
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::super::fixtures::{vz_payload, zip_payload};
    use super::*;
    use crate::manifest::ChunkId;

    fn identity(data: &[u8]) -> ChunkIdentity {
        ChunkIdentity::new(ChunkId::of(data), 0, data.len() as u32)
    }

    #[test]
    fn test_decode_vz() {
        let data = b"the quick brown fox jumps over the lazy dog, repeatedly. ".repeat(20);
        let payload = vz_payload(&data);
        assert!(payload.starts_with(b"VZa"));
        assert_eq!(ChunkCodec.decompress(&payload, &identity(&data)).unwrap(), data);
    }

    #[test]
    fn test_decode_zip() {
        let data = vec![0x42u8; 4096];
        let payload = zip_payload(&data);
        assert!(payload.starts_with(b"PK"));
        assert_eq!(ChunkCodec.decompress(&payload, &identity(&data)).unwrap(), data);
    }

    #[test]
    fn test_vz_crc_mismatch() {
        let data = b"checksum me".to_vec();
        let mut payload = vz_payload(&data);
        let crc_at = payload.len() - 10;
        payload[crc_at] ^= 0xff;
        assert!(matches!(
            ChunkCodec.decompress(&payload, &identity(&data)),
            Err(ProcessError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_vz_bad_version_and_footer() {
        let data = b"abc".to_vec();
        let mut payload = vz_payload(&data);
        payload[2] = b'b';
        assert!(matches!(
            ChunkCodec.decompress(&payload, &identity(&data)),
            Err(ProcessError::Decompress(_))
        ));

        let mut payload = vz_payload(&data);
        let end = payload.len() - 1;
        payload[end] = b'x';
        assert!(ChunkCodec.decompress(&payload, &identity(&data)).is_err());

        assert!(ChunkCodec.decompress(b"VZa", &identity(&data)).is_err());
    }

    #[test]
    fn test_vz_footer_size_must_match_chunk() {
        let data = b"sized by the manifest".to_vec();
        let mut payload = vz_payload(&data);
        let size_at = payload.len() - 6;
        payload[size_at..size_at + 4].copy_from_slice(&u32::MAX.to_le_bytes());

        let err = ChunkCodec.decompress(&payload, &identity(&data)).unwrap_err();
        assert!(matches!(err, ProcessError::Decompress(ref msg) if msg.contains("4294967295")));

        // A footer that is consistent with itself but not with the manifest
        let payload = vz_payload(&data);
        let short = ChunkIdentity::new(ChunkId::of(&data), 0, 4);
        assert!(matches!(
            ChunkCodec.decompress(&payload, &short),
            Err(ProcessError::Decompress(_))
        ));
    }

    #[test]
    fn test_garbage_is_undecodable() {
        let err = ChunkCodec
            .decompress(b"definitely not an archive", &identity(b"x"))
            .unwrap_err();
        assert!(err.is_structural());
    }
}
