//! End-to-end download through the public API.
//!
//! A fake content server serves encrypted VZ and zip chunks for a manifest
//! loaded from JSON; the depot is downloaded, re-run for resume, and
//! verified.

use std::collections::HashMap;
use std::fs;
use std::io::{Cursor, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use depotfetch::coordinator::{CoordinatorConfig, DownloadCoordinator, FileStatus};
use depotfetch::fetch::{FetchError, HttpClient, RetryPolicy};
use depotfetch::host::{HostPool, HostPoolConfig};
use depotfetch::keystore::{DepotKey, KeyStore};
use depotfetch::manifest::{load_manifest, ChunkId};
use depotfetch::processor::SymmetricCipher;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tempfile::TempDir;

const DEPOT: u32 = 228988;
const KEY_HEX: &str = "4f1c2b7a9e3d5c8b0a6f2e4d1c3b5a7980f1e2d3c4b5a69788f9e0d1c2b3a4f5";

/// Content server with a fixed chunk table. The first request for every
/// chunk on the first host fails.
struct FakeCdn {
    chunks: HashMap<String, Bytes>,
    requests: AtomicUsize,
    flaky_host: String,
    flaked: parking_lot::Mutex<Vec<String>>,
}

impl HttpClient for FakeCdn {
    fn get(&self, url: &str) -> Result<Bytes, FetchError> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        if url.starts_with(&self.flaky_host) {
            let mut flaked = self.flaked.lock();
            if !flaked.iter().any(|u| u == url) {
                flaked.push(url.to_string());
                return Err(FetchError::Status {
                    url: url.to_string(),
                    status: 502,
                });
            }
        }
        let hex = url.rsplit('/').next().unwrap_or_default();
        self.chunks.get(hex).cloned().ok_or_else(|| FetchError::Status {
            url: url.to_string(),
            status: 404,
        })
    }
}

fn vz(data: &[u8]) -> Vec<u8> {
    let mut lzma = Vec::new();
    lzma_rs::lzma_compress(&mut Cursor::new(data), &mut lzma).unwrap();
    let mut out = b"VZa\0\0\0\0".to_vec();
    out.extend_from_slice(&lzma[..5]);
    out.extend_from_slice(&lzma[13..]);
    out.extend_from_slice(&crc32fast::hash(data).to_le_bytes());
    out.extend_from_slice(&(data.len() as u32).to_le_bytes());
    out.extend_from_slice(b"zv");
    out
}

fn zipped(data: &[u8]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    writer
        .start_file("chunk", zip::write::SimpleFileOptions::default())
        .unwrap();
    writer.write_all(data).unwrap();
    writer.finish().unwrap().into_inner()
}

struct Fixture {
    chunks: HashMap<String, Bytes>,
    manifest_json: String,
    noise: Vec<u8>,
}

/// Four files: two share a chunk, one uses a zip payload, one holds
/// incompressible noise. Plus a directory.
fn fixture(key: &DepotKey) -> Fixture {
    let alpha = b"alpha chunk: the first sixty-four bytes of the executable....".to_vec();
    let beta = b"beta chunk, stored as a zip archive".to_vec();
    let shared = vec![0xA5u8; 4096];
    let mut noise = vec![0u8; 8192];
    StdRng::seed_from_u64(0x5eed).fill(&mut noise[..]);

    let mut chunks = HashMap::new();
    let mut describe = |data: &[u8], payload: Vec<u8>| {
        let encrypted = SymmetricCipher::encrypt(key, [7u8; 16], &payload).unwrap();
        let sha = ChunkId::of(data).to_hex();
        let json = format!(
            r#""sha": "{}", "cb_original": {}, "cb_compressed": {}"#,
            sha,
            data.len(),
            encrypted.len()
        );
        chunks.insert(sha, Bytes::from(encrypted));
        json
    };

    let a = describe(&alpha, vz(&alpha));
    let b = describe(&beta, zipped(&beta));
    let s = describe(&shared, vz(&shared));
    let n = describe(&noise, vz(&noise));

    let manifest_json = format!(
        r#"{{
            "depot_id": {DEPOT},
            "manifest_id": 7,
            "files": [
                {{ "filename": "bin\\game.bin", "size": {game_size}, "flags": 0, "chunks": [
                    {{ {s}, "offset": {alpha_len} }},
                    {{ {a}, "offset": 0 }}
                ] }},
                {{ "filename": "data\\beta.txt", "size": {beta_len}, "chunks": [
                    {{ {b}, "offset": 0 }}
                ] }},
                {{ "filename": "data\\pad.bin", "size": 4096, "chunks": [
                    {{ {s}, "offset": 0 }}
                ] }},
                {{ "filename": "data\\noise.bin", "size": 8192, "chunks": [
                    {{ {n}, "offset": 0 }}
                ] }},
                {{ "filename": "logs", "flags": 64 }}
            ]
        }}"#,
        game_size = alpha.len() + shared.len(),
        alpha_len = alpha.len(),
        beta_len = beta.len(),
    );

    Fixture {
        chunks,
        manifest_json,
        noise,
    }
}

#[test]
fn test_download_resume_and_verify() {
    let key = DepotKey::from_hex(KEY_HEX).unwrap();
    let keys = KeyStore::new().with_hex_key(DEPOT, KEY_HEX).unwrap();
    let fx = fixture(&key);

    let work = TempDir::new().unwrap();
    let manifest_path = work.path().join("manifest.json");
    fs::write(&manifest_path, &fx.manifest_json).unwrap();
    let manifest = load_manifest(&manifest_path).unwrap();
    assert_eq!(manifest.distinct_chunks(), 4);

    let output = work.path().join(DEPOT.to_string());
    let cdn = Arc::new(FakeCdn {
        chunks: fx.chunks.clone(),
        requests: AtomicUsize::new(0),
        flaky_host: "http://cache1.test".to_string(),
        flaked: parking_lot::Mutex::new(Vec::new()),
    });
    let hosts = HostPool::new(
        ["http://cache1.test", "http://cache2.test"],
        HostPoolConfig::default(),
    )
    .unwrap();
    let config = CoordinatorConfig::new(output.clone())
        .with_concurrency(2)
        .with_retry_policy(RetryPolicy::immediate(3));

    let coordinator = DownloadCoordinator::new(config.clone(), cdn.clone());
    let result = coordinator.run(&manifest, &keys, &hosts).unwrap();

    assert!(result.is_success(), "{:?}", result.failures);
    assert_eq!(result.exit_code(), 0);
    assert_eq!(result.stats.chunks_fetched, 4);

    let game = fs::read(output.join("bin").join("game.bin")).unwrap();
    assert!(game.starts_with(b"alpha chunk"));
    assert!(game[game.len() - 4096..].iter().all(|b| *b == 0xA5));
    assert_eq!(
        fs::read(output.join("data").join("beta.txt")).unwrap(),
        b"beta chunk, stored as a zip archive"
    );
    assert_eq!(fs::read(output.join("data").join("pad.bin")).unwrap(), vec![0xA5u8; 4096]);
    assert_eq!(fs::read(output.join("data").join("noise.bin")).unwrap(), fx.noise);
    assert!(output.join("logs").is_dir());

    // Second run: everything is already on disk
    let before = cdn.requests.load(Ordering::SeqCst);
    let rerun = DownloadCoordinator::new(config.clone(), cdn.clone())
        .run(&manifest, &keys, &hosts)
        .unwrap();
    assert!(rerun.is_success());
    assert_eq!(cdn.requests.load(Ordering::SeqCst), before);
    assert_eq!(rerun.stats.chunks_resumed, 5);
    assert_eq!(fs::read(output.join("bin").join("game.bin")).unwrap(), game);

    let verified = DownloadCoordinator::new(config, cdn.clone())
        .verify(&manifest)
        .unwrap();
    assert_eq!(verified.count(FileStatus::Complete), 5);
}

#[test]
fn test_missing_depot_key_is_an_error() {
    let key = DepotKey::from_hex(KEY_HEX).unwrap();
    let fx = fixture(&key);
    let manifest = depotfetch::manifest::parse_manifest(&fx.manifest_json).unwrap();
    let work = TempDir::new().unwrap();

    let cdn = Arc::new(FakeCdn {
        chunks: fx.chunks,
        requests: AtomicUsize::new(0),
        flaky_host: String::new(),
        flaked: parking_lot::Mutex::new(Vec::new()),
    });
    let hosts = HostPool::new(["http://cache1.test"], HostPoolConfig::default()).unwrap();
    let coordinator =
        DownloadCoordinator::new(CoordinatorConfig::new(work.path().join("out")), cdn.clone());

    let err = coordinator.run(&manifest, &KeyStore::new(), &hosts).unwrap_err();
    assert!(err.to_string().contains("228988"));
    assert_eq!(cdn.requests.load(Ordering::SeqCst), 0);
}
