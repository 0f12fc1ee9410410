//! depotfetch - chunked depot retrieval and reconstruction
//!
//! This library downloads the content of a depot described by a manifest and
//! rebuilds its files on local storage. Every file is made of content-addressed
//! chunks that are served encrypted and compressed by a set of interchangeable
//! content servers.
//!
//! # Architecture
//!
//! ```text
//! Manifest ──► DownloadCoordinator ──► WorkQueue (one item per distinct chunk)
//!                    │                        │
//!                    │                 worker threads
//!                    │                        │
//!                    │              ChunkFetcher ──► HostPool (failover)
//!                    │                        │
//!                    │              ChunkProcessor (decrypt, decompress, verify)
//!                    │                        │
//!                    └──────────────► FileWriter (positioned writes) ──► disk
//! ```
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use depotfetch::coordinator::{CoordinatorConfig, DownloadCoordinator};
//! use depotfetch::fetch::ReqwestClient;
//! use depotfetch::host::{HostPool, HostPoolConfig};
//! use depotfetch::keystore::KeyStore;
//! use depotfetch::manifest::load_manifest;
//!
//! let manifest = load_manifest("228988.json".as_ref())?;
//! let keys = KeyStore::new().with_hex_key(228988, "d0e1...")?;
//! let hosts = HostPool::new(["http://cache1.example.com"], HostPoolConfig::default())?;
//!
//! let coordinator = DownloadCoordinator::new(
//!     CoordinatorConfig::new("out".into()),
//!     Arc::new(ReqwestClient::new()?),
//! );
//! let result = coordinator.run(&manifest, &keys, &hosts)?;
//! std::process::exit(result.exit_code());
//! ```

pub mod config;
pub mod coordinator;
pub mod error;
pub mod fetch;
pub mod host;
pub mod keystore;
pub mod logging;
pub mod manifest;
pub mod processor;
pub mod writer;

pub use error::{DepotError, DepotResult};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
