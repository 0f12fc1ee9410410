//! Setting resolution shared across commands.
//!
//! Every setting resolves as: command line flag, then config file, then the
//! built-in default.

use std::path::PathBuf;
use std::time::Duration;

use depotfetch::config::{parse_server_list, ConfigFile};
use depotfetch::coordinator::DEFAULT_CONCURRENCY;
use depotfetch::fetch::{DEFAULT_MAX_ATTEMPTS, DEFAULT_TIMEOUT_SECS};
use depotfetch::keystore::{DepotKey, KeyStore};

use crate::error::CliError;

/// Output directory: `-o`, else `<config output>/<depot>`, else `./<depot>`.
pub fn resolve_output(cli_output: Option<PathBuf>, depot_id: u32, config: &ConfigFile) -> PathBuf {
    cli_output.unwrap_or_else(|| {
        config
            .download
            .output
            .clone()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(depot_id.to_string())
    })
}

/// Content servers from the command line, else from the config file.
pub fn resolve_servers(cli_servers: &[String], config: &ConfigFile) -> Result<Vec<String>, CliError> {
    let servers: Vec<String> = cli_servers
        .iter()
        .flat_map(|s| parse_server_list(s))
        .collect();

    let servers = if servers.is_empty() {
        config.download.servers.clone()
    } else {
        servers
    };

    if servers.is_empty() {
        return Err(CliError::Config(
            "No content servers configured. \
             Use --server or set servers in the [download] section of config.ini"
                .to_string(),
        ));
    }
    Ok(servers)
}

/// Key store for `depot_id`: `-k` wins over the config's `[depots]` table.
pub fn resolve_keys(
    cli_key: Option<&str>,
    depot_id: u32,
    config: &ConfigFile,
) -> Result<KeyStore, CliError> {
    let mut keys = KeyStore::new();
    if let Some(hex) = cli_key {
        let key = DepotKey::from_hex(hex)
            .map_err(|e| CliError::Config(format!("Invalid --key for depot {}: {}", depot_id, e)))?;
        keys.insert(depot_id, key);
    }
    keys.merge_missing(&config.keys);
    Ok(keys)
}

pub fn resolve_threads(cli_threads: Option<usize>, config: &ConfigFile) -> Result<usize, CliError> {
    let threads = cli_threads
        .or(config.download.threads)
        .unwrap_or(DEFAULT_CONCURRENCY);
    if threads == 0 {
        return Err(CliError::Config("Thread count must be at least 1".to_string()));
    }
    Ok(threads)
}

pub fn resolve_retries(cli_retries: Option<u32>, config: &ConfigFile) -> Result<u32, CliError> {
    let retries = cli_retries
        .or(config.download.retries)
        .unwrap_or(DEFAULT_MAX_ATTEMPTS);
    if retries == 0 {
        return Err(CliError::Config("Retry count must be at least 1".to_string()));
    }
    Ok(retries)
}

pub fn resolve_timeout(cli_timeout: Option<u64>, config: &ConfigFile) -> Duration {
    Duration::from_secs(
        cli_timeout
            .or(config.download.timeout)
            .unwrap_or(DEFAULT_TIMEOUT_SECS),
    )
}
