//! INI configuration file.
//!
//! Default location: `~/.config/depotfetch/config.ini` (platform config dir).
//!
//! ```ini
//! [download]
//! servers = http://cache1.example.com, http://cache2.example.com
//! threads = 32
//! retries = 3
//! timeout = 10
//! output = /data/depots
//!
//! [hosts]
//! failure_threshold = 3
//! cooldown = 30
//!
//! [logging]
//! level = info
//! file = /var/log/depotfetch.log
//!
//! [depots]
//! 228988 = 0123...cdef
//! ```
//!
//! Every value is optional. Command line flags override the file, and
//! built-in defaults apply to whatever neither sets.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use ini::Ini;
use thiserror::Error;

use crate::host::HostPoolConfig;
use crate::keystore::{DepotKey, KeyError, KeyStore};

/// Errors for loading the configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", path.display())]
    Read { path: PathBuf, source: io::Error },

    #[error("invalid config file: {0}")]
    Parse(String),

    #[error("invalid value '{value}' for [{section}] {key}: {reason}")]
    InvalidValue {
        section: String,
        key: String,
        value: String,
        reason: String,
    },

    #[error("invalid key for depot '{depot}': {source}")]
    InvalidKey { depot: String, source: KeyError },
}

/// `[download]` section.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DownloadSettings {
    pub servers: Vec<String>,
    pub threads: Option<usize>,
    pub retries: Option<u32>,
    /// Request timeout in seconds.
    pub timeout: Option<u64>,
    /// Output root; a depot goes to `<output>/<depot_id>` when set here.
    pub output: Option<PathBuf>,
}

/// `[hosts]` section.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostSettings {
    pub failure_threshold: Option<u32>,
    /// Cool-down in seconds.
    pub cooldown: Option<u64>,
}

impl HostSettings {
    /// Pool configuration with defaults for unset values.
    pub fn pool_config(&self) -> HostPoolConfig {
        let mut config = HostPoolConfig::default();
        if let Some(threshold) = self.failure_threshold {
            config = config.with_failure_threshold(threshold);
        }
        if let Some(cooldown) = self.cooldown {
            config = config.with_cooldown(Duration::from_secs(cooldown));
        }
        config
    }
}

/// `[logging]` section.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogSettings {
    pub level: Option<String>,
    pub file: Option<PathBuf>,
}

/// Parsed configuration file.
#[derive(Debug, Clone, Default)]
pub struct ConfigFile {
    pub download: DownloadSettings,
    pub hosts: HostSettings,
    pub logging: LogSettings,
    /// Keys from the `[depots]` section.
    pub keys: KeyStore,
}

/// Default configuration file location.
pub fn config_file_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("depotfetch")
        .join("config.ini")
}

impl ConfigFile {
    /// Load from the default location. A missing file yields the defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = config_file_path();
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    /// Load from an explicit path. The file must exist.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_ini_str(&content)
    }

    /// Parse INI text.
    pub fn from_ini_str(content: &str) -> Result<Self, ConfigError> {
        let ini = Ini::load_from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        let mut config = Self::default();

        if let Some(section) = ini.section(Some("download")) {
            let d = &mut config.download;
            if let Some(servers) = section.get("servers") {
                d.servers = parse_server_list(servers);
            }
            d.threads = parse_value(section.get("threads"), "download", "threads")?;
            d.retries = parse_value(section.get("retries"), "download", "retries")?;
            d.timeout = parse_value(section.get("timeout"), "download", "timeout")?;
            d.output = non_empty(section.get("output")).map(PathBuf::from);
        }

        if let Some(section) = ini.section(Some("hosts")) {
            let h = &mut config.hosts;
            h.failure_threshold =
                parse_value(section.get("failure_threshold"), "hosts", "failure_threshold")?;
            h.cooldown = parse_value(section.get("cooldown"), "hosts", "cooldown")?;
        }

        if let Some(section) = ini.section(Some("logging")) {
            config.logging.level = non_empty(section.get("level")).map(str::to_string);
            config.logging.file = non_empty(section.get("file")).map(PathBuf::from);
        }

        if let Some(section) = ini.section(Some("depots")) {
            for (depot, key) in section.iter() {
                let depot_id: u32 = depot.trim().parse().map_err(|_| ConfigError::InvalidValue {
                    section: "depots".to_string(),
                    key: depot.to_string(),
                    value: key.to_string(),
                    reason: "depot id must be a number".to_string(),
                })?;
                let key = DepotKey::from_hex(key).map_err(|e| ConfigError::InvalidKey {
                    depot: depot.to_string(),
                    source: e,
                })?;
                config.keys.insert(depot_id, key);
            }
        }

        Ok(config)
    }
}

/// Split a comma-separated server list, dropping blanks.
pub fn parse_server_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn parse_value<T>(value: Option<&str>, section: &str, key: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match non_empty(value) {
        None => Ok(None),
        Some(v) => v.parse().map(Some).map_err(|e: T::Err| ConfigError::InvalidValue {
            section: section.to_string(),
            key: key.to_string(),
            value: v.to_string(),
            reason: e.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const KEY: &str = "0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef";

    #[test]
    fn test_full_config() {
        let content = format!(
            "[download]\n\
             servers = http://a.example.com, ,http://b.example.com\n\
             threads = 8\n\
             retries = 5\n\
             timeout = 20\n\
             output = /tmp/depots\n\
             [hosts]\n\
             failure_threshold = 2\n\
             cooldown = 45\n\
             [logging]\n\
             level = debug\n\
             [depots]\n\
             228988 = {KEY}\n"
        );
        let config = ConfigFile::from_ini_str(&content).unwrap();

        assert_eq!(
            config.download.servers,
            vec!["http://a.example.com", "http://b.example.com"]
        );
        assert_eq!(config.download.threads, Some(8));
        assert_eq!(config.download.retries, Some(5));
        assert_eq!(config.download.timeout, Some(20));
        assert_eq!(config.download.output, Some(PathBuf::from("/tmp/depots")));
        assert_eq!(config.logging.level.as_deref(), Some("debug"));
        assert_eq!(config.logging.file, None);
        assert!(config.keys.get(228988).is_some());

        let pool = config.hosts.pool_config();
        assert_eq!(pool.failure_threshold, 2);
        assert_eq!(pool.cooldown, Duration::from_secs(45));
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = ConfigFile::from_ini_str("").unwrap();
        assert!(config.download.servers.is_empty());
        assert_eq!(config.download.threads, None);
        assert!(config.keys.is_empty());
        assert_eq!(config.hosts.pool_config(), HostPoolConfig::default());
    }

    #[test]
    fn test_invalid_number() {
        let err = ConfigFile::from_ini_str("[download]\nthreads = many\n").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue { ref key, .. } if key == "threads"
        ));
    }

    #[test]
    fn test_invalid_depot_key() {
        let err = ConfigFile::from_ini_str("[depots]\n1 = abcd\n").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidKey { .. }));

        let err = ConfigFile::from_ini_str(&format!("[depots]\nabc = {KEY}\n")).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[download]\nservers = http://only.example.com").unwrap();

        let config = ConfigFile::load_from(file.path()).unwrap();
        assert_eq!(config.download.servers, vec!["http://only.example.com"]);
    }

    #[test]
    fn test_load_missing_file_is_error() {
        let result = ConfigFile::load_from(Path::new("/nonexistent/config.ini"));
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }

    #[test]
    fn test_parse_server_list() {
        assert_eq!(parse_server_list(" a ,b,, c"), vec!["a", "b", "c"]);
        assert!(parse_server_list("").is_empty());
    }

    #[test]
    fn test_config_file_path() {
        assert!(config_file_path().ends_with("depotfetch/config.ini"));
    }
}
