//! Logging setup.
//!
//! Logs go to stderr and, optionally, to a file through a non-blocking
//! writer. `RUST_LOG` overrides the configured level when set.

use std::fs;
use std::path::PathBuf;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::{self, time::LocalTime};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::error::DepotError;

/// Default log level for this crate's targets.
pub const DEFAULT_LEVEL: &str = "info";

/// Logging options.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Level for depotfetch targets (`error`, `warn`, `info`, `debug`, `trace`).
    pub level: String,
    /// Optional log file, written without colors.
    pub file: Option<PathBuf>,
    /// Colored stderr output.
    pub ansi: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: DEFAULT_LEVEL.to_string(),
            file: None,
            ansi: true,
        }
    }
}

/// Keeps the file writer alive; logs are flushed when it is dropped.
#[must_use = "dropping the guard stops file logging"]
pub struct LoggingGuard {
    _file_guard: Option<WorkerGuard>,
}

/// Filter directives for `level`: our crates at `level`, everything else at
/// `warn`.
pub fn default_directives(level: &str) -> String {
    let level = level.trim().to_lowercase();
    format!("warn,depotfetch={level},depotfetch_cli={level}")
}

fn filter_for(level: &str) -> Result<EnvFilter, DepotError> {
    EnvFilter::try_new(default_directives(level))
        .map_err(|e| DepotError::Logging(format!("invalid log level '{}': {}", level, e)))
}

/// Install the global subscriber.
pub fn init_logging(config: &LoggingConfig) -> Result<LoggingGuard, DepotError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => filter_for(&config.level)?,
    };

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(config.ansi)
        .with_target(false)
        .with_timer(LocalTime::rfc_3339());

    let (file_layer, file_guard) = match &config.file {
        Some(path) => {
            let name = path.file_name().ok_or_else(|| {
                DepotError::Logging(format!("log file path {} has no file name", path.display()))
            })?;
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("."));
            fs::create_dir_all(&dir).map_err(|e| DepotError::Io {
                path: dir.clone(),
                source: e,
            })?;

            let appender = tracing_appender::rolling::never(&dir, name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_timer(LocalTime::rfc_3339());
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| DepotError::Logging(e.to_string()))?;

    Ok(LoggingGuard {
        _file_guard: file_guard,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directives() {
        assert_eq!(
            default_directives(" DEBUG "),
            "warn,depotfetch=debug,depotfetch_cli=debug"
        );
    }

    #[test]
    fn test_filter_accepts_known_levels() {
        for level in ["error", "warn", "info", "debug", "trace"] {
            assert!(filter_for(level).is_ok(), "{level}");
        }
    }

    #[test]
    fn test_filter_rejects_unknown_level() {
        assert!(matches!(filter_for("loud"), Err(DepotError::Logging(_))));
    }

    #[test]
    fn test_default_config() {
        let config = LoggingConfig::default();
        assert_eq!(config.level, "info");
        assert!(config.file.is_none());
    }
}
