//! CLI commands.

pub mod common;
pub mod download;
pub mod verify;

use std::path::PathBuf;

use depotfetch::config::ConfigFile;
use depotfetch::logging::{init_logging, LoggingConfig, LoggingGuard, DEFAULT_LEVEL};
use tracing::debug;

use crate::error::CliError;

/// Options shared by every command.
#[derive(Debug, Default)]
pub struct GlobalArgs {
    pub config: Option<PathBuf>,
    pub level: Option<String>,
    pub log_file: Option<PathBuf>,
}

/// Loaded configuration plus the logging guard, alive for the whole command.
pub struct Context {
    config: ConfigFile,
    _logging: LoggingGuard,
}

impl Context {
    pub fn new(args: GlobalArgs) -> Result<Self, CliError> {
        let config = match &args.config {
            Some(path) => ConfigFile::load_from(path)?,
            None => ConfigFile::load()?,
        };

        let logging = LoggingConfig {
            level: args
                .level
                .or_else(|| config.logging.level.clone())
                .unwrap_or_else(|| DEFAULT_LEVEL.to_string()),
            file: args.log_file.or_else(|| config.logging.file.clone()),
            ansi: console::colors_enabled_stderr(),
        };
        let guard = init_logging(&logging)?;

        debug!(
            config = %args
                .config
                .as_deref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "default".to_string()),
            level = %logging.level,
            "depotfetch {} starting",
            env!("CARGO_PKG_VERSION")
        );

        Ok(Self {
            config,
            _logging: guard,
        })
    }

    pub fn config(&self) -> &ConfigFile {
        &self.config
    }
}
