//! CLI error type.

use std::fmt;

use depotfetch::config::ConfigError;
use depotfetch::DepotError;

/// Exit status for a job that ran but did not complete every file.
pub const EXIT_INCOMPLETE: i32 = 1;
/// Exit status for invalid arguments or configuration.
pub const EXIT_USAGE: i32 = 2;
/// Exit status for a job that could not start.
pub const EXIT_FATAL: i32 = 3;

/// Errors that stop a command before it produces a result.
#[derive(Debug)]
pub enum CliError {
    /// Invalid arguments or settings.
    Config(String),
    /// The library refused to run the job.
    Depot(DepotError),
}

impl CliError {
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Config(_) => EXIT_USAGE,
            CliError::Depot(DepotError::Config(_)) => EXIT_USAGE,
            CliError::Depot(_) => EXIT_FATAL,
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Config(msg) => write!(f, "{}", msg),
            CliError::Depot(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Config(_) => None,
            CliError::Depot(e) => Some(e),
        }
    }
}

impl From<DepotError> for CliError {
    fn from(e: DepotError) -> Self {
        CliError::Depot(e)
    }
}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        CliError::Depot(DepotError::Config(e))
    }
}
