//! CLI error type.

use std::fmt;

use volstream::config::ConfigError;
use volstream::loader::LoadError;
use volstream::logging::LogError;

/// Errors surfaced to the user by the `volstream` binary.
#[derive(Debug)]
pub enum CliError {
    /// Bad command-line arguments.
    Args(String),

    /// Configuration could not be loaded or written.
    Config(ConfigError),

    /// The load could not be planned.
    Plan(LoadError),

    /// Logging could not be set up.
    Logging(LogError),

    /// Output could not be serialized.
    Output(String),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Args(msg) => write!(f, "Invalid arguments: {}", msg),
            CliError::Config(e) => write!(f, "Configuration error: {}", e),
            CliError::Plan(e) => write!(f, "Failed to plan load: {}", e),
            CliError::Logging(e) => write!(f, "Failed to set up logging: {}", e),
            CliError::Output(msg) => write!(f, "Failed to write output: {}", msg),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Config(e) => Some(e),
            CliError::Plan(e) => Some(e),
            CliError::Logging(e) => Some(e),
            CliError::Args(_) | CliError::Output(_) => None,
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        CliError::Config(e)
    }
}

impl From<LoadError> for CliError {
    fn from(e: LoadError) -> Self {
        CliError::Plan(e)
    }
}

impl From<LogError> for CliError {
    fn from(e: LogError) -> Self {
        CliError::Logging(e)
    }
}

impl From<serde_json::Error> for CliError {
    fn from(e: serde_json::Error) -> Self {
        CliError::Output(e.to_string())
    }
}
