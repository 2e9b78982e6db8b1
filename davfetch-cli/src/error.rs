//! CLI error type.

use std::fmt;

use davfetch::config::ConfigError;
use davfetch::logging::LoggingError;
use davfetch::{TransferError, TransferFailure};

/// Exit code for a cancelled transfer (128 + SIGINT).
const EXIT_CANCELLED: u8 = 130;

/// Errors surfaced by CLI commands.
#[derive(Debug)]
pub enum CliError {
    /// Configuration file could not be loaded.
    Config(ConfigError),
    /// Logging could not be set up.
    Logging(LoggingError),
    /// HTTP client could not be built.
    Transport(TransferError),
    /// The transfer failed after every retry.
    Transfer(TransferFailure),
    /// Any other setup problem.
    Setup(String),
}

impl CliError {
    /// Process exit code for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            CliError::Transfer(failure) if failure.error.is_cancelled() => EXIT_CANCELLED,
            CliError::Config(_) | CliError::Setup(_) => 2,
            _ => 1,
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Config(e) => write!(f, "Configuration error: {}", e),
            CliError::Logging(e) => write!(f, "Logging error: {}", e),
            CliError::Transport(e) => write!(f, "Failed to create HTTP client: {}", e),
            CliError::Transfer(failure) => {
                write!(f, "Download failed: {}", failure.error)?;
                if failure.bytes_transferred > 0 {
                    write!(
                        f,
                        "\n{} bytes are kept locally; run the same command again to resume",
                        failure.bytes_transferred
                    )?;
                }
                Ok(())
            }
            CliError::Setup(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for CliError {}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        CliError::Config(e)
    }
}

impl From<LoggingError> for CliError {
    fn from(e: LoggingError) -> Self {
        CliError::Logging(e)
    }
}

impl From<TransferFailure> for CliError {
    fn from(e: TransferFailure) -> Self {
        CliError::Transfer(e)
    }
}
