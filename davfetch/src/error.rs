//! Error types for range transfers.
//!
//! Errors fall into five classes with different retry treatment:
//!
//! | Variant | Range-level retry | Whole-transfer retry |
//! |---|---|---|
//! | `Transport` | yes | yes |
//! | `Protocol` (retryable) | yes | yes |
//! | `Protocol` (not retryable) | no | no |
//! | `Storage` | no | no |
//! | `Cancelled` | no | no |
//! | `Configuration` | no | no |

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::download::ByteRange;

/// Result type for transfer operations.
pub type TransferResult<T> = Result<T, TransferError>;

/// Errors that can occur while transferring a remote object.
#[derive(Debug, Error)]
pub enum TransferError {
    /// No HTTP response was obtained (connection, DNS, TLS, timeout).
    #[error("transport error for {url}: {message}")]
    Transport { url: String, message: String },

    /// A response arrived but it was not what the engine asked for.
    #[error("protocol error for {url}: {message}")]
    Protocol {
        url: String,
        status: Option<u16>,
        message: String,
        retryable: bool,
    },

    /// Local file create/seek/write failure.
    #[error("storage error at {}: {source}", path.display())]
    Storage {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The caller raised the cancellation flag.
    #[error("transfer cancelled")]
    Cancelled,

    /// The transfer cannot be carried out as requested.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl TransferError {
    /// Creates a transport-level error.
    pub fn transport(url: &str, message: impl Into<String>) -> Self {
        Self::Transport {
            url: url.to_string(),
            message: message.into(),
        }
    }

    /// Creates an error for a status code other than the one expected.
    ///
    /// Server errors (5xx) are retryable; everything else is fatal.
    pub fn unexpected_status(url: &str, status: u16) -> Self {
        Self::Protocol {
            url: url.to_string(),
            status: Some(status),
            message: format!("unexpected HTTP status {}", status),
            retryable: (500..600).contains(&status),
        }
    }

    /// Creates an error for a partial-content response without a body.
    pub fn empty_body(url: &str, range: ByteRange) -> Self {
        Self::Protocol {
            url: url.to_string(),
            status: Some(206),
            message: format!("empty body for range {}", range),
            retryable: true,
        }
    }

    /// Creates an error for a partial-content body whose length does not match the range.
    pub fn length_mismatch(url: &str, range: ByteRange, actual: u64) -> Self {
        Self::Protocol {
            url: url.to_string(),
            status: Some(206),
            message: format!(
                "range {} returned {} bytes, expected {}",
                range,
                actual,
                range.len()
            ),
            retryable: true,
        }
    }

    /// Creates an error for a partial-content response describing a different range.
    pub fn range_mismatch(url: &str, requested: ByteRange, returned: ByteRange) -> Self {
        Self::Protocol {
            url: url.to_string(),
            status: Some(206),
            message: format!("requested range {} but server sent {}", requested, returned),
            retryable: true,
        }
    }

    /// Creates an error for a server that answered a ranged request with the full object.
    pub fn range_ignored(url: &str, body_len: u64, total: u64) -> Self {
        Self::Protocol {
            url: url.to_string(),
            status: Some(200),
            message: format!(
                "server ignored Range and returned {} of {} bytes",
                body_len, total
            ),
            retryable: false,
        }
    }

    /// Creates an error for a transfer that ended without writing every byte.
    pub fn incomplete(url: &str, written: u64, total: u64) -> Self {
        Self::Protocol {
            url: url.to_string(),
            status: None,
            message: format!("transfer ended at byte {} of {}", written, total),
            retryable: true,
        }
    }

    /// Creates a local storage error.
    pub fn storage(path: &Path, source: io::Error) -> Self {
        Self::Storage {
            path: path.to_path_buf(),
            source,
        }
    }

    /// HTTP status associated with this error, if one was received.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Protocol { status, .. } => *status,
            _ => None,
        }
    }

    /// Whether a worker may retry the same range after this error.
    pub fn is_range_retryable(&self) -> bool {
        match self {
            Self::Transport { .. } => true,
            Self::Protocol { retryable, .. } => *retryable,
            Self::Storage { .. } | Self::Cancelled | Self::Configuration(_) => false,
        }
    }

    /// Whether the coordinator may re-run the whole transfer after this error.
    pub fn is_transfer_retryable(&self) -> bool {
        self.is_range_retryable()
    }

    /// Whether this error is a user cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Terminal failure reported to the caller once every retry budget is spent.
///
/// Carries the last underlying error together with the number of bytes that
/// are persisted locally, so the caller can decide whether to resume (call
/// again with the same target) or discard the partial output.
#[derive(Debug, Error)]
#[error("{error} (stopped at byte {bytes_transferred} after {attempts} attempt(s))")]
pub struct TransferFailure {
    /// The error that ended the last attempt.
    #[source]
    pub error: TransferError,
    /// Bytes persisted locally when the transfer gave up.
    pub bytes_transferred: u64,
    /// Number of whole-transfer attempts made.
    pub attempts: u32,
}
