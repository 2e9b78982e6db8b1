//! Transport adapter seam.
//!
//! The engine never talks HTTP directly. It asks a [`TransportFactory`] for
//! one [`RangeTransport`] per worker and issues blocking GETs through it.
//! A transport is bound to one connection/session and is used from exactly
//! one thread; the factory is shared.
//!
//! [`RemoteSize`] resolves an object's length before a transfer starts.
//!
//! The reqwest-backed implementation lives in [`http`]; tests substitute
//! scripted in-memory transports.

mod http;

pub use http::{ReqwestFactory, ReqwestTransport};

use std::time::Duration;

use bytes::Bytes;

use crate::download::{ByteRange, ContentRange};
use crate::error::TransferResult;

/// Default request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Response to a single GET.
#[derive(Debug, Clone)]
pub struct RangeResponse {
    /// HTTP status code.
    pub status: u16,
    /// Complete response body.
    pub body: Bytes,
    /// Parsed `Content-Range` header, if present and well formed.
    pub content_range: Option<ContentRange>,
}

impl RangeResponse {
    /// Response without a `Content-Range` header.
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            body: body.into(),
            content_range: None,
        }
    }

    /// Whether the status is in the 2xx class.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// One blocking connection to the remote.
///
/// Not shared between threads; each worker owns its own instance.
pub trait RangeTransport: Send {
    /// Performs a GET, optionally restricted to `range`.
    ///
    /// # Arguments
    ///
    /// * `url` - Object URL
    /// * `range` - Byte range to request, or `None` for the whole object
    ///
    /// # Returns
    ///
    /// The response, whatever its status, or a `Transport` error when no
    /// response was obtained.
    fn get(&mut self, url: &str, range: Option<ByteRange>) -> TransferResult<RangeResponse>;
}

/// Provisions transports, one per worker.
pub trait TransportFactory: Send + Sync {
    /// Opens a new, independent transport.
    fn connect(&self) -> TransferResult<Box<dyn RangeTransport>>;
}

/// Resolves the length of a remote object.
pub trait RemoteSize: Send + Sync {
    /// Object length in bytes, or `None` when it cannot be determined.
    fn remote_size(&self, url: &str) -> Option<u64>;
}

/// Basic-auth credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// Connection settings shared by every transport a factory opens.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Per-request timeout, covering the body download.
    pub timeout: Duration,
    /// Credentials sent with every request.
    pub credentials: Option<Credentials>,
    /// `User-Agent` header value.
    pub user_agent: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            credentials: None,
            user_agent: format!("davfetch/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl TransportConfig {
    /// Set the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set basic-auth credentials.
    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }
}
