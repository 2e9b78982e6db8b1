//! reqwest-backed transport.

use reqwest::blocking::{Client, RequestBuilder};
use reqwest::header::{CONTENT_LENGTH, CONTENT_RANGE, RANGE};
use tracing::debug;

use super::{RangeResponse, RangeTransport, RemoteSize, TransportConfig, TransportFactory};
use crate::download::{ByteRange, ContentRange};
use crate::error::{TransferError, TransferResult};

fn build_client(config: &TransportConfig) -> TransferResult<Client> {
    Client::builder()
        .timeout(config.timeout)
        .user_agent(config.user_agent.clone())
        .build()
        .map_err(|e| TransferError::transport("", format!("failed to create HTTP client: {}", e)))
}

fn authorize(request: RequestBuilder, config: &TransportConfig) -> RequestBuilder {
    match &config.credentials {
        Some(creds) => request.basic_auth(&creds.username, Some(&creds.password)),
        None => request,
    }
}

/// One HTTP client bound to one worker.
///
/// Each transport owns its own [`Client`] and therefore its own connection
/// pool; nothing is shared with other workers.
pub struct ReqwestTransport {
    client: Client,
    config: TransportConfig,
}

impl ReqwestTransport {
    /// Creates a transport with its own client.
    pub fn new(config: TransportConfig) -> TransferResult<Self> {
        let client = build_client(&config)?;
        Ok(Self { client, config })
    }
}

impl RangeTransport for ReqwestTransport {
    fn get(&mut self, url: &str, range: Option<ByteRange>) -> TransferResult<RangeResponse> {
        let mut request = authorize(self.client.get(url), &self.config);
        if let Some(range) = range {
            request = request.header(RANGE, range.header_value());
        }

        let response = request
            .send()
            .map_err(|e| TransferError::transport(url, format!("request failed: {}", e)))?;

        let status = response.status().as_u16();
        let content_range = response
            .headers()
            .get(CONTENT_RANGE)
            .and_then(|v| v.to_str().ok())
            .and_then(ContentRange::parse);

        let body = response
            .bytes()
            .map_err(|e| TransferError::transport(url, format!("failed to read body: {}", e)))?;

        debug!(url, status, bytes = body.len(), "GET complete");

        Ok(RangeResponse {
            status,
            body,
            content_range,
        })
    }
}

/// Opens a fresh [`ReqwestTransport`] per worker and answers size queries.
#[derive(Debug, Clone)]
pub struct ReqwestFactory {
    config: TransportConfig,
    metadata_client: Client,
}

impl ReqwestFactory {
    /// Creates a factory; fails only if the TLS backend cannot initialize.
    pub fn new(config: TransportConfig) -> TransferResult<Self> {
        let metadata_client = build_client(&config)?;
        Ok(Self {
            config,
            metadata_client,
        })
    }

    /// Settings applied to every transport.
    pub fn config(&self) -> &TransportConfig {
        &self.config
    }
}

impl TransportFactory for ReqwestFactory {
    fn connect(&self) -> TransferResult<Box<dyn RangeTransport>> {
        Ok(Box::new(ReqwestTransport::new(self.config.clone())?))
    }
}

impl RemoteSize for ReqwestFactory {
    /// Length from a HEAD request's `Content-Length`.
    ///
    /// A missing, unparsable or zero length is reported as unknown.
    fn remote_size(&self, url: &str) -> Option<u64> {
        let response = authorize(self.metadata_client.head(url), &self.config)
            .send()
            .ok()
            .filter(|r| r.status().is_success())?;

        response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse::<u64>().ok())
            .filter(|&len| len > 0)
    }
}
