//! Remote blocklist source fetcher.

use std::time::Duration;

use reqwest::{Client, Url};

use crate::dns::upstream::USER_AGENT;
use crate::error::UpstreamError;

/// Default timeout for HTTP requests in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Fetches blocklist text from HTTP(S) sources.
#[derive(Clone)]
pub struct RemoteLoader {
    client: Client,
}

impl RemoteLoader {
    /// Create a new remote loader.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new() -> Result<Self, UpstreamError> {
        Self::with_timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    /// Create a loader with a custom request timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn with_timeout(timeout: Duration) -> Result<Self, UpstreamError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .gzip(true)
            .build()
            .map_err(UpstreamError::ClientBuild)?;

        Ok(Self { client })
    }

    /// Fetch the raw text of a blocklist.
    ///
    /// # Errors
    ///
    /// Returns an [`UpstreamError`] if:
    /// - The HTTP request fails ([`UpstreamError::Network`])
    /// - The server returns a non-success status ([`UpstreamError::HttpStatus`])
    /// - The request times out ([`UpstreamError::Timeout`])
    pub async fn fetch(&self, url: &Url) -> Result<String, UpstreamError> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|err| UpstreamError::from_reqwest(url.as_str(), err))?;

        if !response.status().is_success() {
            return Err(UpstreamError::HttpStatus {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }

        let content = response
            .text()
            .await
            .map_err(|err| UpstreamError::from_reqwest(url.as_str(), err))?;

        tracing::debug!(url = %url, bytes = content.len(), "fetched blocklist source");
        Ok(content)
    }
}
