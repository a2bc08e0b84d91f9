//! Upstream DNS-over-HTTPS resolver.
//!
//! Provides abstraction over forwarding to enable:
//! - Testing with mock resolvers
//! - Swapping the upstream transport without touching the router

use std::future::Future;
use std::time::Duration;

use bytes::Bytes;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Client, Url};

use super::wire::DNS_MESSAGE_CONTENT_TYPE;
use crate::error::{Result, UpstreamError};

/// User-Agent header value for HTTP requests.
pub const USER_AGENT: &str = concat!("doh-filter/", env!("CARGO_PKG_VERSION"));

/// A resolver answer, relayed to the client without modification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamResponse {
    /// HTTP status returned by the resolver.
    pub status: u16,
    /// `Content-Type` returned by the resolver, if any.
    pub content_type: Option<String>,
    /// Raw response body.
    pub body: Bytes,
}

/// Trait for forwarding DNS queries that were not blocked.
///
/// The query bytes are forwarded exactly as received.
pub trait DnsResolver: Send + Sync + Clone + 'static {
    /// Forward a raw wire-format query and return the resolver's answer.
    fn resolve(&self, query: Bytes) -> impl Future<Output = Result<UpstreamResponse>> + Send;
}

/// Forwards queries to a DoH endpoint (e.g. `https://1.1.1.1/dns-query`).
#[derive(Clone)]
pub struct DohResolver {
    client: Client,
    url: Url,
}

impl DohResolver {
    /// Create a resolver for `url` with a per-request timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(url: Url, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(UpstreamError::ClientBuild)?;

        Ok(Self { client, url })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

impl DnsResolver for DohResolver {
    async fn resolve(&self, query: Bytes) -> Result<UpstreamResponse> {
        let url = self.url.as_str();
        let response = self
            .client
            .post(self.url.clone())
            .header(CONTENT_TYPE, DNS_MESSAGE_CONTENT_TYPE)
            .header(ACCEPT, DNS_MESSAGE_CONTENT_TYPE)
            .body(query)
            .send()
            .await
            .map_err(|err| UpstreamError::from_reqwest(url, err))?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let body = response
            .bytes()
            .await
            .map_err(|err| UpstreamError::from_reqwest(url, err))?;

        tracing::debug!(status, bytes = body.len(), "upstream resolver answered");

        Ok(UpstreamResponse {
            status,
            content_type,
            body,
        })
    }
}
