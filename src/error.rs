//! Error types for the doh-filter relay.

use std::io;

use thiserror::Error;

use crate::dns::wire::WireError;

/// Main error type for doh-filter operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("malformed DNS message: {0}")]
    MalformedMessage(#[from] WireError),

    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(#[from] UpstreamError),

    #[error("blocklist store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("metrics error: {0}")]
    Metrics(String),
}

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    ReadFile(#[source] io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[source] toml::de::Error),

    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),
}

/// Validation errors for configuration values.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("blocklist.ttl_seconds must be greater than 0")]
    ZeroBlocklistTtl,

    #[error("blocklist.ingest_concurrency must be greater than 0")]
    ZeroIngestConcurrency,

    #[error("blocklist.refresh_interval_secs must be greater than 0")]
    ZeroRefreshInterval,

    #[error("upstream_timeout_secs must be greater than 0")]
    ZeroUpstreamTimeout,

    #[error("{field} has invalid URL (must start with http:// or https://): {url:?}")]
    InvalidUrl { field: &'static str, url: String },

    #[error("[store] is unused when blocklist.mode is fetch_per_query; remove it")]
    StoreUnusedInFetchMode,

    #[error("store.{field} cannot be empty")]
    EmptyStoreField { field: &'static str },
}

/// Failures talking to the blocklist source or the upstream resolver.
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// HTTP request failed with a non-success status code.
    #[error("HTTP request failed for {url}: status {status}")]
    HttpStatus {
        /// URL that was requested.
        url: String,
        /// HTTP status code returned.
        status: u16,
    },

    /// Network error during HTTP request.
    #[error("network error calling {url}: {source}")]
    Network {
        /// URL that was requested.
        url: String,
        /// Underlying reqwest error.
        #[source]
        source: reqwest::Error,
    },

    /// The request did not complete in time.
    #[error("timeout calling {url}")]
    Timeout {
        /// URL that timed out.
        url: String,
    },

    /// Failed to create HTTP client.
    #[error("failed to create HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),
}

impl UpstreamError {
    pub(crate) fn from_reqwest(url: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout {
                url: url.to_string(),
            }
        } else {
            Self::Network {
                url: url.to_string(),
                source: err,
            }
        }
    }
}

/// Failures of the backing key-value store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Key exceeds the store's per-key size limit.
    #[error("key of {len} bytes exceeds the {max}-byte limit")]
    KeyTooLong { len: usize, max: usize },

    /// The store could not be reached.
    #[error("store request for key {key:?} failed: {source}")]
    Request {
        key: String,
        #[source]
        source: reqwest::Error,
    },

    /// The store answered with an unexpected status.
    #[error("store returned status {status} for key {key:?}")]
    Status { key: String, status: u16 },

    /// A spawned write task panicked or was cancelled.
    #[error("store write task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    /// Failed to create the store's HTTP client.
    #[error("failed to create store client: {0}")]
    ClientBuild(#[source] reqwest::Error),

    /// Backend-specific failure (used by in-process stores and test doubles).
    #[error("store backend error: {0}")]
    Backend(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;
