//! Configuration loading and validation.

use std::net::SocketAddr;
use std::path::Path;

use reqwest::Url;
use serde::Deserialize;

use crate::error::{ConfigError, Result, ValidationError};

/// Main configuration for the doh-filter relay.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Address the HTTP server binds to.
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,

    /// DoH endpoint receiving queries that are not blocked.
    #[serde(
        default = "default_upstream_resolver",
        deserialize_with = "deserialize_url"
    )]
    pub upstream_resolver: Url,

    /// Timeout for a single upstream resolver call, in seconds.
    #[serde(default = "default_upstream_timeout")]
    pub upstream_timeout_secs: u64,

    /// Blocklist source and retention settings.
    pub blocklist: BlocklistSettings,

    /// Backing store for the hashed blocklist.
    #[serde(default)]
    pub store: StoreSettings,

    /// Prometheus exporter settings.
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Where the blocklist comes from and how it is kept.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BlocklistSettings {
    /// Source URL returning the list as text.
    #[serde(deserialize_with = "deserialize_url")]
    pub url: Url,

    /// Format of the source text.
    #[serde(default)]
    pub format: BlocklistFormat,

    /// How membership is stored.
    #[serde(default)]
    pub mode: BlocklistMode,

    /// Retention of each stored entry, in seconds.
    #[serde(default = "default_blocklist_ttl")]
    pub ttl_seconds: u64,

    /// Maximum store writes in flight during an ingest.
    #[serde(default = "default_ingest_concurrency")]
    pub ingest_concurrency: usize,

    /// Ingest once before serving.
    #[serde(default)]
    pub ingest_on_startup: bool,

    /// Re-ingest periodically so entries do not lapse.
    pub refresh_interval_secs: Option<u64>,
}

/// Blocklist source formats.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlocklistFormat {
    /// One domain per line.
    #[default]
    Domains,
    /// `/etc/hosts` format.
    Hosts,
}

/// Blocklist backing strategies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlocklistMode {
    /// Digest-keyed entries with a TTL in the configured store.
    #[default]
    Hashed,
    /// Re-fetch the source on every lookup; nothing is stored.
    FetchPerQuery,
}

/// Key-value store backing the hashed blocklist.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase", deny_unknown_fields)]
pub enum StoreSettings {
    /// In-process store, lost on restart. Entries leave only by expiring.
    Memory {},
    /// Cloudflare Workers KV namespace.
    Cloudflare {
        account_id: String,
        namespace_id: String,
        api_token: String,
        #[serde(default = "default_api_base", deserialize_with = "deserialize_url")]
        api_base: Url,
    },
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self::Memory {}
    }
}

/// Prometheus exporter settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MetricsConfig {
    /// Expose `/metrics` for scraping.
    #[serde(default)]
    pub enabled: bool,

    /// Exporter listen address.
    #[serde(default = "default_metrics_listen")]
    pub listen: SocketAddr,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen: default_metrics_listen(),
        }
    }
}

fn default_listen() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8787))
}

fn default_metrics_listen() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 9090))
}

fn default_upstream_resolver() -> Url {
    Url::parse("https://1.1.1.1/dns-query").expect("static URL is valid")
}

fn default_api_base() -> Url {
    Url::parse(crate::kv::DEFAULT_API_BASE).expect("static URL is valid")
}

const fn default_upstream_timeout() -> u64 {
    5
}

const fn default_blocklist_ttl() -> u64 {
    86_400
}

const fn default_ingest_concurrency() -> usize {
    64
}

fn deserialize_url<'de, D>(deserializer: D) -> std::result::Result<Url, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    s.parse().map_err(serde::de::Error::custom)
}

fn check_http_url(field: &'static str, url: &Url) -> std::result::Result<(), ValidationError> {
    if matches!(url.scheme(), "http" | "https") {
        Ok(())
    } else {
        Err(ValidationError::InvalidUrl {
            field,
            url: url.to_string(),
        })
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadFile)?;
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).map_err(ConfigError::Parse)?;
        config.validate().map_err(ConfigError::from)?;
        Ok(config)
    }

    /// Validate the configuration.
    fn validate(&self) -> std::result::Result<(), ValidationError> {
        if self.upstream_timeout_secs == 0 {
            return Err(ValidationError::ZeroUpstreamTimeout);
        }
        check_http_url("upstream_resolver", &self.upstream_resolver)?;

        let blocklist = &self.blocklist;
        check_http_url("blocklist.url", &blocklist.url)?;
        if blocklist.ttl_seconds == 0 {
            return Err(ValidationError::ZeroBlocklistTtl);
        }
        if blocklist.ingest_concurrency == 0 {
            return Err(ValidationError::ZeroIngestConcurrency);
        }
        if blocklist.refresh_interval_secs == Some(0) {
            return Err(ValidationError::ZeroRefreshInterval);
        }

        if blocklist.mode == BlocklistMode::FetchPerQuery
            && matches!(self.store, StoreSettings::Cloudflare { .. })
        {
            return Err(ValidationError::StoreUnusedInFetchMode);
        }

        if let StoreSettings::Cloudflare {
            account_id,
            namespace_id,
            api_token,
            api_base,
        } = &self.store
        {
            for (field, value) in [
                ("account_id", account_id),
                ("namespace_id", namespace_id),
                ("api_token", api_token),
            ] {
                if value.trim().is_empty() {
                    return Err(ValidationError::EmptyStoreField { field });
                }
            }
            check_http_url("store.api_base", api_base)?;
        }

        Ok(())
    }
}
