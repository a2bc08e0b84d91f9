//! Blocklist membership.
//!
//! A blocklist is ingested from source text and answers one question: is
//! this domain on the list? Two backings are provided:
//!
//! - [`HashedBlocklist`]: one key-value entry per domain, keyed by the
//!   SHA-256 digest of the normalized domain and expiring after a retention
//!   window. Keys stay at 64 bytes whatever the domain length.
//! - [`RemoteSetBlocklist`]: nothing persisted; every lookup re-fetches the
//!   source and checks an in-memory set. An unreachable source fails the
//!   lookup.
//!
//! # Supported Formats
//!
//! - **Domain List**: one domain per line, `#` comments
//! - **Hosts File**: `/etc/hosts` format (`0.0.0.0 ads.example.com`)
//!
//! # Example
//!
//! ```
//! use doh_filter::blocklist::{domain_key, normalize_domain};
//!
//! assert_eq!(normalize_domain("  Ads.Example.COM. "), "ads.example.com");
//! assert_eq!(domain_key("ads.example.com"), domain_key("ADS.example.com"));
//! assert_eq!(domain_key("ads.example.com").len(), 64);
//! ```

mod domains;
mod hashed;
mod hosts;
pub mod remote;
mod remote_set;

use std::collections::HashSet;
use std::future::Future;

use sha2::{Digest, Sha256};

pub use domains::DomainListParser;
pub use hashed::HashedBlocklist;
pub use hosts::HostsFileParser;
pub use remote::RemoteLoader;
pub use remote_set::RemoteSetBlocklist;

use crate::config::BlocklistFormat;
use crate::error::{Error, Result};

/// Trait for blocklist parsers.
///
/// Each parser handles one source format and extracts the listed domains in
/// source order, duplicates included.
pub trait BlocklistParser: Send + Sync {
    /// Extract domains from blocklist text.
    fn parse(&self, content: &str) -> Vec<String>;
}

/// Returns a boxed parser for the given blocklist format.
#[must_use]
pub fn parser_for_format(format: BlocklistFormat) -> Box<dyn BlocklistParser> {
    match format {
        BlocklistFormat::Domains => Box::new(DomainListParser),
        BlocklistFormat::Hosts => Box::new(HostsFileParser),
    }
}

/// Parse `content` and return each normalized domain once, in first-seen order.
#[must_use]
pub fn distinct_domains(format: BlocklistFormat, content: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    parser_for_format(format)
        .parse(content)
        .iter()
        .map(|domain| normalize_domain(domain))
        .filter(|domain| !domain.is_empty())
        .filter(|domain| seen.insert(domain.clone()))
        .collect()
}

/// Canonical form used on both the ingest and the lookup side.
///
/// Trims whitespace, drops a single trailing dot and lowercases ASCII.
#[must_use]
pub fn normalize_domain(domain: &str) -> String {
    let domain = domain.trim();
    domain
        .strip_suffix('.')
        .unwrap_or(domain)
        .to_ascii_lowercase()
}

/// Store key for a domain: lowercase hex SHA-256 of its normalized form.
#[must_use]
pub fn domain_key(domain: &str) -> String {
    format!("{:x}", Sha256::digest(normalize_domain(domain).as_bytes()))
}

/// Outcome of one ingest.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestReport {
    /// Distinct domains found in the source.
    pub domains: usize,
    /// Entries confirmed written.
    pub stored: usize,
    /// Entries whose write failed.
    pub failed: usize,
}

impl IngestReport {
    /// True when every domain was stored.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.failed == 0
    }
}

/// Trait for blocklist backings.
pub trait BlocklistStore: Send + Sync + Clone + 'static {
    /// Replace or refresh the list from source text.
    fn ingest(&self, source: &str) -> impl Future<Output = Result<IngestReport>> + Send;

    /// Check membership, surfacing backing failures.
    fn lookup(&self, domain: &str) -> impl Future<Output = Result<bool>> + Send;

    /// Check membership, treating store failures as "not blocked".
    ///
    /// A store failure is logged and counted so it stays distinguishable from
    /// a clean miss. Any other failure, such as an unreachable source, is
    /// returned to the caller.
    fn is_blocked(&self, domain: &str) -> impl Future<Output = Result<bool>> + Send {
        async move {
            match self.lookup(domain).await {
                Err(Error::StoreUnavailable(err)) => {
                    tracing::warn!(domain, error = %err, "blocklist lookup failed, allowing query");
                    metrics::counter!("doh_filter_lookup_errors_total").increment(1);
                    Ok(false)
                }
                other => other,
            }
        }
    }
}
