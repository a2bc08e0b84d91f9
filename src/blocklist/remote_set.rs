//! Blocklist rebuilt from its source on every lookup.

use std::collections::HashSet;

use reqwest::Url;

use super::{BlocklistStore, IngestReport, RemoteLoader, distinct_domains, normalize_domain};
use crate::config::BlocklistFormat;
use crate::error::Result;

/// Blocklist with no persistent state.
///
/// Each lookup fetches the source and tests the domain against a freshly
/// built set of exact names. Always current and free of key-size limits, at
/// the cost of one source fetch per query.
#[derive(Clone)]
pub struct RemoteSetBlocklist {
    loader: RemoteLoader,
    url: Url,
    format: BlocklistFormat,
}

impl RemoteSetBlocklist {
    pub const fn new(loader: RemoteLoader, url: Url, format: BlocklistFormat) -> Self {
        Self {
            loader,
            url,
            format,
        }
    }
}

impl BlocklistStore for RemoteSetBlocklist {
    async fn ingest(&self, source: &str) -> Result<IngestReport> {
        // nothing to persist; report what a lookup would see
        let domains = distinct_domains(self.format, source).len();
        Ok(IngestReport {
            domains,
            stored: domains,
            failed: 0,
        })
    }

    async fn lookup(&self, domain: &str) -> Result<bool> {
        let domain = normalize_domain(domain);
        if domain.is_empty() {
            return Ok(false);
        }

        let content = self.loader.fetch(&self.url).await?;
        let blocked: HashSet<String> = distinct_domains(self.format, &content)
            .into_iter()
            .collect();

        Ok(blocked.contains(&domain))
    }
}
