//! Blocklist persisted as digest-keyed entries in a key-value store.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use super::{BlocklistStore, IngestReport, distinct_domains, domain_key, normalize_domain};
use crate::config::BlocklistFormat;
use crate::error::{Result, StoreError};
use crate::kv::KvStore;

/// Value written for every listed domain.
const PRESENT_MARKER: &str = "1";

/// Blocklist stored one entry per domain in a [`KvStore`].
///
/// Entries expire after `ttl` unless a later ingest rewrites them. Domains
/// dropped from the source are not deleted (the keyspace cannot be
/// enumerated); they lapse when their TTL runs out.
#[derive(Clone)]
pub struct HashedBlocklist<S: KvStore> {
    store: S,
    ttl: Duration,
    format: BlocklistFormat,
    concurrency: usize,
}

impl<S: KvStore> HashedBlocklist<S> {
    /// Create a blocklist over `store` with the given retention window.
    ///
    /// At most `concurrency` writes are in flight during an ingest.
    pub fn new(store: S, ttl: Duration, format: BlocklistFormat, concurrency: usize) -> Self {
        Self {
            store,
            ttl,
            format,
            concurrency: concurrency.max(1),
        }
    }

    /// The backing store.
    pub const fn store(&self) -> &S {
        &self.store
    }
}

impl<S: KvStore> BlocklistStore for HashedBlocklist<S> {
    async fn ingest(&self, source: &str) -> Result<IngestReport> {
        let domains = distinct_domains(self.format, source);
        let limiter = Arc::new(Semaphore::new(self.concurrency));
        let mut writes = JoinSet::new();

        for domain in &domains {
            let store = self.store.clone();
            let limiter = Arc::clone(&limiter);
            let key = domain_key(domain);
            let ttl = self.ttl;

            writes.spawn(async move {
                let _permit = limiter
                    .acquire_owned()
                    .await
                    .map_err(|err| StoreError::Backend(err.to_string()))?;
                store.put(key, PRESENT_MARKER.to_string(), ttl).await
            });
        }

        let mut report = IngestReport {
            domains: domains.len(),
            ..IngestReport::default()
        };

        while let Some(joined) = writes.join_next().await {
            match joined.map_err(StoreError::from).and_then(|written| written) {
                Ok(()) => report.stored += 1,
                Err(err) => {
                    report.failed += 1;
                    tracing::warn!(error = %err, "failed to store blocklist entry");
                }
            }
        }

        tracing::info!(
            domains = report.domains,
            stored = report.stored,
            failed = report.failed,
            "blocklist ingested"
        );

        Ok(report)
    }

    async fn lookup(&self, domain: &str) -> Result<bool> {
        if normalize_domain(domain).is_empty() {
            return Ok(false);
        }

        Ok(self.store.get(&domain_key(domain)).await?.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::kv::MokaKv;
    use crate::kv::tests::MockKv;

    const DAY: Duration = Duration::from_secs(86_400);

    fn blocklist(store: MockKv) -> HashedBlocklist<MockKv> {
        HashedBlocklist::new(store, DAY, BlocklistFormat::Domains, 8)
    }

    #[tokio::test]
    async fn should_block_ingested_domains_only() {
        let list = blocklist(MockKv::new());

        let report = list
            .ingest("ads.example.com\ntrack.example.com\n")
            .await
            .unwrap();

        assert_eq!(
            report,
            IngestReport {
                domains: 2,
                stored: 2,
                failed: 0
            }
        );
        assert!(list.lookup("ads.example.com").await.unwrap());
        assert!(list.lookup("track.example.com").await.unwrap());
        assert!(!list.lookup("shop.example.com").await.unwrap());
    }

    #[tokio::test]
    async fn should_store_digest_keys_with_ttl() {
        let store = MockKv::new();
        let list = blocklist(store.clone());

        list.ingest("ads.example.com").await.unwrap();

        let entries = store.entries.read().await;
        let (value, ttl) = entries.get(&domain_key("ads.example.com")).unwrap();
        assert_eq!(value, PRESENT_MARKER);
        assert_eq!(*ttl, DAY);
        assert!(!entries.contains_key("ads.example.com"));
    }

    #[tokio::test]
    async fn should_write_each_distinct_domain_once() {
        let store = MockKv::new();
        let list = blocklist(store.clone());

        let report = list
            .ingest("a.com\nA.com\n  a.com.  \n\nb.com\n")
            .await
            .unwrap();

        assert_eq!(report.domains, 2);
        assert_eq!(store.put_call_count(), 2);
    }

    #[tokio::test]
    async fn should_give_same_results_when_ingested_twice() {
        let store = MockKv::new();
        let list = blocklist(store.clone());
        let source = "ads.example.com\ntrack.example.com\n";

        let first = list.ingest(source).await.unwrap();
        let blocked_first = (
            list.lookup("ads.example.com").await.unwrap(),
            list.lookup("shop.example.com").await.unwrap(),
        );
        let second = list.ingest(source).await.unwrap();
        let blocked_second = (
            list.lookup("ads.example.com").await.unwrap(),
            list.lookup("shop.example.com").await.unwrap(),
        );

        assert_eq!(first, second);
        assert_eq!(blocked_first, (true, false));
        assert_eq!(blocked_first, blocked_second);
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn should_match_case_insensitively() {
        let list = blocklist(MockKv::new());
        list.ingest("Ads.Example.com").await.unwrap();

        assert!(list.lookup("ADS.EXAMPLE.COM").await.unwrap());
        assert!(list.lookup("ads.example.com.").await.unwrap());
    }

    #[tokio::test]
    async fn should_surface_partial_failures() {
        let store = MockKv::new();
        store.fail_put(domain_key("bad.example.com")).await;
        let list = blocklist(store.clone());

        let report = list
            .ingest("good.example.com\nbad.example.com\nfine.example.com")
            .await
            .unwrap();

        assert_eq!(
            report,
            IngestReport {
                domains: 3,
                stored: 2,
                failed: 1
            }
        );
        assert!(!report.is_complete());
        assert!(list.lookup("good.example.com").await.unwrap());
        assert!(!list.lookup("bad.example.com").await.unwrap());
    }

    #[tokio::test]
    async fn should_keep_keys_under_store_limit_for_huge_domains() {
        let store = MockKv::new();
        let list = blocklist(store.clone());
        let huge = format!("{}.example.com", "x".repeat(1000));

        let report = list.ingest(&huge).await.unwrap();

        assert!(report.is_complete());
        assert!(list.lookup(&huge).await.unwrap());
    }

    #[tokio::test]
    async fn should_not_query_store_for_empty_name() {
        let store = MockKv::new();
        let list = blocklist(store.clone());

        assert!(!list.lookup("").await.unwrap());
        assert_eq!(store.get_call_count(), 0);
    }

    #[tokio::test]
    async fn should_surface_lookup_failure_and_fail_closed() {
        let store = MockKv::new();
        let list = blocklist(store.clone());
        list.ingest("ads.example.com").await.unwrap();
        store.fail_gets().await;

        assert!(matches!(
            list.lookup("ads.example.com").await,
            Err(Error::StoreUnavailable(_))
        ));
        assert!(!list.is_blocked("ads.example.com").await.unwrap());
    }

    #[tokio::test]
    async fn should_ingest_with_single_write_in_flight() {
        let store = MockKv::new();
        let list = HashedBlocklist::new(store.clone(), DAY, BlocklistFormat::Domains, 1);
        let source: String = (0..50).map(|i| format!("d{i}.example.com\n")).collect();

        let report = list.ingest(&source).await.unwrap();

        assert_eq!(report.stored, 50);
        assert_eq!(store.len().await, 50);
    }

    #[tokio::test]
    async fn should_ingest_hosts_format() {
        let list = HashedBlocklist::new(MockKv::new(), DAY, BlocklistFormat::Hosts, 4);

        list.ingest("127.0.0.1 localhost\n0.0.0.0 ads.example.com")
            .await
            .unwrap();

        assert!(list.is_blocked("ads.example.com").await.unwrap());
        assert!(!list.is_blocked("localhost").await.unwrap());
    }

    #[tokio::test]
    async fn should_block_every_domain_of_a_large_ingest_in_moka_store() {
        let list = HashedBlocklist::new(MokaKv::new(), DAY, BlocklistFormat::Domains, 16);
        let source: String = (0..2_000).map(|i| format!("ads{i}.example.com\n")).collect();

        let report = list.ingest(&source).await.unwrap();

        assert_eq!(report.stored, 2_000);
        for i in 0..2_000 {
            let domain = format!("ads{i}.example.com");
            assert!(list.is_blocked(&domain).await.unwrap(), "{domain}");
        }
    }

    #[tokio::test]
    async fn should_expire_entries_in_moka_store() {
        let list = HashedBlocklist::new(
            MokaKv::new(),
            Duration::from_millis(50),
            BlocklistFormat::Domains,
            4,
        );
        list.ingest("ads.example.com").await.unwrap();
        assert!(list.is_blocked("ads.example.com").await.unwrap());

        tokio::time::sleep(Duration::from_millis(300)).await;

        assert!(!list.is_blocked("ads.example.com").await.unwrap());
    }
}
