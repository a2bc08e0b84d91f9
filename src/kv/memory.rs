//! In-process key-value store backed by Moka.

use std::time::{Duration, Instant};

use moka::Expiry;
use moka::future::Cache;

use super::KvStore;
use crate::error::StoreError;

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    ttl: Duration,
}

/// Expires every entry after the TTL it was written with.
struct EntryTtl;

impl Expiry<String, Entry> for EntryTtl {
    fn expire_after_create(
        &self,
        _key: &String,
        entry: &Entry,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(entry.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        entry: &Entry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        // a re-ingest restarts the retention window
        Some(entry.ttl)
    }
}

/// Production in-process store using Moka.
///
/// Entries leave only when their TTL runs out. There is no size bound: an
/// evicted entry would silently unblock a listed domain.
#[derive(Clone)]
pub struct MokaKv {
    inner: Cache<String, Entry>,
}

impl MokaKv {
    /// Create an empty store.
    pub fn new() -> Self {
        let cache = Cache::builder().expire_after(EntryTtl).build();

        Self { inner: cache }
    }

    /// Returns the approximate number of live entries.
    pub fn entry_count(&self) -> u64 {
        self.inner.entry_count()
    }
}

impl Default for MokaKv {
    fn default() -> Self {
        Self::new()
    }
}

impl KvStore for MokaKv {
    async fn put(&self, key: String, value: String, ttl: Duration) -> Result<(), StoreError> {
        self.inner.insert(key, Entry { value, ttl }).await;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.inner.get(key).await.map(|entry| entry.value))
    }
}
