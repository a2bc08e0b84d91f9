//! Key-value store trait and implementations.
//!
//! The blocklist only needs two capabilities from its backing store: write a
//! key with a time-to-live, and read a key back while it is still live.
//!
//! - [`MokaKv`]: in-process store with per-entry expiry
//! - [`CloudflareKv`]: Workers KV namespace over the Cloudflare REST API

mod cloudflare;
mod memory;

use std::future::Future;
use std::time::Duration;

pub use cloudflare::{CloudflareKv, DEFAULT_API_BASE};
pub use memory::MokaKv;

use crate::error::StoreError;

/// Largest key, in bytes, accepted by the networked store.
pub const MAX_KEY_BYTES: usize = 512;

/// Trait for blocklist backing stores.
pub trait KvStore: Send + Sync + Clone + 'static {
    /// Store `value` under `key`, expiring after `ttl`.
    fn put(
        &self,
        key: String,
        value: String,
        ttl: Duration,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Read a live value, `None` if absent or expired.
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<String>, StoreError>> + Send;
}

/// Reject keys the networked store would refuse.
pub(crate) fn check_key(key: &str) -> Result<(), StoreError> {
    if key.len() > MAX_KEY_BYTES {
        return Err(StoreError::KeyTooLong {
            len: key.len(),
            max: MAX_KEY_BYTES,
        });
    }
    Ok(())
}
