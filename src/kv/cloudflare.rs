//! Workers KV store reached through the Cloudflare REST API.

use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, StatusCode, Url};

use super::{KvStore, check_key};
use crate::error::StoreError;

/// Public Cloudflare API endpoint.
pub const DEFAULT_API_BASE: &str = "https://api.cloudflare.com/client/v4";

/// Workers KV refuses expirations shorter than a minute.
const MIN_EXPIRATION_TTL_SECS: u64 = 60;

/// Default timeout for store requests in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// A Workers KV namespace.
#[derive(Clone)]
pub struct CloudflareKv {
    client: Client,
    /// `{api_base}/accounts/{account}/storage/kv/namespaces/{namespace}/values/`
    values_url: Url,
    api_token: String,
}

impl CloudflareKv {
    /// Create a client for one namespace.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created or the resulting
    /// URL is invalid.
    pub fn new(
        api_base: &Url,
        account_id: &str,
        namespace_id: &str,
        api_token: impl Into<String>,
    ) -> Result<Self, StoreError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .user_agent(crate::dns::upstream::USER_AGENT)
            .build()
            .map_err(StoreError::ClientBuild)?;

        let base = api_base.as_str().trim_end_matches('/');
        let values_url = Url::parse(&format!(
            "{base}/accounts/{account_id}/storage/kv/namespaces/{namespace_id}/values/"
        ))
        .map_err(|err| StoreError::Backend(format!("invalid KV URL: {err}")))?;

        Ok(Self {
            client,
            values_url,
            api_token: api_token.into(),
        })
    }

    fn value_url(&self, key: &str) -> Result<Url, StoreError> {
        self.values_url
            .join(key)
            .map_err(|err| StoreError::Backend(format!("invalid key {key:?}: {err}")))
    }
}

impl KvStore for CloudflareKv {
    async fn put(&self, key: String, value: String, ttl: Duration) -> Result<(), StoreError> {
        check_key(&key)?;
        let url = self.value_url(&key)?;
        let expiration_ttl = ttl.as_secs().max(MIN_EXPIRATION_TTL_SECS);

        let response = self
            .client
            .put(url)
            .bearer_auth(&self.api_token)
            .query(&[("expiration_ttl", expiration_ttl)])
            .header(CONTENT_TYPE, "text/plain")
            .body(value)
            .send()
            .await
            .map_err(|source| StoreError::Request {
                key: key.clone(),
                source,
            })?;

        if !response.status().is_success() {
            return Err(StoreError::Status {
                key,
                status: response.status().as_u16(),
            });
        }

        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        check_key(key)?;
        let url = self.value_url(key)?;

        let response = self
            .client
            .get(url)
            .bearer_auth(&self.api_token)
            .send()
            .await
            .map_err(|source| StoreError::Request {
                key: key.to_string(),
                source,
            })?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let value = response
                    .text()
                    .await
                    .map_err(|source| StoreError::Request {
                        key: key.to_string(),
                        source,
                    })?;
                Ok(Some(value))
            }
            status => Err(StoreError::Status {
                key: key.to_string(),
                status: status.as_u16(),
            }),
        }
    }
}
