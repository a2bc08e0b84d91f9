//! Query routing and server orchestration.
//!
//! [`QueryHandler`] holds the per-request logic (decode, look up, answer or
//! forward, ingest) separately from the HTTP layer in [`crate::http`], so it
//! can be exercised with mock collaborators.

use std::future::Future;
use std::time::Duration;

use bytes::Bytes;
use metrics::counter;
use reqwest::Url;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::blocklist::{BlocklistStore, IngestReport, RemoteLoader};
use crate::dns::wire::{HEADER_SIZE, decode_query, encode_nxdomain};
use crate::dns::{DnsResolver, UpstreamResponse};
use crate::error::Result;

/// Answer to a DNS query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DnsReply {
    /// Synthetic NXDOMAIN for a blocked name.
    Blocked([u8; HEADER_SIZE]),
    /// Resolver answer, to be relayed unchanged.
    Forwarded(UpstreamResponse),
}

/// DNS query handler that processes queries using the provided dependencies.
///
/// Holds no per-request state; every clone shares the same blocklist and
/// resolver.
pub struct QueryHandler<B, R>
where
    B: BlocklistStore,
    R: DnsResolver,
{
    blocklist: B,
    resolver: R,
    loader: RemoteLoader,
    source_url: Url,
}

impl<B, R> QueryHandler<B, R>
where
    B: BlocklistStore,
    R: DnsResolver,
{
    /// Create a new query handler.
    ///
    /// `source_url` is fetched with `loader` on every ingest.
    pub const fn new(blocklist: B, resolver: R, loader: RemoteLoader, source_url: Url) -> Self {
        Self {
            blocklist,
            resolver,
            loader,
            source_url,
        }
    }

    pub const fn blocklist(&self) -> &B {
        &self.blocklist
    }

    /// Handle a raw wire-format DNS query.
    ///
    /// Malformed messages are rejected before the blocklist or the resolver
    /// is touched. A failing store lets the query through; an unreachable
    /// blocklist source fails the query without forwarding it.
    #[instrument(skip(self, message), fields(id, domain))]
    pub async fn handle_query(&self, message: Bytes) -> Result<DnsReply> {
        let query = match decode_query(&message) {
            Ok(query) => query,
            Err(err) => {
                warn!(error = %err, bytes = message.len(), "rejecting malformed DNS message");
                counter!("doh_filter_queries_total", "outcome" => "malformed").increment(1);
                return Err(err.into());
            }
        };

        let span = tracing::Span::current();
        span.record("id", query.id);
        span.record("domain", query.name.as_str());

        let blocked = self.blocklist.is_blocked(&query.name).await.inspect_err(|err| {
            warn!(error = %err, "blocklist unavailable, refusing query");
            counter!("doh_filter_queries_total", "outcome" => "blocklist_error").increment(1);
        })?;
        info!(blocked, "DNS query");

        if blocked {
            counter!("doh_filter_queries_total", "outcome" => "blocked").increment(1);
            return Ok(DnsReply::Blocked(encode_nxdomain(query.id)));
        }

        debug!("forwarding to upstream resolver");
        match self.resolver.resolve(message).await {
            Ok(response) => {
                counter!("doh_filter_queries_total", "outcome" => "forwarded").increment(1);
                Ok(DnsReply::Forwarded(response))
            }
            Err(err) => {
                warn!(error = %err, "upstream resolver failed");
                counter!("doh_filter_queries_total", "outcome" => "upstream_error").increment(1);
                Err(err)
            }
        }
    }

    /// Fetch the blocklist source and ingest it.
    #[instrument(skip(self), fields(source = %self.source_url))]
    pub async fn ingest(&self) -> Result<IngestReport> {
        let content = self.loader.fetch(&self.source_url).await.inspect_err(|err| {
            warn!(error = %err, "failed to fetch blocklist source");
            counter!("doh_filter_ingests_total", "result" => "failed").increment(1);
        })?;

        let report = self.blocklist.ingest(&content).await?;

        let result = if report.is_complete() {
            "complete"
        } else {
            "partial"
        };
        counter!("doh_filter_ingests_total", "result" => result).increment(1);
        counter!("doh_filter_ingested_domains_total").increment(report.stored as u64);

        Ok(report)
    }
}

impl<B, R> Clone for QueryHandler<B, R>
where
    B: BlocklistStore,
    R: DnsResolver,
{
    fn clone(&self) -> Self {
        Self {
            blocklist: self.blocklist.clone(),
            resolver: self.resolver.clone(),
            loader: self.loader.clone(),
            source_url: self.source_url.clone(),
        }
    }
}

/// Serve the HTTP router on `listener` until `shutdown` completes.
pub async fn run_server<B, R>(
    listener: TcpListener,
    handler: QueryHandler<B, R>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()>
where
    B: BlocklistStore,
    R: DnsResolver,
{
    axum::serve(listener, crate::http::app(handler))
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}

/// Spawn a task that re-ingests the blocklist every `interval`.
///
/// The first tick fires after one full interval. Failures are logged and the
/// task keeps going.
pub fn spawn_refresh_task<B, R>(handler: QueryHandler<B, R>, interval: Duration) -> JoinHandle<()>
where
    B: BlocklistStore,
    R: DnsResolver,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
        loop {
            ticker.tick().await;
            match handler.ingest().await {
                Ok(report) => info!(
                    domains = report.domains,
                    failed = report.failed,
                    "scheduled blocklist refresh finished"
                ),
                Err(err) => warn!(error = %err, "scheduled blocklist refresh failed"),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocklist::{HashedBlocklist, RemoteSetBlocklist, domain_key};
    use crate::config::BlocklistFormat;
    use crate::dns::upstream::tests::MockResolver;
    use crate::dns::wire::{DNS_MESSAGE_CONTENT_TYPE, WireError};
    use crate::error::{Error, UpstreamError};
    use crate::kv::tests::MockKv;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    type TestHandler = QueryHandler<HashedBlocklist<MockKv>, MockResolver>;

    fn create_query(domain: &str, id: u16) -> Bytes {
        let mut buf = id.to_be_bytes().to_vec();
        buf.extend_from_slice(&[0x01, 0x00, 0x00, 0x01, 0, 0, 0, 0, 0, 0]);
        for label in domain.split('.') {
            buf.push(label.len() as u8);
            buf.extend_from_slice(label.as_bytes());
        }
        buf.extend_from_slice(&[0, 0x00, 0x01, 0x00, 0x01]);
        Bytes::from(buf)
    }

    fn create_handler(store: MockKv, resolver: MockResolver, source_url: &str) -> TestHandler {
        let blocklist = HashedBlocklist::new(
            store,
            Duration::from_secs(86_400),
            BlocklistFormat::Domains,
            16,
        );
        QueryHandler::new(
            blocklist,
            resolver,
            RemoteLoader::new().unwrap(),
            Url::parse(source_url).unwrap(),
        )
    }

    async fn handler_with(blocked: &str) -> (TestHandler, MockKv, MockResolver) {
        let store = MockKv::new();
        let resolver = MockResolver::new();
        let handler = create_handler(store.clone(), resolver.clone(), "http://127.0.0.1:1/list");
        handler.blocklist().ingest(blocked).await.unwrap();
        (handler, store, resolver)
    }

    #[tokio::test]
    async fn test_blocked_domain_gets_nxdomain() {
        let (handler, _store, resolver) = handler_with("ads.example.com\n").await;

        let reply = handler
            .handle_query(create_query("ads.example.com", 0x1234))
            .await
            .unwrap();

        let DnsReply::Blocked(message) = reply else {
            panic!("expected a blocked reply, got {reply:?}");
        };
        assert_eq!(message.len(), 12);
        assert_eq!(&message[..4], &[0x12, 0x34, 0x81, 0x83]);
        // Resolver should not be called for blocked domains
        assert_eq!(resolver.resolve_count(), 0);
    }

    #[tokio::test]
    async fn test_allowed_domain_is_forwarded_unmodified() {
        let (handler, _store, resolver) = handler_with("ads.example.com\n").await;
        let upstream = UpstreamResponse {
            status: 200,
            content_type: Some(DNS_MESSAGE_CONTENT_TYPE.to_string()),
            body: Bytes::from_static(&[0x56, 0x78, 0x81, 0x80, 0, 1]),
        };
        resolver.set_response(upstream.clone()).await;
        let query = create_query("shop.example.com", 0x5678);

        let reply = handler.handle_query(query.clone()).await.unwrap();

        assert_eq!(reply, DnsReply::Forwarded(upstream));
        assert_eq!(resolver.queries().await, vec![query]);
    }

    #[tokio::test]
    async fn test_short_message_is_rejected_without_lookup_or_forward() {
        let (handler, store, resolver) = handler_with("ads.example.com\n").await;
        let gets_before = store.get_call_count();

        let result = handler
            .handle_query(Bytes::from_static(&[1, 2, 3, 4, 5]))
            .await;

        assert!(matches!(
            result,
            Err(Error::MalformedMessage(WireError::TooShort { len: 5 }))
        ));
        assert_eq!(store.get_call_count(), gets_before);
        assert_eq!(resolver.resolve_count(), 0);
    }

    #[tokio::test]
    async fn test_compressed_name_is_rejected() {
        let (handler, _store, resolver) = handler_with("").await;
        let mut message = vec![0u8; 12];
        message.extend_from_slice(&[0xC0, 0x0C]);

        let result = handler.handle_query(Bytes::from(message)).await;

        assert!(matches!(
            result,
            Err(Error::MalformedMessage(WireError::CompressedName { .. }))
        ));
        assert_eq!(resolver.resolve_count(), 0);
    }

    #[tokio::test]
    async fn test_malformed_message_leaves_store_untouched() {
        let (handler, store, _resolver) = handler_with("ads.example.com\n").await;
        let puts_before = store.put_call_count();

        let _ = handler.handle_query(Bytes::from_static(&[0; 3])).await;

        assert_eq!(store.put_call_count(), puts_before);
        assert!(handler.blocklist().lookup("ads.example.com").await.unwrap());
    }

    #[tokio::test]
    async fn test_resolver_error_is_propagated() {
        let (handler, _store, resolver) = handler_with("").await;
        resolver.set_error("https://resolver.test/dns-query").await;

        let result = handler.handle_query(create_query("example.com", 1)).await;

        assert!(matches!(
            result,
            Err(Error::UpstreamUnavailable(UpstreamError::Timeout { .. }))
        ));
    }

    #[tokio::test]
    async fn test_lookup_failure_forwards_query() {
        let (handler, store, resolver) = handler_with("ads.example.com\n").await;
        store.fail_gets().await;

        let reply = handler
            .handle_query(create_query("ads.example.com", 9))
            .await
            .unwrap();

        assert!(matches!(reply, DnsReply::Forwarded(_)));
        assert_eq!(resolver.resolve_count(), 1);
    }

    #[tokio::test]
    async fn test_unreachable_source_fails_query_without_forwarding() {
        let source = Url::parse("http://127.0.0.1:1/list.txt").unwrap();
        let loader = RemoteLoader::new().unwrap();
        let resolver = MockResolver::new();
        let handler = QueryHandler::new(
            RemoteSetBlocklist::new(loader.clone(), source.clone(), BlocklistFormat::Domains),
            resolver.clone(),
            loader,
            source,
        );

        let result = handler
            .handle_query(create_query("ads.example.com", 4))
            .await;

        assert!(matches!(
            result,
            Err(Error::UpstreamUnavailable(UpstreamError::Network { .. }))
        ));
        assert_eq!(resolver.resolve_count(), 0);
    }

    #[tokio::test]
    async fn test_ingest_fetches_source_and_stores_domains() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/blocklist.txt"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string("ads.example.com\ntrack.example.com\n"),
            )
            .expect(1)
            .mount(&server)
            .await;

        let store = MockKv::new();
        let handler = create_handler(
            store.clone(),
            MockResolver::new(),
            &format!("{}/blocklist.txt", server.uri()),
        );

        let report = handler.ingest().await.unwrap();

        assert_eq!(report.domains, 2);
        assert!(report.is_complete());
        assert!(
            store
                .entries
                .read()
                .await
                .contains_key(&domain_key("track.example.com"))
        );
        assert!(handler.blocklist().is_blocked("ads.example.com").await.unwrap());
        assert!(!handler.blocklist().is_blocked("shop.example.com").await.unwrap());
    }

    #[tokio::test]
    async fn test_ingest_propagates_source_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let store = MockKv::new();
        let handler = create_handler(
            store.clone(),
            MockResolver::new(),
            &format!("{}/blocklist.txt", server.uri()),
        );

        let result = handler.ingest().await;

        assert!(matches!(
            result,
            Err(Error::UpstreamUnavailable(UpstreamError::HttpStatus {
                status: 503,
                ..
            }))
        ));
        assert_eq!(store.put_call_count(), 0);
    }

    #[tokio::test]
    async fn test_refresh_task_reingests_periodically() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ads.example.com"))
            .mount(&server)
            .await;

        let store = MockKv::new();
        let handler = create_handler(
            store.clone(),
            MockResolver::new(),
            &format!("{}/blocklist.txt", server.uri()),
        );

        let task = spawn_refresh_task(handler.clone(), Duration::from_millis(50));
        tokio::time::sleep(Duration::from_millis(400)).await;
        task.abort();

        assert!(store.put_call_count() >= 2);
        assert!(handler.blocklist().is_blocked("ads.example.com").await.unwrap());
    }

    #[tokio::test]
    async fn test_handler_clone_shares_blocklist() {
        let (handler1, _store, _resolver) = handler_with("blocked.com\n").await;
        let handler2 = handler1.clone();

        let reply = handler2
            .handle_query(create_query("blocked.com", 1))
            .await
            .unwrap();
        assert!(matches!(reply, DnsReply::Blocked(_)));
    }
}
