//! HTTP routes.
//!
//! - `POST /dns-query`: body is a raw DNS wire message
//! - `GET /dns-query?dns=<base64url>`: RFC 8484 GET form
//! - `GET|POST /ingest`: fetch the blocklist source and store it
//! - anything else: health check

use axum::Router;
use axum::body::{Body, Bytes};
use axum::extract::{Query, State};
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::Deserialize;
use tower_http::trace::TraceLayer;

use crate::blocklist::BlocklistStore;
use crate::dns::wire::DNS_MESSAGE_CONTENT_TYPE;
use crate::dns::{DnsResolver, UpstreamResponse};
use crate::error::{Error, Result};
use crate::server::{DnsReply, QueryHandler};

pub const DNS_QUERY_PATH: &str = "/dns-query";
pub const INGEST_PATH: &str = "/ingest";
pub const HEALTH_MESSAGE: &str = "doh-filter running";

/// RFC 8484 §6: maximum wire-format message size for DoH.
const MAX_DNS_MESSAGE_BYTES: usize = 65_535;

/// Build the router serving `handler`.
pub fn app<B, R>(handler: QueryHandler<B, R>) -> Router
where
    B: BlocklistStore,
    R: DnsResolver,
{
    Router::new()
        .route(
            DNS_QUERY_PATH,
            get(get_query::<B, R>).post(post_query::<B, R>),
        )
        .route(INGEST_PATH, get(ingest::<B, R>).post(ingest::<B, R>))
        .fallback(health)
        .layer(TraceLayer::new_for_http())
        .with_state(handler)
}

#[derive(Deserialize)]
struct DohGetParams {
    dns: String,
}

async fn post_query<B, R>(State(handler): State<QueryHandler<B, R>>, body: Bytes) -> Response
where
    B: BlocklistStore,
    R: DnsResolver,
{
    if body.len() > MAX_DNS_MESSAGE_BYTES {
        return (StatusCode::PAYLOAD_TOO_LARGE, "DNS message too large").into_response();
    }

    dns_response(handler.handle_query(body).await)
}

async fn get_query<B, R>(
    State(handler): State<QueryHandler<B, R>>,
    Query(params): Query<DohGetParams>,
) -> Response
where
    B: BlocklistStore,
    R: DnsResolver,
{
    // padding is not allowed by RFC 8484 but some clients send it anyway
    let Ok(message) = URL_SAFE_NO_PAD.decode(params.dns.trim_end_matches('=')) else {
        return (StatusCode::BAD_REQUEST, "Invalid base64url encoding").into_response();
    };
    if message.len() > MAX_DNS_MESSAGE_BYTES {
        return (StatusCode::PAYLOAD_TOO_LARGE, "DNS message too large").into_response();
    }

    dns_response(handler.handle_query(Bytes::from(message)).await)
}

async fn ingest<B, R>(State(handler): State<QueryHandler<B, R>>) -> Response
where
    B: BlocklistStore,
    R: DnsResolver,
{
    match handler.ingest().await {
        Ok(report) if report.is_complete() => {
            format!("Blocklist saved! {} domains", report.domains).into_response()
        }
        Ok(report) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!(
                "Blocklist partially saved: {} of {} domains",
                report.stored, report.domains
            ),
        )
            .into_response(),
        Err(err) => err.into_response(),
    }
}

async fn health() -> &'static str {
    HEALTH_MESSAGE
}

fn dns_response(reply: Result<DnsReply>) -> Response {
    match reply {
        Ok(DnsReply::Blocked(message)) => (
            [(header::CONTENT_TYPE, DNS_MESSAGE_CONTENT_TYPE)],
            message.to_vec(),
        )
            .into_response(),
        Ok(DnsReply::Forwarded(upstream)) => relay(upstream),
        Err(err) => err.into_response(),
    }
}

/// Pass the resolver's status, content type and body through untouched.
fn relay(upstream: UpstreamResponse) -> Response {
    let mut response = Response::new(Body::from(upstream.body));
    *response.status_mut() = StatusCode::from_u16(upstream.status).unwrap_or(StatusCode::BAD_GATEWAY);

    if let Some(content_type) = upstream
        .content_type
        .and_then(|value| HeaderValue::from_str(&value).ok())
    {
        response
            .headers_mut()
            .insert(header::CONTENT_TYPE, content_type);
    }

    response
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::MalformedMessage(_) => StatusCode::BAD_REQUEST,
            Self::UpstreamUnavailable(_) => StatusCode::BAD_GATEWAY,
            Self::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Config(_) | Self::Io(_) | Self::Metrics(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        (status, self.to_string()).into_response()
    }
}
