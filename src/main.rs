//! doh-filter - Entry point.
//!
//! Loads the configuration, builds the blocklist and resolver it describes,
//! and serves DNS-over-HTTPS until Ctrl-C.

use std::borrow::Cow;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing::{info, warn};

use doh_filter::blocklist::{BlocklistStore, HashedBlocklist, RemoteLoader, RemoteSetBlocklist};
use doh_filter::config::{BlocklistMode, Config, StoreSettings};
use doh_filter::dns::DohResolver;
use doh_filter::kv::{CloudflareKv, KvStore, MokaKv};
use doh_filter::server::{QueryHandler, run_server, spawn_refresh_task};

fn hashed<S: KvStore>(config: &Config, store: S) -> HashedBlocklist<S> {
    HashedBlocklist::new(
        store,
        Duration::from_secs(config.blocklist.ttl_seconds),
        config.blocklist.format,
        config.blocklist.ingest_concurrency,
    )
}

async fn serve<B: BlocklistStore>(
    config: Config,
    blocklist: B,
    resolver: DohResolver,
    loader: RemoteLoader,
) -> Result<()> {
    let handler = QueryHandler::new(blocklist, resolver, loader, config.blocklist.url.clone());

    if config.blocklist.ingest_on_startup {
        match handler.ingest().await {
            Ok(report) => info!(
                domains = report.domains,
                failed = report.failed,
                "initial blocklist ingest finished"
            ),
            Err(err) => warn!("Initial blocklist ingest failed: {err}"),
        }
    }

    let refresh = config.blocklist.refresh_interval_secs.map(|secs| {
        info!("Refreshing blocklist every {secs} seconds");
        spawn_refresh_task(handler.clone(), Duration::from_secs(secs))
    });

    let listener = TcpListener::bind(config.listen)
        .await
        .with_context(|| format!("Failed to bind {}", config.listen))?;
    info!("Listening on http://{}", config.listen);

    run_server(listener, handler, async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {err}");
            std::future::pending::<()>().await;
        }
        info!("Ctrl-C received, shutting down...");
    })
    .await
    .context("Server error")?;

    if let Some(task) = refresh {
        task.abort();
    }

    info!("Shutdown complete.");
    Ok(())
}

async fn run() -> Result<()> {
    let config_path = std::env::var("CONFIG_PATH")
        .map(Cow::Owned)
        .unwrap_or(Cow::Borrowed("config.toml"));
    let config = Config::load(config_path.as_ref()).context("Failed to load configuration")?;

    // Initialize metrics (must be done early, before any metrics are recorded)
    doh_filter::metrics::init(&config.metrics).context("Failed to initialize metrics")?;
    if config.metrics.enabled {
        info!("Metrics enabled on {}", config.metrics.listen);
    }

    info!("Starting doh-filter...");
    info!("Upstream resolver: {}", config.upstream_resolver);
    info!("Blocklist source: {}", config.blocklist.url);
    info!("Blocklist TTL: {} seconds", config.blocklist.ttl_seconds);

    let resolver = DohResolver::new(
        config.upstream_resolver.clone(),
        Duration::from_secs(config.upstream_timeout_secs),
    )
    .context("Failed to create upstream resolver")?;
    let loader = RemoteLoader::new().context("Failed to create blocklist loader")?;

    match (config.blocklist.mode, config.store.clone()) {
        (BlocklistMode::FetchPerQuery, _) => {
            info!("Blocklist mode: fetch per query");
            let blocklist = RemoteSetBlocklist::new(
                loader.clone(),
                config.blocklist.url.clone(),
                config.blocklist.format,
            );
            serve(config, blocklist, resolver, loader).await
        }
        (BlocklistMode::Hashed, StoreSettings::Memory {}) => {
            info!("Blocklist mode: hashed, in-memory store");
            let blocklist = hashed(&config, MokaKv::new());
            serve(config, blocklist, resolver, loader).await
        }
        (
            BlocklistMode::Hashed,
            StoreSettings::Cloudflare {
                account_id,
                namespace_id,
                api_token,
                api_base,
            },
        ) => {
            info!("Blocklist mode: hashed, Cloudflare KV namespace {namespace_id}");
            let store = CloudflareKv::new(&api_base, &account_id, &namespace_id, api_token)
                .context("Failed to create Cloudflare KV client")?;
            let blocklist = hashed(&config, store);
            serve(config, blocklist, resolver, loader).await
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    run().await
}
