//! Prometheus exporter setup.
//!
//! Counters:
//!
//! - `doh_filter_queries_total{outcome}`: `blocked`, `forwarded`, `malformed`, `blocklist_error`, `upstream_error`
//! - `doh_filter_lookup_errors_total`: store lookups that failed and were allowed through
//! - `doh_filter_ingests_total{result}`: `complete`, `partial`, `failed`
//! - `doh_filter_ingested_domains_total`: entries written by ingests

use metrics_exporter_prometheus::PrometheusBuilder;

use crate::config::MetricsConfig;
use crate::error::{Error, Result};

/// Install the global recorder and serve `/metrics` on `config.listen`.
///
/// Disabled metrics skip the exporter; counter updates then go nowhere.
pub fn init(config: &MetricsConfig) -> Result<()> {
    if !config.enabled {
        return Ok(());
    }

    PrometheusBuilder::new()
        .with_http_listener(config.listen)
        .install()
        .map_err(|err| Error::Metrics(err.to_string()))?;

    Ok(())
}
