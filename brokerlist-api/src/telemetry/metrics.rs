//! Prometheus Metrics Definitions
//!
//! HTTP and ranking metrics are recorded as requests run. Cache gauges are
//! refreshed from [`CacheManager::stats`] on every scrape.

use axum::{extract::State, http::StatusCode, response::IntoResponse};
use brokerlist_cache::{CacheManager, CacheStats};
use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, register_int_gauge_vec, CounterVec, Encoder,
    HistogramVec, IntGaugeVec, TextEncoder,
};

use crate::error::{ApiError, ApiResult};

/// HTTP request latency buckets (seconds)
const HTTP_LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0, 2.5, 5.0, 10.0,
];

/// Ranking latency buckets (seconds)
const RANKING_LATENCY_BUCKETS: &[f64] = &[0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 1.0, 5.0];

/// Global metrics instance - initialized once at startup
pub static METRICS: Lazy<ApiResult<BrokerlistMetrics>> = Lazy::new(BrokerlistMetrics::new);

/// Container for all brokerlist metrics.
#[derive(Clone)]
pub struct BrokerlistMetrics {
    /// HTTP request counter - labels: method, path, status
    pub http_requests_total: CounterVec,

    /// HTTP request duration histogram - labels: method, path
    pub http_request_duration_seconds: HistogramVec,

    /// Ranking duration histogram - labels: scope (category/all), outcome
    pub ranking_duration_seconds: HistogramVec,

    /// Cache entries by state - labels: state (fresh/stale/expired/total/capacity)
    pub cache_entries: IntGaugeVec,

    /// Cumulative cache events - labels: event
    pub cache_events: IntGaugeVec,
}

fn registration_error(name: &str, e: prometheus::Error) -> ApiError {
    ApiError::internal_error(format!("Failed to register {}: {}", name, e))
}

impl BrokerlistMetrics {
    /// Create and register all metrics with Prometheus.
    pub fn new() -> ApiResult<Self> {
        Ok(Self {
            http_requests_total: register_counter_vec!(
                "brokerlist_http_requests_total",
                "Total number of HTTP requests",
                &["method", "path", "status"]
            )
            .map_err(|e| registration_error("http_requests_total", e))?,

            http_request_duration_seconds: register_histogram_vec!(
                "brokerlist_http_request_duration_seconds",
                "HTTP request duration in seconds",
                &["method", "path"],
                HTTP_LATENCY_BUCKETS.to_vec()
            )
            .map_err(|e| registration_error("http_request_duration_seconds", e))?,

            ranking_duration_seconds: register_histogram_vec!(
                "brokerlist_ranking_duration_seconds",
                "Ranking and listing duration in seconds",
                &["scope", "outcome"],
                RANKING_LATENCY_BUCKETS.to_vec()
            )
            .map_err(|e| registration_error("ranking_duration_seconds", e))?,

            cache_entries: register_int_gauge_vec!(
                "brokerlist_cache_entries",
                "Entries held by the in-process cache",
                &["state"]
            )
            .map_err(|e| registration_error("cache_entries", e))?,

            cache_events: register_int_gauge_vec!(
                "brokerlist_cache_events",
                "Cumulative cache events since process start",
                &["event"]
            )
            .map_err(|e| registration_error("cache_events", e))?,
        })
    }

    /// Record an HTTP request.
    pub fn record_http_request(&self, method: &str, path: &str, status: u16, duration_secs: f64) {
        let status_str = status.to_string();
        self.http_requests_total
            .with_label_values(&[method, path, &status_str])
            .inc();
        self.http_request_duration_seconds
            .with_label_values(&[method, path])
            .observe(duration_secs);
    }

    /// Record one ranking call.
    pub fn record_ranking(&self, has_category: bool, success: bool, duration_secs: f64) {
        let scope = if has_category { "category" } else { "all" };
        let outcome = if success { "success" } else { "error" };
        self.ranking_duration_seconds
            .with_label_values(&[scope, outcome])
            .observe(duration_secs);
    }

    /// Copy a cache statistics snapshot into the gauges.
    pub fn observe_cache(&self, stats: &CacheStats) {
        for (state, value) in [
            ("total", stats.total),
            ("fresh", stats.fresh),
            ("stale", stats.stale),
            ("expired", stats.expired),
            ("capacity", stats.capacity),
            ("pending_revalidations", stats.pending_revalidations),
        ] {
            self.cache_entries
                .with_label_values(&[state])
                .set(saturating_i64(value as u64));
        }
        for (event, value) in [
            ("hit", stats.hits),
            ("miss", stats.misses),
            ("stale_served", stats.stale_served),
            ("fallback_served", stats.fallbacks_served),
            ("evicted", stats.evicted),
            ("revalidation_started", stats.revalidations_started),
            ("revalidation_coalesced", stats.revalidations_coalesced),
            ("revalidation_failed", stats.revalidation_failures),
        ] {
            self.cache_events
                .with_label_values(&[event])
                .set(saturating_i64(value));
        }
    }
}

fn saturating_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// Handler for GET /metrics endpoint.
///
/// Returns Prometheus text format metrics.
pub async fn metrics_handler(State(cache): State<CacheManager>) -> impl IntoResponse {
    if let Ok(metrics) = METRICS.as_ref() {
        metrics.observe_cache(&cache.stats());
    }

    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    match encoder.encode(&metric_families, &mut buffer) {
        Ok(_) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            buffer,
        ),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [("content-type", "text/plain")],
                format!("Failed to encode metrics: {}", e).into_bytes(),
            )
        }
    }
}
