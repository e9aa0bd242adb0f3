//! Axum Middleware for HTTP Request Metrics
//!
//! Records a Prometheus counter and latency sample for every request. Paths
//! are labelled by their matched route so unknown URLs collapse into one
//! series.

use axum::{
    extract::{MatchedPath, Request},
    middleware::Next,
    response::Response,
};
use std::time::Instant;

use super::metrics::METRICS;

const UNMATCHED_PATH: &str = "unmatched";

pub async fn observability_middleware(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().to_string();
    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| UNMATCHED_PATH.to_string());

    let response = next.run(request).await;

    let status = response.status().as_u16();
    let duration = start.elapsed().as_secs_f64();
    if let Ok(metrics) = METRICS.as_ref() {
        metrics.record_http_request(&method, &path, status, duration);
    }
    tracing::debug!(
        http.method = %method,
        http.route = %path,
        http.status = status,
        duration_ms = duration * 1000.0,
        "Request completed"
    );

    response
}
