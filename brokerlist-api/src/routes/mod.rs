//! REST API Routes
//!
//! - `/health/*` - liveness checks
//! - `/api/revalidate` - admin cache control (bearer token)
//! - `/api/rankings/*` - cached broker rankings
//! - `/metrics` - Prometheus scrape endpoint

pub mod cache_admin;
pub mod health;
pub mod rankings;

use std::time::Duration;

use axum::{
    http::{header, Method},
    middleware::from_fn,
    routing::get,
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::state::AppState;
use crate::telemetry::{metrics_handler, observability_middleware};

const CORS_MAX_AGE: Duration = Duration::from_secs(3600);

fn build_cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, header::ACCEPT])
        .max_age(CORS_MAX_AGE)
}

/// Build the full application router over one shared [`AppState`].
pub fn create_api_router(state: AppState) -> Router {
    Router::new()
        .nest("/health", health::create_router())
        .nest("/api/revalidate", cache_admin::create_router())
        .nest("/api/rankings", rankings::create_router())
        .route("/metrics", get(metrics_handler))
        .layer(from_fn(observability_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(build_cors_layer())
        .with_state(state)
}
