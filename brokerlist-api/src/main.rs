//! Brokerlist API Server Entry Point
//!
//! Loads configuration, seeds the collaborator stores, warms the listing
//! cache and starts the Axum HTTP server.

use std::sync::Arc;

use brokerlist_api::{create_api_router, ApiConfig, ApiError, ApiResult, AppState, SeedData};
use brokerlist_api::telemetry::init_tracing;
use brokerlist_ranking::{BrokerStore, WeightStore};

#[tokio::main]
async fn main() -> ApiResult<()> {
    let config = ApiConfig::from_env()
        .map_err(|e| ApiError::internal_error(format!("Invalid configuration: {}", e)))?;
    init_tracing(config.log_format)?;

    let seed = match &config.seed_path {
        Some(path) => {
            let seed = SeedData::load(path)
                .map_err(|e| ApiError::internal_error(format!("Failed to load seed: {}", e)))?;
            tracing::info!(
                path = %path.display(),
                brokers = seed.brokers.len(),
                categories = seed.categories.len(),
                "Loaded seed data"
            );
            seed
        }
        None => {
            tracing::warn!("BROKERLIST_SEED_PATH is not set; starting with empty stores");
            SeedData::default()
        }
    };
    let (brokers, weights) = seed.into_stores();
    let brokers: Arc<dyn BrokerStore> = brokers;
    let weights: Arc<dyn WeightStore> = weights;

    let state = AppState::new(&config, brokers, weights)?;
    match state.listing.warmup().await {
        Ok(entries) => tracing::info!(entries, "Startup warmup complete"),
        Err(e) => tracing::warn!(error = %e, "Startup warmup failed; listings will be computed on demand"),
    }

    let app = create_api_router(state);

    let addr = config
        .bind_addr()
        .map_err(|e| ApiError::internal_error(format!("Invalid bind address: {}", e)))?;
    tracing::info!(%addr, "Starting Brokerlist API server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to bind {}: {}", addr, e)))?;

    let server = axum::serve(listener, app);
    tokio::select! {
        result = server => {
            result.map_err(|e| ApiError::internal_error(format!("Server error: {}", e)))?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
    }

    Ok(())
}
