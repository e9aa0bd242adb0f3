//! Ranked Listing Endpoints
//!
//! Page-level rankings served through the listing cache:
//! - GET /api/rankings?category=&country=&limit=&min_score=&only_available=
//! - GET /api/rankings/country/:slug?limit=
//! - GET /api/rankings/category/:slug?limit=

use std::future::Future;
use std::time::Instant;

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use brokerlist_core::{BrokerResult, BrokerScore};
use brokerlist_ranking::{ListingService, RankingOptions};
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use crate::telemetry::METRICS;

/// Largest page a caller may request.
pub const MAX_LISTING_LIMIT: usize = 100;

// ============================================================================
// TYPES
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RankingQuery {
    pub category: Option<String>,
    pub country: Option<String>,
    pub limit: Option<usize>,
    pub min_score: Option<f64>,
    pub only_available: Option<bool>,
}

impl RankingQuery {
    /// Validate and convert into engine options.
    pub fn into_options(self) -> ApiResult<RankingOptions> {
        let mut options = RankingOptions::new();
        if let Some(category) = non_empty(self.category) {
            options = options.with_category(category);
        }
        if let Some(country) = non_empty(self.country) {
            options = options.with_country(country);
        }
        if let Some(limit) = self.limit {
            options = options.with_limit(validate_limit(limit)?);
        }
        if let Some(min_score) = self.min_score {
            if !min_score.is_finite() || !(0.0..=10.0).contains(&min_score) {
                return Err(ApiError::invalid_input("min_score must be between 0 and 10"));
            }
            options = options.with_min_score(min_score);
        }
        if self.only_available.unwrap_or(false) {
            options = options.only_available();
        }
        Ok(options)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RankingResponse {
    pub success: bool,
    pub count: usize,
    pub data: Vec<BrokerScore>,
}

impl From<Vec<BrokerScore>> for RankingResponse {
    fn from(data: Vec<BrokerScore>) -> Self {
        Self {
            success: true,
            count: data.len(),
            data,
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_lowercase())
        .filter(|v| !v.is_empty())
}

fn validate_limit(limit: usize) -> ApiResult<usize> {
    if limit == 0 || limit > MAX_LISTING_LIMIT {
        return Err(ApiError::invalid_input(format!(
            "limit must be between 1 and {}",
            MAX_LISTING_LIMIT
        )));
    }
    Ok(limit)
}

/// Run a listing call and record its latency.
async fn timed<F>(has_category: bool, listing: F) -> ApiResult<Json<RankingResponse>>
where
    F: Future<Output = BrokerResult<Vec<BrokerScore>>>,
{
    let start = Instant::now();
    let result = listing.await;
    if let Ok(metrics) = METRICS.as_ref() {
        metrics.record_ranking(has_category, result.is_ok(), start.elapsed().as_secs_f64());
    }
    Ok(Json(RankingResponse::from(result?)))
}

// ============================================================================
// HANDLERS
// ============================================================================

/// GET /api/rankings - Ranked listing with explicit options
pub async fn list_rankings(
    State(listing): State<ListingService>,
    Query(query): Query<RankingQuery>,
) -> ApiResult<Json<RankingResponse>> {
    let options = query.into_options()?;
    let has_category = options.category_slug.is_some();
    timed(has_category, listing.ranked_listing(options)).await
}

/// GET /api/rankings/country/:slug - Brokers accepting clients from a country
pub async fn country_rankings(
    State(listing): State<ListingService>,
    Path(slug): Path<String>,
    Query(query): Query<LimitQuery>,
) -> ApiResult<Json<RankingResponse>> {
    let limit = query.limit.map(validate_limit).transpose()?;
    timed(false, listing.brokers_for_country(&slug.to_lowercase(), limit)).await
}

/// GET /api/rankings/category/:slug - Category page listing
pub async fn category_rankings(
    State(listing): State<ListingService>,
    Path(slug): Path<String>,
    Query(query): Query<LimitQuery>,
) -> ApiResult<Json<RankingResponse>> {
    let limit = query.limit.map(validate_limit).transpose()?;
    timed(true, listing.brokers_for_category(&slug.to_lowercase(), limit)).await
}

// ============================================================================
// ROUTER
// ============================================================================

pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_rankings))
        .route("/country/:slug", get(country_rankings))
        .route("/category/:slug", get(category_rankings))
}
