//! Shared application state for Axum routers.

use std::sync::Arc;
use std::time::Instant;

use brokerlist_cache::{CacheManager, DurableTier, LmdbDurableTier};
use brokerlist_core::{BrokerError, SystemClock};
use brokerlist_ranking::{BrokerStore, ListingService, RankingEngine, WeightStore, WeightsAdapter};

use crate::auth::AdminToken;
use crate::config::ApiConfig;
use crate::error::ApiResult;

/// The one service object per process. Handlers receive it (or one of its
/// fields) through axum state; nothing lives in a global.
#[derive(Clone)]
pub struct AppState {
    pub cache: CacheManager,
    pub engine: Arc<RankingEngine>,
    pub listing: ListingService,
    /// `None` when no revalidation secret is configured.
    pub admin_token: Option<AdminToken>,
    pub start_time: Instant,
}

crate::impl_from_ref!(CacheManager, cache);
crate::impl_from_ref!(Arc<RankingEngine>, engine);
crate::impl_from_ref!(ListingService, listing);
crate::impl_from_ref!(Option<AdminToken>, admin_token);
crate::impl_from_ref!(Instant, start_time);

impl AppState {
    /// Wire the cache, ranking engine and listing service over the given
    /// collaborator stores.
    ///
    /// Opens the LMDB durable tier when `durable_path` is configured.
    pub fn new(
        config: &ApiConfig,
        brokers: Arc<dyn BrokerStore>,
        weights: Arc<dyn WeightStore>,
    ) -> ApiResult<Self> {
        let durable: Option<Arc<dyn DurableTier>> = match &config.durable_path {
            Some(path) => {
                let tier = LmdbDurableTier::open(path, config.durable_max_mb)
                    .map_err(BrokerError::from)?;
                tracing::info!(path = %path.display(), "Opened durable cache tier");
                Some(Arc::new(tier) as Arc<dyn DurableTier>)
            }
            None => None,
        };

        let cache = CacheManager::with_parts(config.cache_config(), Arc::new(SystemClock), durable);
        Ok(Self::from_parts(config, cache, brokers, weights))
    }

    /// Build over an existing cache manager.
    pub fn from_parts(
        config: &ApiConfig,
        cache: CacheManager,
        brokers: Arc<dyn BrokerStore>,
        weights: Arc<dyn WeightStore>,
    ) -> Self {
        let adapter =
            WeightsAdapter::new(weights, cache.clone()).with_refresh_interval(config.weights_refresh);
        let engine = Arc::new(RankingEngine::new(brokers, adapter));
        let listing = ListingService::new(Arc::clone(&engine), cache.clone())
            .with_warmup_categories(config.warmup_categories.iter().cloned());

        let admin_token = config.revalidate_token.clone().and_then(AdminToken::new);
        if admin_token.is_none() {
            tracing::warn!("CACHE_REVALIDATE_TOKEN is not set; /api/revalidate will reject every request");
        }

        Self {
            cache,
            engine,
            listing,
            admin_token,
            start_time: Instant::now(),
        }
    }
}
