//! Weight store adapter.
//!
//! Ranking weights are read through the cache manager so that the refresh
//! interval is just the entry TTL. A failing store, or a stored set that
//! breaks the weight invariants, yields the default weights and never fails
//! the ranking call.

use std::sync::Arc;
use std::time::Duration;

use brokerlist_cache::{CacheManager, FetchOptions};
use brokerlist_core::{
    BrokerError, BrokerResult, PartialWeights, RankingFactor, RankingWeights, UpstreamError,
};
use tracing::{debug, info, warn};

use crate::listing::RANKINGS_TAG;
use crate::store::WeightStore;

/// Cache key holding the active weight set.
pub const WEIGHTS_CACHE_KEY: &str = "ranking:weights";
/// Tag carried by the weight cache entry.
pub const WEIGHTS_CACHE_TAG: &str = "weights";
/// How long a loaded weight set is trusted before the store is asked again.
pub const DEFAULT_WEIGHTS_REFRESH: Duration = Duration::from_secs(5 * 60);

/// Loads, caches and updates ranking weights.
#[derive(Clone)]
pub struct WeightsAdapter {
    store: Arc<dyn WeightStore>,
    cache: CacheManager,
    refresh_interval: Duration,
}

impl WeightsAdapter {
    pub fn new(store: Arc<dyn WeightStore>, cache: CacheManager) -> Self {
        Self {
            store,
            cache,
            refresh_interval: DEFAULT_WEIGHTS_REFRESH,
        }
    }

    pub fn with_refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = interval;
        self
    }

    pub fn refresh_interval(&self) -> Duration {
        self.refresh_interval
    }

    fn fetch_options(&self) -> FetchOptions {
        FetchOptions::new()
            .with_ttl(self.refresh_interval)
            .with_stale_while_revalidate(false)
            .with_tags([WEIGHTS_CACHE_TAG])
    }

    /// Current weights. Never fails; falls back to [`RankingWeights::default`].
    pub async fn load_weights(&self) -> RankingWeights {
        let store = Arc::clone(&self.store);
        let loaded = self
            .cache
            .fetch_with_cache(
                WEIGHTS_CACHE_KEY,
                move || async move {
                    let rows = store.list_active_weights().await?;
                    let (weights, unknown) = RankingWeights::from_rows(&rows);
                    if !unknown.is_empty() {
                        debug!(?unknown, "Ignoring unknown ranking factors from weight store");
                    }
                    weights.validate()?;
                    Ok::<_, BrokerError>(weights)
                },
                self.fetch_options(),
            )
            .await;

        match loaded {
            Ok(weights) => weights,
            Err(e) => {
                warn!(error = %e, "Could not load ranking weights, using defaults");
                RankingWeights::default()
            }
        }
    }

    /// Replace the active weights with exactly the submitted set.
    ///
    /// Factors missing from `partial` are stored as zero. After the store
    /// write the cache is reseeded, so the next load sees the new set without
    /// a store round trip, and every cached ranking page is dropped.
    pub async fn update_weights(&self, partial: &PartialWeights) -> BrokerResult<RankingWeights> {
        let weights = RankingWeights::from_partial(partial)?;

        let rows = weights.rows_for(RankingFactor::ALL);
        self.store.upsert_weights(&rows).await.map_err(|e| match e {
            BrokerError::Upstream(_) => e,
            other => UpstreamError::WeightStore {
                operation: "upsert_weights".to_string(),
                reason: other.to_string(),
            }
            .into(),
        })?;

        self.cache
            .preload(
                WEIGHTS_CACHE_KEY,
                &weights,
                Some(self.refresh_interval),
                [WEIGHTS_CACHE_TAG],
            )
            .await?;
        let dropped = self.cache.invalidate_by_tag(RANKINGS_TAG);

        info!(
            factors = ?partial.keys().collect::<Vec<_>>(),
            sum = weights.sum(),
            dropped_pages = dropped,
            "Ranking weights updated"
        );
        Ok(weights)
    }
}
