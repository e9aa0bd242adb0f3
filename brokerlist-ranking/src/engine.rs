//! Ranking engine.
//!
//! Combines the weight set, the factor scorers and the category match into an
//! ordered list of [`BrokerScore`]s.

use std::sync::Arc;

use brokerlist_core::{
    apply_category_bonus, round2, BrokerError, BrokerResult, BrokerScore, BrokerSnapshot,
    PartialScoringError, PartialWeights, RankingError, RankingWeights, RawBroker,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::category::category_match_score;
use crate::scorers::{country_score, score_breakdown, CountryLookup, NEUTRAL_COUNTRY_SCORE};
use crate::store::BrokerStore;
use crate::weights::WeightsAdapter;

pub const DEFAULT_RANKING_LIMIT: usize = 30;

/// Parameters of one ranking call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RankingOptions {
    pub category_slug: Option<String>,
    pub country_slug: Option<String>,
    pub limit: usize,
    pub min_score: f64,
    pub only_available: bool,
}

impl Default for RankingOptions {
    fn default() -> Self {
        Self {
            category_slug: None,
            country_slug: None,
            limit: DEFAULT_RANKING_LIMIT,
            min_score: 0.0,
            only_available: false,
        }
    }
}

impl RankingOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_category(mut self, slug: impl Into<String>) -> Self {
        self.category_slug = Some(slug.into());
        self
    }

    pub fn with_country(mut self, slug: impl Into<String>) -> Self {
        self.country_slug = Some(slug.into());
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_min_score(mut self, min_score: f64) -> Self {
        self.min_score = min_score;
        self
    }

    pub fn only_available(mut self) -> Self {
        self.only_available = true;
        self
    }
}

/// A scored broker before rounding; sorting uses the unrounded score.
struct Scored {
    final_score: f64,
    score: BrokerScore,
}

/// Weighted multi-factor ranking over a [`BrokerStore`].
#[derive(Clone)]
pub struct RankingEngine {
    brokers: Arc<dyn BrokerStore>,
    weights: WeightsAdapter,
}

impl RankingEngine {
    pub fn new(brokers: Arc<dyn BrokerStore>, weights: WeightsAdapter) -> Self {
        Self { brokers, weights }
    }

    pub fn weights(&self) -> &WeightsAdapter {
        &self.weights
    }

    pub async fn load_weights(&self) -> RankingWeights {
        self.weights.load_weights().await
    }

    pub async fn update_weights(&self, partial: &PartialWeights) -> BrokerResult<RankingWeights> {
        self.weights.update_weights(partial).await
    }

    /// Rank brokers for the given options, best first.
    pub async fn rank_brokers(&self, options: &RankingOptions) -> BrokerResult<Vec<BrokerScore>> {
        let weights = self.weights.load_weights().await;
        let candidates = self.candidates(options.category_slug.as_deref()).await?;
        let category = options.category_slug.as_deref();
        let country = options.country_slug.as_deref();

        let mut scored = Vec::with_capacity(candidates.len());
        for raw in &candidates {
            let snapshot = BrokerSnapshot::from_raw(raw);
            if !snapshot.active {
                continue;
            }

            let lookup = match self.country_lookup(&snapshot, country).await {
                Ok(lookup) => lookup,
                Err(e) => {
                    warn!(broker_id = snapshot.id, error = %e, "Dropping broker from ranking");
                    continue;
                }
            };
            let country_factor = country_score(lookup);
            if options.only_available && country.is_some() && country_factor.value() == 0.0 {
                continue;
            }

            let breakdown = score_breakdown(&snapshot, country_factor);
            let category_match = category_match_score(&snapshot, category);
            let final_score = apply_category_bonus(breakdown.weighted_total(&weights), category_match);
            if final_score < options.min_score {
                continue;
            }

            scored.push(Scored {
                final_score,
                score: BrokerScore {
                    broker_id: snapshot.id,
                    broker_name: snapshot.name,
                    total_score: round2(final_score),
                    breakdown: breakdown.rounded(),
                    category_match_score: category_match.rounded(),
                    country_available: country_factor.value() > NEUTRAL_COUNTRY_SCORE,
                },
            });
        }

        // Stable: ties keep candidate order.
        scored.sort_by(|a, b| b.final_score.total_cmp(&a.final_score));
        scored.truncate(options.limit);

        debug!(
            category = category.unwrap_or("all"),
            country = country.unwrap_or("all"),
            candidates = candidates.len(),
            ranked = scored.len(),
            "Ranked brokers"
        );
        Ok(scored.into_iter().map(|s| s.score).collect())
    }

    async fn candidates(&self, category: Option<&str>) -> BrokerResult<Vec<RawBroker>> {
        if let Some(slug) = category {
            match self.brokers.list_brokers_for_category(slug).await {
                Ok(Some(mapped)) => return Ok(mapped),
                Ok(None) => {
                    warn!(category = slug, "Category has no broker mapping, ranking all active brokers");
                }
                Err(e) => {
                    warn!(category = slug, error = %e, "Category lookup failed, ranking all active brokers");
                }
            }
        }

        self.brokers.list_active_brokers().await.map_err(|e| {
            BrokerError::from(RankingError::CandidateEnumeration {
                category: category.unwrap_or("all").to_string(),
                reason: e.to_string(),
            })
        })
    }

    async fn country_lookup(
        &self,
        broker: &BrokerSnapshot,
        country: Option<&str>,
    ) -> Result<CountryLookup, PartialScoringError> {
        let Some(country) = country else {
            return Ok(CountryLookup::NotRequested);
        };
        match self.brokers.get_country_availability(broker.id, country).await {
            Ok(Some(record)) => Ok(CountryLookup::Found(record)),
            Ok(None) => Ok(CountryLookup::NoRecord),
            Err(e) => Err(PartialScoringError::AvailabilityLookup {
                broker_id: broker.id,
                country: country.to_string(),
                reason: e.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{InMemoryBrokerStore, InMemoryWeightStore};
    use brokerlist_cache::{CacheConfig, CacheManager};
    use brokerlist_core::{AvailabilityConfidence, CountryAvailability, RankingFactor};
    use serde_json::json;

    fn raw(id: i64, rating: f64, regulation: &str, broker_type: &str) -> RawBroker {
        RawBroker {
            id,
            name: Some(format!("Broker {id}")),
            regulation_status: Some(regulation.to_string()),
            broker_type: Some(broker_type.to_string()),
            overall_rating: Some(rating),
            ..Default::default()
        }
    }

    fn engine(store: Arc<InMemoryBrokerStore>) -> (RankingEngine, Arc<InMemoryWeightStore>) {
        let weights_store = Arc::new(InMemoryWeightStore::new());
        let cache = CacheManager::new(CacheConfig::default());
        let adapter = WeightsAdapter::new(weights_store.clone(), cache);
        (RankingEngine::new(store, adapter), weights_store)
    }

    fn ids(scores: &[BrokerScore]) -> Vec<i64> {
        scores.iter().map(|s| s.broker_id).collect()
    }

    #[tokio::test]
    async fn test_orders_by_final_score() {
        let store = Arc::new(InMemoryBrokerStore::with_brokers([
            raw(1, 5.0, "", "Market Maker"),
            raw(2, 9.0, "FCA, ASIC", "ECN"),
            raw(3, 7.0, "CySEC", "STP"),
        ]));
        let (engine, _) = engine(store);
        let ranked = engine.rank_brokers(&RankingOptions::new()).await.expect("rank");
        assert_eq!(ids(&ranked), vec![2, 3, 1]);
        assert!(ranked.windows(2).all(|w| w[0].total_score >= w[1].total_score));
    }

    #[tokio::test]
    async fn test_limit_and_min_score() {
        let store = Arc::new(InMemoryBrokerStore::with_brokers([
            raw(1, 5.0, "", "Market Maker"),
            raw(2, 9.0, "FCA, ASIC", "ECN"),
            raw(3, 7.0, "CySEC", "STP"),
        ]));
        let (engine, _) = engine(store);

        let top = engine
            .rank_brokers(&RankingOptions::new().with_limit(1))
            .await
            .expect("rank");
        assert_eq!(ids(&top), vec![2]);

        let all = engine.rank_brokers(&RankingOptions::new()).await.expect("rank");
        let cutoff = all[1].total_score;
        let filtered = engine
            .rank_brokers(&RankingOptions::new().with_min_score(cutoff))
            .await
            .expect("rank");
        assert!(filtered.iter().all(|s| s.total_score >= cutoff));
        assert!(!ids(&filtered).contains(&1));
    }

    #[tokio::test]
    async fn test_unmapped_category_falls_back_to_all() {
        let store = Arc::new(InMemoryBrokerStore::with_brokers([
            raw(1, 6.0, "FCA", "ECN"),
            raw(2, 8.0, "FCA", "STP"),
        ]));
        let (engine, _) = engine(store.clone());
        let ranked = engine
            .rank_brokers(&RankingOptions::new().with_category("ecn-brokers"))
            .await
            .expect("rank");
        assert_eq!(ranked.len(), 2);
        assert_eq!(store.list_calls(), 1);
    }

    #[tokio::test]
    async fn test_mapped_category_restricts_candidates() {
        let store = Arc::new(InMemoryBrokerStore::with_brokers([
            raw(1, 6.0, "FCA", "ECN"),
            raw(2, 8.0, "FCA", "STP"),
        ]));
        store.map_category("ecn-brokers", [1]);
        let (engine, _) = engine(store.clone());
        let ranked = engine
            .rank_brokers(&RankingOptions::new().with_category("ecn-brokers"))
            .await
            .expect("rank");
        assert_eq!(ids(&ranked), vec![1]);
        assert_eq!(ranked[0].category_match_score.value(), 10.0);
        assert_eq!(store.list_calls(), 0);
    }

    #[tokio::test]
    async fn test_category_lookup_failure_falls_back() {
        let store = Arc::new(InMemoryBrokerStore::with_brokers([raw(1, 6.0, "FCA", "ECN")]));
        store.set_fail_category_lookup(true);
        let (engine, _) = engine(store);
        let ranked = engine
            .rank_brokers(&RankingOptions::new().with_category("ecn-brokers"))
            .await
            .expect("rank");
        assert_eq!(ids(&ranked), vec![1]);
    }

    #[tokio::test]
    async fn test_enumeration_failure_is_ranking_error() {
        let store = Arc::new(InMemoryBrokerStore::new());
        store.set_fail_listing(true);
        let (engine, _) = engine(store);
        let err = engine
            .rank_brokers(&RankingOptions::new())
            .await
            .expect_err("store down");
        assert!(matches!(
            err,
            BrokerError::Ranking(RankingError::CandidateEnumeration { ref category, .. }) if category == "all"
        ));
    }

    #[tokio::test]
    async fn test_country_scoring_and_only_available() {
        let store = Arc::new(InMemoryBrokerStore::with_brokers([
            raw(1, 8.0, "FCA", "ECN"),
            raw(2, 8.0, "FCA", "ECN"),
            raw(3, 8.0, "FCA", "ECN"),
        ]));
        store.set_availability(1, "germany", CountryAvailability::available(AvailabilityConfidence::High));
        store.set_availability(2, "germany", CountryAvailability::unavailable());
        let (engine, _) = engine(store);

        let ranked = engine
            .rank_brokers(&RankingOptions::new().with_country("germany"))
            .await
            .expect("rank");
        assert_eq!(ids(&ranked), vec![1, 3, 2]);
        assert!(ranked[0].country_available);
        assert!(!ranked[1].country_available);
        assert_eq!(ranked[1].breakdown.country_availability.value(), 5.0);

        let available = engine
            .rank_brokers(&RankingOptions::new().with_country("germany").only_available())
            .await
            .expect("rank");
        assert_eq!(ids(&available), vec![1, 3]);
    }

    #[tokio::test]
    async fn test_availability_failure_drops_only_that_broker() {
        let store = Arc::new(InMemoryBrokerStore::with_brokers([
            raw(1, 8.0, "FCA", "ECN"),
            raw(2, 7.0, "FCA", "ECN"),
        ]));
        store.fail_availability_for(1);
        let (engine, _) = engine(store);
        let ranked = engine
            .rank_brokers(&RankingOptions::new().with_country("france"))
            .await
            .expect("rank");
        assert_eq!(ids(&ranked), vec![2]);
    }

    #[tokio::test]
    async fn test_ties_keep_candidate_order() {
        let store = Arc::new(InMemoryBrokerStore::new());
        store.add_broker(raw(10, 7.0, "FCA", "ECN"));
        store.add_broker(raw(11, 7.0, "FCA", "ECN"));
        store.map_category("ecn-brokers", [11, 10]);
        let (engine, _) = engine(store);
        let ranked = engine
            .rank_brokers(&RankingOptions::new().with_category("ecn-brokers"))
            .await
            .expect("rank");
        assert_eq!(ids(&ranked), vec![11, 10]);
    }

    #[tokio::test]
    async fn test_weight_update_changes_ranking() {
        let store = Arc::new(InMemoryBrokerStore::with_brokers([
            // Heavily regulated, poor execution.
            raw(1, 2.0, "FCA, ASIC, CySEC, BaFin", "Market Maker"),
            // Unregulated, excellent execution.
            raw(2, 9.5, "", "ECN STP DMA"),
        ]));
        let (engine, weights_store) = engine(store);

        let mut partial = PartialWeights::new();
        partial.insert(RankingFactor::Regulation, 0.45);
        partial.insert(RankingFactor::ExecutionSpreads, 0.0);
        engine.update_weights(&partial).await.expect("valid weights");
        let regulation_first = engine.rank_brokers(&RankingOptions::new()).await.expect("rank");
        assert_eq!(regulation_first[0].broker_id, 1);

        partial.insert(RankingFactor::Regulation, 0.0);
        partial.insert(RankingFactor::ExecutionSpreads, 0.45);
        engine.update_weights(&partial).await.expect("valid weights");
        let execution_first = engine.rank_brokers(&RankingOptions::new()).await.expect("rank");
        assert_eq!(execution_first[0].broker_id, 2);
        // Both sets were served from the reseeded cache entry.
        assert_eq!(weights_store.list_calls(), 0);
        assert_eq!(weights_store.upsert_calls(), 2);
    }

    #[tokio::test]
    async fn test_malformed_json_columns_still_score() {
        let store = Arc::new(InMemoryBrokerStore::with_brokers([RawBroker {
            id: 5,
            fees: Some(json!("{not json")),
            platform_features: Some(json!(42)),
            ..Default::default()
        }]));
        let (engine, _) = engine(store);
        let ranked = engine.rank_brokers(&RankingOptions::new()).await.expect("rank");
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].broker_name, "broker-5");
        assert_eq!(ranked[0].breakdown.platform_features.value(), 5.0);
    }
}
