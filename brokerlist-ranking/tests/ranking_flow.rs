//! End-to-end ranking flows over the shared fixtures.

use std::sync::Arc;

use brokerlist_cache::{CacheConfig, CacheManager};
use brokerlist_core::apply_category_bonus;
use brokerlist_ranking::{
    country_score, score_breakdown, CountryLookup, ListingService, RankingEngine, RankingOptions,
    WeightsAdapter,
};
use brokerlist_test_utils::assertions::{
    assert_factor_scores_in_range, assert_sorted_descending, assert_unavailable_error,
    assert_validation_error,
};
use brokerlist_test_utils::fixtures::{self, sample_broker_store};
use brokerlist_test_utils::generators::{arb_broker_set, arb_valid_weights};
use brokerlist_test_utils::{
    BrokerId, BrokerSnapshot, FactorScore, InMemoryBrokerStore, InMemoryWeightStore, PartialWeights,
    RankingFactor, RankingWeights, RawBroker,
};
use proptest::prelude::*;
use serde_json::json;

struct Harness {
    engine: Arc<RankingEngine>,
    brokers: Arc<InMemoryBrokerStore>,
    weights: Arc<InMemoryWeightStore>,
    cache: CacheManager,
}

fn harness(brokers: InMemoryBrokerStore) -> Harness {
    let clock = Arc::new(fixtures::fixed_clock());
    let cache = CacheManager::with_parts(CacheConfig::default(), clock, None);
    let brokers = Arc::new(brokers);
    let weights = Arc::new(InMemoryWeightStore::with_rows(fixtures::default_weight_rows()));
    let adapter = WeightsAdapter::new(weights.clone(), cache.clone());
    Harness {
        engine: Arc::new(RankingEngine::new(brokers.clone(), adapter)),
        brokers,
        weights,
        cache,
    }
}

#[tokio::test]
async fn test_overall_ranking_of_fixtures() {
    let h = harness(sample_broker_store());
    let ranked = h.engine.rank_brokers(&RankingOptions::new()).await.expect("rank");

    assert_eq!(ranked.len(), 4);
    assert_eq!(ranked[0].broker_id, 1);
    assert_sorted_descending(&ranked);
    for score in &ranked {
        assert_factor_scores_in_range(&score.breakdown);
        assert_eq!(score.category_match_score.value(), 10.0);
        assert_eq!(score.breakdown.country_availability.value(), 8.0);
        assert!(score.country_available);
    }
}

#[tokio::test]
async fn test_total_score_is_weighted_total_with_bonus() {
    let h = harness(sample_broker_store());
    let ranked = h
        .engine
        .rank_brokers(&RankingOptions::new().with_category("ecn-brokers"))
        .await
        .expect("rank");

    let raw = fixtures::tier_one_ecn_broker(1);
    let snapshot = BrokerSnapshot::from_raw(&raw);
    let breakdown = score_breakdown(&snapshot, country_score(CountryLookup::NotRequested));
    let expected = apply_category_bonus(
        breakdown.weighted_total(&RankingWeights::default()),
        FactorScore::new(10.0),
    );

    let top = ranked.iter().find(|s| s.broker_id == 1).expect("broker 1 ranked");
    assert_eq!(top.total_score, brokerlist_core::round2(expected));
    // Mapped category only ranks its brokers.
    assert_eq!(ranked.len(), 2);
}

#[test]
fn test_worked_example() {
    let breakdown = brokerlist_core::ScoreBreakdown {
        regulation: FactorScore::new(10.0),
        execution_spreads: FactorScore::new(10.0),
        fees_commissions: FactorScore::new(10.0),
        withdrawal_reliability: FactorScore::new(7.0),
        platform_features: FactorScore::new(10.0),
        country_availability: FactorScore::new(10.0),
        user_reviews: FactorScore::new(8.0),
    };
    let total = breakdown.weighted_total(&RankingWeights::default());
    assert!((total - 9.5).abs() < 1e-9);
    let final_score = apply_category_bonus(total, FactorScore::new(10.0));
    assert_eq!(brokerlist_core::round2(final_score), 10.45);
}

#[tokio::test]
async fn test_country_listing_excludes_unavailable() {
    let h = harness(sample_broker_store());
    let listing = ListingService::new(h.engine.clone(), h.cache.clone());
    let ranked = listing
        .brokers_for_country("germany", None)
        .await
        .expect("rank");

    let ids: Vec<_> = ranked.iter().map(|s| s.broker_id).collect();
    assert!(!ids.contains(&2));
    assert!(ranked.iter().all(|s| s.total_score >= 5.0));
    assert!(ranked.len() <= 20);
}

#[tokio::test]
async fn test_weight_update_visible_without_store_fetch() {
    let h = harness(sample_broker_store());
    h.engine.rank_brokers(&RankingOptions::new()).await.expect("rank");
    assert_eq!(h.weights.list_calls(), 1);

    let mut partial = PartialWeights::new();
    partial.insert(RankingFactor::Regulation, 0.3);
    partial.insert(RankingFactor::ExecutionSpreads, 0.3);
    h.engine.update_weights(&partial).await.expect("sum 0.6");

    let ranked = h.engine.rank_brokers(&RankingOptions::new()).await.expect("rank");
    assert_eq!(h.weights.list_calls(), 1);
    let active = h.engine.load_weights().await;
    assert_eq!(active.regulation, 0.3);
    assert_eq!(active.execution_spreads, 0.3);
    assert_eq!(active.user_reviews, 0.0);
    assert_sorted_descending(&ranked);
    for score in &ranked {
        let expected = apply_category_bonus(
            score.breakdown.weighted_total(&active),
            score.category_match_score,
        );
        // Breakdowns are reported rounded to two decimals.
        assert!((score.total_score - expected).abs() < 0.02);
    }
}

#[tokio::test]
async fn test_rejected_weight_update_leaves_store_untouched() {
    let h = harness(sample_broker_store());
    let mut partial = PartialWeights::new();
    partial.insert(RankingFactor::Regulation, 0.6);
    partial.insert(RankingFactor::ExecutionSpreads, 0.6);
    let result = h.engine.update_weights(&partial).await;
    assert_validation_error(&result);
    assert_eq!(h.weights.upsert_calls(), 0);
    assert_eq!(h.engine.load_weights().await, RankingWeights::default());
}

#[tokio::test]
async fn test_weight_update_drops_cached_pages() {
    let h = harness(sample_broker_store());
    let listing = ListingService::new(h.engine.clone(), h.cache.clone());
    listing.ranked_listing(RankingOptions::new()).await.expect("rank");
    listing.ranked_listing(RankingOptions::new()).await.expect("cached");
    assert_eq!(h.brokers.list_calls(), 1);

    let mut partial = PartialWeights::new();
    partial.insert(RankingFactor::PlatformFeatures, 1.0);
    h.engine.update_weights(&partial).await.expect("valid update");

    let after = listing.ranked_listing(RankingOptions::new()).await.expect("rank");
    assert_eq!(h.brokers.list_calls(), 2);
    for score in &after {
        let expected = apply_category_bonus(
            score.breakdown.platform_features.value(),
            score.category_match_score,
        );
        // Breakdowns are reported rounded to two decimals.
        assert!((score.total_score - expected).abs() < 0.02);
    }
}

#[tokio::test]
async fn test_store_outage_surfaces_as_unavailable() {
    let h = harness(InMemoryBrokerStore::new());
    h.brokers.set_fail_listing(true);
    let result = h.engine.rank_brokers(&RankingOptions::new()).await;
    assert_unavailable_error(&result);
}

#[tokio::test]
async fn test_listing_serves_stale_page_while_store_is_down() {
    let clock = Arc::new(fixtures::fixed_clock());
    let cache = CacheManager::with_parts(CacheConfig::default(), clock.clone(), None);
    let brokers = Arc::new(sample_broker_store());
    let adapter = WeightsAdapter::new(Arc::new(InMemoryWeightStore::new()), cache.clone());
    let engine = Arc::new(RankingEngine::new(brokers.clone(), adapter));
    let listing = ListingService::new(engine, cache.clone());

    let fresh = listing.ranked_listing(RankingOptions::new()).await.expect("rank");

    clock.advance(brokerlist_cache::DEFAULT_TTL + std::time::Duration::from_secs(1));
    brokers.set_fail_listing(true);

    let stale = listing.ranked_listing(RankingOptions::new()).await.expect("stale page");
    assert_eq!(stale, fresh);
    cache.await_all_revalidations().await;
    assert!(cache.stats().revalidation_failures >= 1);
}

const DOMINATING_ID: BrokerId = 1_000;

/// A broker at least as good as `base` on every factor: extra top-tier
/// regulators, pure agency execution, no fees, every platform and feature.
fn dominating(base: &RawBroker, id: BrokerId, rating_bump: f64) -> RawBroker {
    let regulators = match base.regulation_status.as_deref() {
        Some(status) => format!("{status}, FCA, ASIC, CySEC"),
        None => "FCA, ASIC, CySEC".to_string(),
    };
    let rating = base
        .overall_rating
        .filter(|r| r.is_finite())
        .unwrap_or(0.0)
        .max(0.0);
    RawBroker {
        id,
        name: Some("Dominating".to_string()),
        is_active: Some(true),
        regulation_status: Some(regulators),
        broker_type: Some("ECN STP DMA".to_string()),
        overall_rating: Some((rating + rating_bump).min(10.0)),
        trust_score: Some(10.0),
        minimum_deposit: Some(0.0),
        fees: Some(json!({
            "trading": { "spreadType": "raw" },
            "nonTrading": { "withdrawalFee": "free", "inactivityFee": "none" }
        })),
        platform_features: Some(json!({
            "platforms": ["MT4", "MT5", "cTrader", "TradingView", "Proprietary"],
            "apiAccess": true,
            "eaSupport": true,
            "copyTrading": { "available": true },
            "backtesting": true,
            "islamicAccounts": true
        })),
        mobile_trading: Some(true),
        demo_account: Some(true),
    }
}

fn rank_blocking(engine: &RankingEngine, options: &RankingOptions) -> Vec<brokerlist_core::BrokerScore> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("runtime");
    runtime
        .block_on(engine.rank_brokers(options))
        .expect("rank")
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_ranking_is_monotonic(
        brokers in arb_broker_set(1, 8),
        weights in arb_valid_weights(),
        rating_bump in 0.0f64..=3.0,
    ) {
        let weaker = brokers[0].clone();
        let stronger = dominating(&weaker, DOMINATING_ID, rating_bump);
        let mut all = brokers.clone();
        all.push(stronger);

        let h = harness(InMemoryBrokerStore::with_brokers(all));
        let partial: PartialWeights = RankingFactor::ALL
            .into_iter()
            .map(|f| (f, weights.get(f)))
            .collect();
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("runtime");
        runtime
            .block_on(h.engine.update_weights(&partial))
            .expect("valid weights");

        let ranked = rank_blocking(&h.engine, &RankingOptions::new().with_limit(100));
        let position = |id| ranked.iter().position(|s| s.broker_id == id).expect("ranked");
        let strong_pos = position(DOMINATING_ID);
        let weak_pos = position(weaker.id);
        let strong = &ranked[strong_pos];
        let weak = &ranked[weak_pos];

        for factor in RankingFactor::ALL {
            prop_assert!(
                strong.breakdown.get(factor).value() >= weak.breakdown.get(factor).value(),
                "{} not dominated", factor
            );
        }
        prop_assert_eq!(strong.category_match_score, weak.category_match_score);
        prop_assert!(strong.total_score >= weak.total_score);
        if strong.total_score > weak.total_score {
            prop_assert!(strong_pos < weak_pos);
        }
    }

    #[test]
    fn prop_scores_match_weighted_totals(
        brokers in arb_broker_set(2, 8),
    ) {
        let weights = RankingWeights::default();
        let mut manual: Vec<(i64, f64)> = brokers
            .iter()
            .map(|raw| {
                let snapshot = BrokerSnapshot::from_raw(raw);
                let breakdown = score_breakdown(&snapshot, country_score(CountryLookup::NotRequested));
                (raw.id, breakdown.weighted_total(&weights))
            })
            .collect();
        manual.sort_by(|a, b| b.1.total_cmp(&a.1));

        let h = harness(InMemoryBrokerStore::with_brokers(brokers));
        let ranked = rank_blocking(&h.engine, &RankingOptions::new().with_limit(100));
        for (position, score) in ranked.iter().enumerate() {
            let expected = brokerlist_core::round2(apply_category_bonus(
                manual[position].1,
                FactorScore::new(10.0),
            ));
            prop_assert!((score.total_score - expected).abs() < 0.011);
        }
    }
}
