//! Brokerlist Test Utilities
//!
//! Shared test infrastructure for the brokerlist workspace:
//! - Proptest generators for broker rows and weight sets
//! - In-memory collaborators and a manual clock
//! - Fixtures for common ranking scenarios
//! - Assertions for ranking results and error classes

// Re-export in-memory collaborators from their source crates
pub use brokerlist_cache::InMemoryDurableTier;
pub use brokerlist_ranking::{InMemoryBrokerStore, InMemoryWeightStore};

// Re-export core types for convenience
pub use brokerlist_core::{
    AvailabilityConfidence, BrokerError, BrokerId, BrokerResult, BrokerScore, BrokerSnapshot,
    CountryAvailability, FactorScore, ManualClock, PartialWeights, RankingFactor, RankingWeights,
    RawBroker, ScoreBreakdown, Timestamp, WeightRow, MAX_FACTOR_SCORE,
};

use chrono::Utc;

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for brokerlist types.

    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    const REGULATORS: &[&str] = &[
        "FCA", "ASIC", "CySEC", "FINRA", "SEC", "BaFin", "FINMA", "MAS", "JFSA", "IIROC", "AFM",
        "CONSOB", "CNMV", "FSCA", "VFSC",
    ];

    const PLATFORMS: &[&str] = &["MT4", "MT5", "cTrader", "TradingView", "Proprietary"];

    /// Generate a Timestamp between 2020 and 2030.
    pub fn arb_timestamp() -> impl Strategy<Value = Timestamp> {
        (1577836800i64..1893456000i64).prop_map(|secs| {
            chrono::DateTime::from_timestamp(secs, 0).unwrap_or_else(Utc::now)
        })
    }

    /// Generate a free-form regulation label such as `"FCA, ASIC / SEC"`.
    pub fn arb_regulation_status() -> impl Strategy<Value = String> {
        (
            prop::sample::subsequence(REGULATORS, 0..=5),
            prop_oneof![Just(", "), Just(" / "), Just(" ")],
        )
            .prop_map(|(names, separator)| names.join(separator))
    }

    pub fn arb_broker_type() -> impl Strategy<Value = String> {
        prop_oneof![
            Just("ECN".to_string()),
            Just("STP".to_string()),
            Just("ECN/STP".to_string()),
            Just("DMA".to_string()),
            Just("Market Maker".to_string()),
            Just("Hybrid".to_string()),
        ]
    }

    /// Generate a `fees` column, sometimes malformed.
    pub fn arb_fees_json() -> impl Strategy<Value = serde_json::Value> {
        prop_oneof![
            (
                prop_oneof![Just("fixed"), Just("variable"), Just("raw")],
                any::<bool>(),
                any::<bool>(),
            )
                .prop_map(|(spread, withdrawal_free, no_inactivity)| {
                    json!({
                        "trading": { "spreadType": spread },
                        "nonTrading": {
                            "withdrawalFee": if withdrawal_free { "free" } else { "$25" },
                            "inactivityFee": if no_inactivity { "none" } else { "$10/month" },
                        }
                    })
                }),
            Just(json!("{broken")),
            Just(json!(null)),
        ]
    }

    /// Generate a `platform_features` column, sometimes malformed.
    pub fn arb_platform_json() -> impl Strategy<Value = serde_json::Value> {
        prop_oneof![
            (
                prop::sample::subsequence(PLATFORMS, 0..=PLATFORMS.len()),
                any::<[bool; 5]>(),
            )
                .prop_map(|(platforms, flags)| {
                    json!({
                        "platforms": platforms,
                        "apiAccess": flags[0],
                        "eaSupport": flags[1],
                        "copyTrading": { "available": flags[2] },
                        "backtesting": flags[3],
                        "islamicAccounts": flags[4],
                    })
                }),
            Just(json!([1, 2, 3])),
        ]
    }

    /// Generate an active broker row with the given id.
    pub fn arb_raw_broker(id: BrokerId) -> impl Strategy<Value = RawBroker> {
        (
            prop::option::of(arb_regulation_status()),
            prop::option::of(arb_broker_type()),
            prop::option::of(0.0f64..=10.0),
            prop::option::of(0.0f64..=10.0),
            prop::option::of(prop_oneof![Just(0.0), 1.0f64..5000.0]),
            prop::option::of(arb_fees_json()),
            prop::option::of(arb_platform_json()),
            any::<(bool, bool)>(),
        )
            .prop_map(
                move |(regulation, broker_type, rating, trust, deposit, fees, platform, flags)| {
                    RawBroker {
                        id,
                        name: Some(format!("Broker {id}")),
                        is_active: Some(true),
                        regulation_status: regulation,
                        broker_type,
                        overall_rating: rating,
                        trust_score: trust,
                        minimum_deposit: deposit,
                        fees,
                        platform_features: platform,
                        mobile_trading: Some(flags.0),
                        demo_account: Some(flags.1),
                    }
                },
            )
    }

    /// Generate between `min` and `max` brokers with ids `1..`.
    pub fn arb_broker_set(min: usize, max: usize) -> impl Strategy<Value = Vec<RawBroker>> {
        (min..=max).prop_flat_map(|count| {
            (1..=count as BrokerId)
                .map(arb_raw_broker)
                .collect::<Vec<_>>()
        })
    }

    /// Generate a weight set that satisfies the sum invariant.
    pub fn arb_valid_weights() -> impl Strategy<Value = RankingWeights> {
        prop::array::uniform7(0.0f64..=1.0).prop_map(|raw| {
            let sum: f64 = raw.iter().sum();
            let scale = if sum > 1.0 { 1.0 / sum } else { 1.0 };
            let mut weights = RankingWeights::default();
            for (factor, value) in RankingFactor::ALL.into_iter().zip(raw) {
                weights.set(factor, value * scale * 0.999);
            }
            weights
        })
    }

    pub fn arb_factor() -> impl Strategy<Value = RankingFactor> {
        prop::sample::select(RankingFactor::ALL.to_vec())
    }

    /// Generate a partial update of one to three factors.
    pub fn arb_partial_weights() -> impl Strategy<Value = PartialWeights> {
        prop::collection::btree_map(arb_factor(), 0.0f64..=0.6, 1..=3)
    }

    /// Generate a cache tag from a small alphabet, so collisions happen.
    pub fn arb_tag() -> impl Strategy<Value = String> {
        prop_oneof![
            Just("brokers".to_string()),
            Just("rankings".to_string()),
            Just("ecn-brokers".to_string()),
            Just("germany".to_string()),
            "[a-z]{1,6}",
        ]
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Broker rows and collaborators for common scenarios.

    use super::*;
    use serde_json::json;

    /// A clock fixed at 2025-01-01T00:00:00Z.
    pub fn fixed_clock() -> ManualClock {
        let start = chrono::DateTime::from_timestamp(1735689600, 0).unwrap_or_else(Utc::now);
        ManualClock::new(start)
    }

    /// Heavily regulated ECN broker with a full platform set.
    pub fn tier_one_ecn_broker(id: BrokerId) -> RawBroker {
        RawBroker {
            id,
            name: Some(format!("Tier One ECN {id}")),
            is_active: Some(true),
            regulation_status: Some("FCA, ASIC, CySEC".to_string()),
            broker_type: Some("ECN/STP".to_string()),
            overall_rating: Some(9.2),
            trust_score: Some(9.0),
            minimum_deposit: Some(100.0),
            fees: Some(json!({
                "trading": { "spreadType": "raw" },
                "nonTrading": { "withdrawalFee": "free", "inactivityFee": "none" }
            })),
            platform_features: Some(json!({
                "platforms": ["MT4", "MT5", "cTrader", "TradingView"],
                "apiAccess": true,
                "eaSupport": true,
                "copyTrading": { "available": true },
                "islamicAccounts": true
            })),
            mobile_trading: Some(true),
            demo_account: Some(true),
        }
    }

    /// Offshore market maker with fees and a high deposit.
    pub fn market_maker_broker(id: BrokerId) -> RawBroker {
        RawBroker {
            id,
            name: Some(format!("Market Maker {id}")),
            is_active: Some(true),
            regulation_status: Some("VFSC".to_string()),
            broker_type: Some("Market Maker".to_string()),
            overall_rating: Some(5.5),
            trust_score: None,
            minimum_deposit: Some(2500.0),
            fees: Some(json!({
                "trading": { "spreadType": "fixed" },
                "nonTrading": { "withdrawalFee": "$30", "inactivityFee": "$15/month" }
            })),
            platform_features: Some(json!({ "platforms": ["Proprietary"] })),
            mobile_trading: Some(true),
            demo_account: Some(false),
        }
    }

    /// Low-deposit broker aimed at beginners.
    pub fn beginner_broker(id: BrokerId) -> RawBroker {
        RawBroker {
            id,
            name: Some(format!("Starter {id}")),
            is_active: Some(true),
            regulation_status: Some("CySEC".to_string()),
            broker_type: Some("STP".to_string()),
            overall_rating: Some(7.4),
            trust_score: Some(7.0),
            minimum_deposit: Some(0.0),
            fees: Some(json!({ "trading": { "spreadType": "variable" } })),
            platform_features: Some(json!({ "platforms": ["MT4"], "copyTrading": { "available": true } })),
            mobile_trading: Some(true),
            demo_account: Some(true),
        }
    }

    /// Broker row whose JSON columns are unusable.
    pub fn malformed_broker(id: BrokerId) -> RawBroker {
        RawBroker {
            id,
            name: None,
            fees: Some(json!("{not json")),
            platform_features: Some(json!(17)),
            overall_rating: Some(f64::NAN),
            ..Default::default()
        }
    }

    /// One of each fixture, ids 1 through 4.
    pub fn sample_brokers() -> Vec<RawBroker> {
        vec![
            tier_one_ecn_broker(1),
            market_maker_broker(2),
            beginner_broker(3),
            malformed_broker(4),
        ]
    }

    /// A broker store holding [`sample_brokers`], with country records for
    /// `germany` and an `ecn-brokers` mapping.
    pub fn sample_broker_store() -> InMemoryBrokerStore {
        let store = InMemoryBrokerStore::with_brokers(sample_brokers());
        store.set_availability(1, "germany", CountryAvailability::available(AvailabilityConfidence::High));
        store.set_availability(2, "germany", CountryAvailability::unavailable());
        store.set_availability(3, "germany", CountryAvailability::available(AvailabilityConfidence::Medium));
        store.map_category("ecn-brokers", [1, 3]);
        store
    }

    /// Weight rows reproducing the default weight set.
    pub fn default_weight_rows() -> Vec<WeightRow> {
        let defaults = RankingWeights::default();
        defaults.rows_for(RankingFactor::ALL)
    }
}

// ============================================================================
// ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions for ranking results and error classes.

    use super::*;

    pub fn assert_sorted_descending(scores: &[BrokerScore]) {
        for pair in scores.windows(2) {
            assert!(
                pair[0].total_score >= pair[1].total_score,
                "ranking out of order: {} ({}) before {} ({})",
                pair[0].broker_id,
                pair[0].total_score,
                pair[1].broker_id,
                pair[1].total_score
            );
        }
    }

    pub fn assert_factor_scores_in_range(breakdown: &ScoreBreakdown) {
        for factor in RankingFactor::ALL {
            let value = breakdown.get(factor).value();
            assert!(
                (0.0..=MAX_FACTOR_SCORE).contains(&value),
                "{factor} score {value} out of range"
            );
        }
    }

    pub fn assert_validation_error<T: std::fmt::Debug>(result: &BrokerResult<T>) {
        match result {
            Err(BrokerError::Validation(_)) => {}
            other => panic!("Expected validation error, got {:?}", other),
        }
    }

    pub fn assert_unavailable_error<T: std::fmt::Debug>(result: &BrokerResult<T>) {
        match result {
            Err(e) if e.is_unavailable() => {}
            other => panic!("Expected upstream or ranking error, got {:?}", other),
        }
    }

    pub fn assert_weights_valid(weights: &RankingWeights) {
        if let Err(e) = weights.validate() {
            panic!("Expected valid weights, got {e}: {weights:?}");
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_sample_brokers_snapshot() {
        let snapshots: Vec<_> = fixtures::sample_brokers()
            .iter()
            .map(BrokerSnapshot::from_raw)
            .collect();
        assert!(snapshots[0].has_regulator("fca"));
        assert!(snapshots[0].execution.ecn);
        assert!(snapshots[1].execution.market_maker);
        assert_eq!(snapshots[2].minimum_deposit, Some(0.0));
        assert_eq!(snapshots[3].overall_rating, 0.0);
        assert_eq!(snapshots[3].name, "broker-4");
    }

    #[test]
    fn test_default_weight_rows_round_trip() {
        let (weights, unknown) = RankingWeights::from_rows(&fixtures::default_weight_rows());
        assert!(unknown.is_empty());
        assert_eq!(weights, RankingWeights::default());
    }

    #[test]
    fn test_assertion_validation_error() {
        let result: BrokerResult<()> = Err(brokerlist_core::ValidationError::WeightSumExceeded {
            sum: 1.5,
        }
        .into());
        assertions::assert_validation_error(&result);
    }

    #[test]
    #[should_panic(expected = "ranking out of order")]
    fn test_assert_sorted_descending_detects_disorder() {
        let score = |id, total| BrokerScore {
            broker_id: id,
            broker_name: format!("Broker {id}"),
            total_score: total,
            breakdown: brokerlist_ranking::score_breakdown(
                &BrokerSnapshot::new(id, "x"),
                FactorScore::new(8.0),
            ),
            category_match_score: FactorScore::new(10.0),
            country_available: true,
        };
        assertions::assert_sorted_descending(&[score(1, 5.0), score(2, 6.0)]);
    }

    proptest! {
        #[test]
        fn prop_generated_weights_are_valid(weights in generators::arb_valid_weights()) {
            assertions::assert_weights_valid(&weights);
        }

        #[test]
        fn prop_generated_brokers_are_active(broker in generators::arb_raw_broker(9)) {
            let snapshot = BrokerSnapshot::from_raw(&broker);
            prop_assert!(snapshot.active);
            prop_assert_eq!(snapshot.id, 9);
        }
    }
}
