//! Factor scorers.
//!
//! Pure functions from a [`BrokerSnapshot`] to a [`FactorScore`] in `[0, 10]`.
//! None of them touch I/O; the country scorer takes the result of the
//! availability lookup instead of performing it.

use brokerlist_core::{
    AvailabilityConfidence, BrokerSnapshot, CountryAvailability, FactorScore, ScoreBreakdown,
    WITHDRAWAL_RELIABILITY_SCORE,
};

/// Top-tier regulators and their contribution. `finra` and `sec` share one
/// contribution but both count towards the multi-regulator bonus.
const TOP_TIER_REGULATORS: &[(&str, f64)] = &[
    ("fca", 2.5),
    ("asic", 2.3),
    ("cysec", 2.0),
    ("bafin", 2.2),
    ("finma", 2.4),
    ("mas", 2.1),
    ("jfsa", 2.0),
];

const US_REGULATORS: &[&str] = &["finra", "sec"];
const US_REGULATOR_SCORE: f64 = 2.5;

const MID_TIER_REGULATORS: &[(&str, f64)] = &[
    ("iiroc", 1.8),
    ("afm", 1.7),
    ("consob", 1.6),
    ("cnmv", 1.5),
];

const MULTI_REGULATOR_BONUS: f64 = 0.5;
const REGULATION_SCALE: f64 = 1.2;

const FEES_BASE_SCORE: f64 = 7.0;
const PLATFORM_BASE_SCORE: f64 = 5.0;

const PLATFORM_BONUSES: &[(&str, f64)] = &[
    ("mt4", 0.8),
    ("mt5", 1.0),
    ("ctrader", 0.7),
    ("tradingview", 0.9),
    ("proprietary", 0.6),
];

/// Country score when the ranking is not scoped to a country.
pub const NO_COUNTRY_SCORE: f64 = 8.0;
/// Country score when the store has no record, or availability is unverified.
pub const NEUTRAL_COUNTRY_SCORE: f64 = 5.0;

// ============================================================================
// REGULATION
// ============================================================================

pub fn regulation_score(broker: &BrokerSnapshot) -> FactorScore {
    if broker.regulators.is_empty() {
        return FactorScore::new(0.0);
    }

    let mut score: f64 = TOP_TIER_REGULATORS
        .iter()
        .chain(MID_TIER_REGULATORS)
        .filter(|(name, _)| broker.has_regulator(name))
        .map(|(_, points)| points)
        .sum();

    let us_regulators = US_REGULATORS
        .iter()
        .filter(|name| broker.has_regulator(name))
        .count();
    if us_regulators > 0 {
        score += US_REGULATOR_SCORE;
    }

    let top_tier = TOP_TIER_REGULATORS
        .iter()
        .filter(|(name, _)| broker.has_regulator(name))
        .count()
        + us_regulators;
    if top_tier > 1 {
        score += top_tier as f64 * MULTI_REGULATOR_BONUS;
    }

    FactorScore::new(score * REGULATION_SCALE)
}

// ============================================================================
// EXECUTION
// ============================================================================

pub fn execution_score(broker: &BrokerSnapshot) -> FactorScore {
    let model = broker.execution;
    let mut score = broker.overall_rating;
    if model.ecn {
        score += 1.0;
    }
    if model.stp {
        score += 0.8;
    }
    if model.dma {
        score += 1.2;
    }
    if model.market_maker {
        score -= 0.5;
    }
    FactorScore::new(score)
}

// ============================================================================
// FEES
// ============================================================================

pub fn fees_score(broker: &BrokerSnapshot) -> FactorScore {
    let mut score = FEES_BASE_SCORE;

    if let Some(deposit) = broker.minimum_deposit {
        score += match deposit {
            d if d == 0.0 => 1.5,
            d if d <= 100.0 => 1.0,
            d if d <= 500.0 => 0.5,
            d if d > 2000.0 => -1.0,
            _ => 0.0,
        };
    }

    let fees = broker.fees;
    if fees.spread_type.is_competitive() {
        score += 0.5;
    }
    if fees.withdrawal_fee {
        score -= 0.3;
    }
    if fees.inactivity_fee {
        score -= 0.5;
    }

    FactorScore::new(score)
}

// ============================================================================
// PLATFORM
// ============================================================================

pub fn platform_score(broker: &BrokerSnapshot) -> FactorScore {
    let platform = &broker.platform;
    let mut score = PLATFORM_BASE_SCORE;

    score += PLATFORM_BONUSES
        .iter()
        .filter(|(name, _)| platform.supports(name))
        .map(|(_, points)| points)
        .sum::<f64>();

    for (enabled, points) in [
        (platform.api_access, 0.5),
        (platform.ea_support, 0.4),
        (platform.copy_trading, 0.3),
        (platform.backtesting, 0.2),
        (platform.mobile_trading, 0.5),
        (platform.demo_account, 0.3),
    ] {
        if enabled {
            score += points;
        }
    }

    FactorScore::new(score)
}

// ============================================================================
// COUNTRY
// ============================================================================

/// Outcome of the country availability lookup for one broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountryLookup {
    /// Ranking is not scoped to a country.
    NotRequested,
    /// The store has no record for this broker and country.
    NoRecord,
    Found(CountryAvailability),
}

pub fn country_score(lookup: CountryLookup) -> FactorScore {
    let score = match lookup {
        CountryLookup::NotRequested => NO_COUNTRY_SCORE,
        CountryLookup::NoRecord => NEUTRAL_COUNTRY_SCORE,
        CountryLookup::Found(record) => match record.available {
            Some(true) => match record.confidence {
                AvailabilityConfidence::High => 10.0,
                AvailabilityConfidence::Medium => 8.5,
                AvailabilityConfidence::Low | AvailabilityConfidence::Unknown => 7.0,
            },
            Some(false) => 0.0,
            None => NEUTRAL_COUNTRY_SCORE,
        },
    };
    FactorScore::new(score)
}

// ============================================================================
// REVIEWS
// ============================================================================

pub fn review_score(broker: &BrokerSnapshot) -> FactorScore {
    FactorScore::new(broker.review_proxy)
}

/// All seven factor scores for one broker. Withdrawal reliability has no data
/// source and is the constant [`WITHDRAWAL_RELIABILITY_SCORE`].
pub fn score_breakdown(broker: &BrokerSnapshot, country: FactorScore) -> ScoreBreakdown {
    ScoreBreakdown {
        regulation: regulation_score(broker),
        execution_spreads: execution_score(broker),
        fees_commissions: fees_score(broker),
        withdrawal_reliability: FactorScore::new(WITHDRAWAL_RELIABILITY_SCORE),
        platform_features: platform_score(broker),
        country_availability: country,
        user_reviews: review_score(broker),
    }
}
