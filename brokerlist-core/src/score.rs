//! Score types produced by the ranking engine.

use serde::{Deserialize, Serialize};

use crate::weights::{RankingFactor, RankingWeights};
use crate::BrokerId;

/// Upper bound of every factor score.
pub const MAX_FACTOR_SCORE: f64 = 10.0;

/// Constant contribution used for withdrawal reliability, which has no data source.
pub const WITHDRAWAL_RELIABILITY_SCORE: f64 = 7.0;

/// A factor score clamped to `[0, 10]`. NaN collapses to 0.
#[derive(Debug, Clone, Copy, Default, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FactorScore(f64);

impl FactorScore {
    pub fn new(value: f64) -> Self {
        if value.is_nan() {
            return Self(0.0);
        }
        Self(value.clamp(0.0, MAX_FACTOR_SCORE))
    }

    pub fn value(&self) -> f64 {
        self.0
    }

    pub fn rounded(&self) -> Self {
        Self(round2(self.0))
    }
}

impl From<f64> for FactorScore {
    fn from(value: f64) -> Self {
        Self::new(value)
    }
}

/// Per-factor scores for one broker.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub regulation: FactorScore,
    pub execution_spreads: FactorScore,
    pub fees_commissions: FactorScore,
    pub withdrawal_reliability: FactorScore,
    pub platform_features: FactorScore,
    pub country_availability: FactorScore,
    pub user_reviews: FactorScore,
}

impl ScoreBreakdown {
    pub fn get(&self, factor: RankingFactor) -> FactorScore {
        match factor {
            RankingFactor::Regulation => self.regulation,
            RankingFactor::ExecutionSpreads => self.execution_spreads,
            RankingFactor::FeesCommissions => self.fees_commissions,
            RankingFactor::WithdrawalReliability => self.withdrawal_reliability,
            RankingFactor::PlatformFeatures => self.platform_features,
            RankingFactor::CountryAvailability => self.country_availability,
            RankingFactor::UserReviews => self.user_reviews,
        }
    }

    /// `Σ score × weight` across every factor. Category match is not part of it.
    pub fn weighted_total(&self, weights: &RankingWeights) -> f64 {
        RankingFactor::ALL
            .iter()
            .map(|f| self.get(*f).value() * weights.get(*f))
            .sum()
    }

    pub fn rounded(&self) -> Self {
        Self {
            regulation: self.regulation.rounded(),
            execution_spreads: self.execution_spreads.rounded(),
            fees_commissions: self.fees_commissions.rounded(),
            withdrawal_reliability: self.withdrawal_reliability.rounded(),
            platform_features: self.platform_features.rounded(),
            country_availability: self.country_availability.rounded(),
            user_reviews: self.user_reviews.rounded(),
        }
    }
}

/// Final score: the weighted total uplifted by up to 10% for category fit.
pub fn apply_category_bonus(weighted_total: f64, category_match: FactorScore) -> f64 {
    weighted_total * (1.0 + category_match.value() / 100.0)
}

/// Round to two decimals.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Ranked result for one broker. Built per ranking call, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrokerScore {
    pub broker_id: BrokerId,
    pub broker_name: String,
    /// Final score (weighted total with category uplift), rounded to two decimals.
    pub total_score: f64,
    pub breakdown: ScoreBreakdown,
    pub category_match_score: FactorScore,
    pub country_available: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn breakdown(values: [f64; 7]) -> ScoreBreakdown {
        ScoreBreakdown {
            regulation: values[0].into(),
            execution_spreads: values[1].into(),
            fees_commissions: values[2].into(),
            withdrawal_reliability: values[3].into(),
            platform_features: values[4].into(),
            country_availability: values[5].into(),
            user_reviews: values[6].into(),
        }
    }

    #[test]
    fn test_worked_example() {
        let scores = breakdown([10.0, 10.0, 10.0, WITHDRAWAL_RELIABILITY_SCORE, 10.0, 10.0, 8.0]);
        let total = scores.weighted_total(&RankingWeights::default());
        assert!((total - 9.5).abs() < 1e-9);

        let final_score = apply_category_bonus(total, FactorScore::new(10.0));
        assert_eq!(round2(final_score), 10.45);
    }

    #[test]
    fn test_category_bonus_never_penalizes() {
        assert_eq!(apply_category_bonus(6.0, FactorScore::new(0.0)), 6.0);
        assert!(apply_category_bonus(6.0, FactorScore::new(3.0)) > 6.0);
    }

    #[test]
    fn test_factor_score_nan_is_zero() {
        assert_eq!(FactorScore::new(f64::NAN).value(), 0.0);
        assert_eq!(FactorScore::new(f64::INFINITY).value(), MAX_FACTOR_SCORE);
    }

    proptest! {
        #[test]
        fn prop_factor_score_clamped(value in any::<f64>()) {
            let score = FactorScore::new(value).value();
            prop_assert!((0.0..=MAX_FACTOR_SCORE).contains(&score));
        }

        #[test]
        fn prop_total_bounded_by_ten(values in prop::array::uniform7(0.0f64..=10.0)) {
            let total = breakdown(values).weighted_total(&RankingWeights::default());
            prop_assert!(total <= MAX_FACTOR_SCORE + 1e-9);
            prop_assert!(total >= 0.0);
        }
    }
}
