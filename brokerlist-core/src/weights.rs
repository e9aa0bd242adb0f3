//! Ranking weights.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Slack allowed on the weight-sum invariant for floating point noise.
pub const WEIGHT_SUM_TOLERANCE: f64 = 1e-9;

/// One weighted ranking dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RankingFactor {
    Regulation,
    ExecutionSpreads,
    FeesCommissions,
    WithdrawalReliability,
    PlatformFeatures,
    CountryAvailability,
    UserReviews,
}

impl RankingFactor {
    pub const ALL: [RankingFactor; 7] = [
        RankingFactor::Regulation,
        RankingFactor::ExecutionSpreads,
        RankingFactor::FeesCommissions,
        RankingFactor::WithdrawalReliability,
        RankingFactor::PlatformFeatures,
        RankingFactor::CountryAvailability,
        RankingFactor::UserReviews,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RankingFactor::Regulation => "regulation",
            RankingFactor::ExecutionSpreads => "execution_spreads",
            RankingFactor::FeesCommissions => "fees_commissions",
            RankingFactor::WithdrawalReliability => "withdrawal_reliability",
            RankingFactor::PlatformFeatures => "platform_features",
            RankingFactor::CountryAvailability => "country_availability",
            RankingFactor::UserReviews => "user_reviews",
        }
    }
}

impl fmt::Display for RankingFactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RankingFactor {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RankingFactor::ALL
            .into_iter()
            .find(|f| f.as_str() == s)
            .ok_or_else(|| ValidationError::UnknownFactor {
                name: s.to_string(),
            })
    }
}

/// Partial weight update keyed by factor.
pub type PartialWeights = BTreeMap<RankingFactor, f64>;

/// A row from the weight store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightRow {
    pub factor: String,
    pub weight: f64,
}

impl WeightRow {
    pub fn new(factor: RankingFactor, weight: f64) -> Self {
        Self {
            factor: factor.as_str().to_string(),
            weight,
        }
    }
}

/// Weight per ranking factor. Non-negative, summing to at most 1.0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RankingWeights {
    pub regulation: f64,
    pub execution_spreads: f64,
    pub fees_commissions: f64,
    pub withdrawal_reliability: f64,
    pub platform_features: f64,
    pub country_availability: f64,
    pub user_reviews: f64,
}

impl Default for RankingWeights {
    fn default() -> Self {
        Self {
            regulation: 0.25,
            execution_spreads: 0.20,
            fees_commissions: 0.15,
            withdrawal_reliability: 0.10,
            platform_features: 0.10,
            country_availability: 0.10,
            user_reviews: 0.10,
        }
    }
}

impl RankingWeights {
    pub fn get(&self, factor: RankingFactor) -> f64 {
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

    pub fn set(&mut self, factor: RankingFactor, weight: f64) {
        let slot = match factor {
            RankingFactor::Regulation => &mut self.regulation,
            RankingFactor::ExecutionSpreads => &mut self.execution_spreads,
            RankingFactor::FeesCommissions => &mut self.fees_commissions,
            RankingFactor::WithdrawalReliability => &mut self.withdrawal_reliability,
            RankingFactor::PlatformFeatures => &mut self.platform_features,
            RankingFactor::CountryAvailability => &mut self.country_availability,
            RankingFactor::UserReviews => &mut self.user_reviews,
        };
        *slot = weight;
    }

    pub fn sum(&self) -> f64 {
        RankingFactor::ALL.iter().map(|f| self.get(*f)).sum()
    }

    /// Check that every weight is finite and non-negative and the sum is at most 1.0.
    pub fn validate(&self) -> Result<(), ValidationError> {
        for factor in RankingFactor::ALL {
            validate_weight(factor, self.get(factor))?;
        }
        let sum = self.sum();
        if sum > 1.0 + WEIGHT_SUM_TOLERANCE {
            return Err(ValidationError::WeightSumExceeded { sum });
        }
        Ok(())
    }

    /// Weight set made of exactly the submitted factors.
    ///
    /// Factors missing from `partial` are zero, so the sum checked is the sum
    /// of the submitted values.
    pub fn from_partial(partial: &PartialWeights) -> Result<Self, ValidationError> {
        if partial.is_empty() {
            return Err(ValidationError::RequiredFieldMissing {
                field: "weights".to_string(),
            });
        }
        let mut weights = Self::zero();
        for (factor, weight) in partial {
            validate_weight(*factor, *weight)?;
            weights.set(*factor, *weight);
        }
        weights.validate()?;
        Ok(weights)
    }

    fn zero() -> Self {
        Self {
            regulation: 0.0,
            execution_spreads: 0.0,
            fees_commissions: 0.0,
            withdrawal_reliability: 0.0,
            platform_features: 0.0,
            country_availability: 0.0,
            user_reviews: 0.0,
        }
    }

    /// Build weights from store rows on top of the defaults.
    ///
    /// Rows naming unknown factors are skipped and returned separately so the
    /// caller can log them.
    pub fn from_rows(rows: &[WeightRow]) -> (Self, Vec<String>) {
        let mut weights = Self::default();
        let mut unknown = Vec::new();
        for row in rows {
            match row.factor.parse::<RankingFactor>() {
                Ok(factor) => weights.set(factor, row.weight),
                Err(_) => unknown.push(row.factor.clone()),
            }
        }
        (weights, unknown)
    }

    /// Rows for persisting the given factors.
    pub fn rows_for(&self, factors: impl IntoIterator<Item = RankingFactor>) -> Vec<WeightRow> {
        factors
            .into_iter()
            .map(|f| WeightRow::new(f, self.get(f)))
            .collect()
    }
}

fn validate_weight(factor: RankingFactor, weight: f64) -> Result<(), ValidationError> {
    if !weight.is_finite() {
        return Err(ValidationError::InvalidWeight {
            factor: factor.to_string(),
            reason: "must be a finite number".to_string(),
        });
    }
    if weight < 0.0 {
        return Err(ValidationError::InvalidWeight {
            factor: factor.to_string(),
            reason: format!("must be non-negative, got {}", weight),
        });
    }
    Ok(())
}
