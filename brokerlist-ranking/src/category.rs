//! Category fit.
//!
//! The category match score is not a weighted factor. It lifts the weighted
//! total by up to 10% in [`brokerlist_core::apply_category_bonus`].

use brokerlist_core::{BrokerSnapshot, FactorScore};

use crate::scorers::regulation_score;

/// Score when the ranking is not scoped to a category.
pub const NO_CATEGORY_SCORE: f64 = 10.0;
/// Score for a category slug with no decision rule.
pub const UNKNOWN_CATEGORY_SCORE: f64 = 7.0;
/// Beginner score for a broker that does not publish a minimum deposit.
pub const UNKNOWN_DEPOSIT_SCORE: f64 = 7.0;

/// Category slugs with a decision rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KnownCategory {
    Ecn,
    Stp,
    Mt4,
    Mt5,
    Beginners,
    Islamic,
    MostRegulated,
}

impl KnownCategory {
    pub fn from_slug(slug: &str) -> Option<Self> {
        match slug {
            "ecn-brokers" => Some(KnownCategory::Ecn),
            "stp-forex-brokers" => Some(KnownCategory::Stp),
            "mt4-brokers" => Some(KnownCategory::Mt4),
            "mt5-brokers" => Some(KnownCategory::Mt5),
            "forex-brokers-beginners" => Some(KnownCategory::Beginners),
            "islamic-accounts" => Some(KnownCategory::Islamic),
            "most-regulated-forex-brokers" => Some(KnownCategory::MostRegulated),
            _ => None,
        }
    }

    pub fn slug(&self) -> &'static str {
        match self {
            KnownCategory::Ecn => "ecn-brokers",
            KnownCategory::Stp => "stp-forex-brokers",
            KnownCategory::Mt4 => "mt4-brokers",
            KnownCategory::Mt5 => "mt5-brokers",
            KnownCategory::Beginners => "forex-brokers-beginners",
            KnownCategory::Islamic => "islamic-accounts",
            KnownCategory::MostRegulated => "most-regulated-forex-brokers",
        }
    }

    fn score(&self, broker: &BrokerSnapshot) -> f64 {
        let pick = |hit: bool, miss: f64| if hit { 10.0 } else { miss };
        match self {
            KnownCategory::Ecn => pick(broker.execution.ecn, 3.0),
            KnownCategory::Stp => pick(broker.execution.stp, 4.0),
            KnownCategory::Mt4 => pick(broker.platform.supports("mt4"), 2.0),
            KnownCategory::Mt5 => pick(broker.platform.supports("mt5"), 2.0),
            KnownCategory::Islamic => pick(broker.platform.islamic_accounts, 1.0),
            KnownCategory::Beginners => match broker.minimum_deposit {
                None => UNKNOWN_DEPOSIT_SCORE,
                Some(d) if d <= 0.0 => 10.0,
                Some(d) if d <= 50.0 => 8.5,
                Some(d) if d <= 200.0 => 7.0,
                Some(_) => 4.0,
            },
            KnownCategory::MostRegulated => regulation_score(broker).value(),
        }
    }
}

/// How well `broker` fits `category_slug`.
pub fn category_match_score(broker: &BrokerSnapshot, category_slug: Option<&str>) -> FactorScore {
    let score = match category_slug {
        None => NO_CATEGORY_SCORE,
        Some(slug) => KnownCategory::from_slug(slug)
            .map(|category| category.score(broker))
            .unwrap_or(UNKNOWN_CATEGORY_SCORE),
    };
    FactorScore::new(score)
}
