//! Brokerlist Ranking - Weighted multi-factor broker ranking
//!
//! Scores every candidate broker on seven weighted factors, lifts the total by
//! a category fit bonus and returns the brokers best first. Weights come from
//! an external [`WeightStore`] through a cached [`WeightsAdapter`];
//! [`ListingService`] caches whole ranking pages.

pub mod category;
pub mod engine;
pub mod listing;
pub mod scorers;
pub mod store;
pub mod weights;

pub use category::{category_match_score, KnownCategory};
pub use engine::{RankingEngine, RankingOptions, DEFAULT_RANKING_LIMIT};
pub use listing::{
    listing_key, listing_tags, ListingService, BROKERS_TAG, CATEGORIES_TAG, COUNTRIES_TAG,
    RANKINGS_TAG,
};
pub use scorers::{
    country_score, execution_score, fees_score, platform_score, regulation_score, review_score,
    score_breakdown, CountryLookup,
};
pub use store::{BrokerStore, InMemoryBrokerStore, InMemoryWeightStore, WeightStore};
pub use weights::{WeightsAdapter, DEFAULT_WEIGHTS_REFRESH, WEIGHTS_CACHE_KEY, WEIGHTS_CACHE_TAG};
