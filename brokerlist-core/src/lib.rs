//! Brokerlist Core - Domain Types
//!
//! Pure data structures shared by the cache, ranking and API crates. All
//! other crates depend on this one; it holds no I/O.

pub mod broker;
pub mod clock;
pub mod error;
pub mod score;
pub mod weights;

use chrono::{DateTime, Utc};

/// Broker identifier as assigned by the broker store.
pub type BrokerId = i64;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

pub use broker::{
    AvailabilityConfidence, BrokerSnapshot, CountryAvailability, ExecutionModel, FeeStructure,
    PlatformFeatures, RawBroker, SpreadType, DEFAULT_REVIEW_PROXY,
};
pub use clock::{elapsed_between, Clock, ManualClock, SharedClock, SystemClock};
pub use error::{
    BrokerError, BrokerResult, ConfigError, PartialScoringError, RankingError, StorageError,
    UpstreamError, ValidationError,
};
pub use score::{
    apply_category_bonus, round2, BrokerScore, FactorScore, ScoreBreakdown, MAX_FACTOR_SCORE,
    WITHDRAWAL_RELIABILITY_SCORE,
};
pub use weights::{
    PartialWeights, RankingFactor, RankingWeights, WeightRow, WEIGHT_SUM_TOLERANCE,
};
