//! Error types for brokerlist operations

use thiserror::Error;

use crate::BrokerId;

/// Validation errors.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ValidationError {
    #[error("Ranking weights sum to {sum:.4}, which exceeds 1.0")]
    WeightSumExceeded { sum: f64 },

    #[error("Invalid weight for {factor}: {reason}")]
    InvalidWeight { factor: String, reason: String },

    #[error("Unknown ranking factor: {name}")]
    UnknownFactor { name: String },

    #[error("Required field missing: {field}")]
    RequiredFieldMissing { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

/// A collaborator fetch failed and no usable stale or default value exists.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum UpstreamError {
    #[error("Producer for cache key {key} failed: {reason}")]
    ProducerFailed { key: String, reason: String },

    #[error("Broker store {operation} failed: {reason}")]
    BrokerStore { operation: String, reason: String },

    #[error("Weight store {operation} failed: {reason}")]
    WeightStore { operation: String, reason: String },
}

/// Failure to score a single broker. Always recovered inside the ranking
/// call; the broker is dropped from the result.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PartialScoringError {
    #[error("Country availability lookup for broker {broker_id} in {country} failed: {reason}")]
    AvailabilityLookup {
        broker_id: BrokerId,
        country: String,
        reason: String,
    },
}

/// Ranking call failed as a whole.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RankingError {
    #[error("Failed to enumerate candidate brokers for {category}: {reason}")]
    CandidateEnumeration { category: String, reason: String },
}

/// Storage layer errors (durable cache tier, in-process locks).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Transaction failed: {reason}")]
    TransactionFailed { reason: String },

    #[error("Serialization failed for {key}: {reason}")]
    Serialization { key: String, reason: String },

    #[error("Storage lock poisoned")]
    LockPoisoned,

    #[error("I/O error: {reason}")]
    Io { reason: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Master error type for all brokerlist errors.
#[derive(Debug, Clone, Error)]
pub enum BrokerError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Upstream error: {0}")]
    Upstream(#[from] UpstreamError),

    #[error("Scoring error: {0}")]
    PartialScoring(#[from] PartialScoringError),

    #[error("Ranking error: {0}")]
    Ranking(#[from] RankingError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

impl BrokerError {
    /// Convenience constructor for producer failures inside cache calls.
    pub fn producer_failed(key: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        BrokerError::Upstream(UpstreamError::ProducerFailed {
            key: key.into(),
            reason: reason.to_string(),
        })
    }

    /// Whether the error should be shown to end users as "unavailable, try again".
    pub fn is_unavailable(&self) -> bool {
        matches!(self, BrokerError::Upstream(_) | BrokerError::Ranking(_))
    }
}

/// Result type alias for brokerlist operations.
pub type BrokerResult<T> = Result<T, BrokerError>;

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weight_sum_display() {
        let err = ValidationError::WeightSumExceeded { sum: 1.2 };
        let msg = format!("{}", err);
        assert!(msg.contains("1.2000"));
        assert!(msg.contains("exceeds 1.0"));
    }

    #[test]
    fn test_partial_scoring_display() {
        let err = PartialScoringError::AvailabilityLookup {
            broker_id: 42,
            country: "germany".to_string(),
            reason: "timeout".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("42"));
        assert!(msg.contains("germany"));
    }

    #[test]
    fn test_broker_error_from_validation() {
        let err: BrokerError = ValidationError::UnknownFactor {
            name: "spreads".to_string(),
        }
        .into();
        assert!(matches!(err, BrokerError::Validation(_)));
        assert!(!err.is_unavailable());
    }

    #[test]
    fn test_unavailable_classification() {
        let upstream = BrokerError::producer_failed("brokers:all", "connection refused");
        assert!(upstream.is_unavailable());
        assert!(format!("{}", upstream).contains("brokers:all"));

        let ranking: BrokerError = RankingError::CandidateEnumeration {
            category: "all".to_string(),
            reason: "store down".to_string(),
        }
        .into();
        assert!(ranking.is_unavailable());

        let storage: BrokerError = StorageError::LockPoisoned.into();
        assert!(!storage.is_unavailable());
    }
}
