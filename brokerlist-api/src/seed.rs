//! JSON seed data for the in-memory collaborator stores.
//!
//! Lets the server run without an external database: broker rows, category
//! mappings, country availability and weight rows are read from one file at
//! startup.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use brokerlist_core::{BrokerId, ConfigError, CountryAvailability, RawBroker, WeightRow};
use brokerlist_ranking::{InMemoryBrokerStore, InMemoryWeightStore};
use serde::{Deserialize, Serialize};

const SEED_PATH_FIELD: &str = "BROKERLIST_SEED_PATH";

/// One `(broker, country)` availability record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AvailabilityRow {
    pub broker_id: BrokerId,
    pub country: String,
    #[serde(flatten)]
    pub availability: CountryAvailability,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeedData {
    pub brokers: Vec<RawBroker>,
    /// Category slug to broker ids.
    pub categories: BTreeMap<String, Vec<BrokerId>>,
    pub availability: Vec<AvailabilityRow>,
    pub weights: Vec<WeightRow>,
}

impl SeedData {
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(raw).map_err(|e| ConfigError::InvalidValue {
            field: SEED_PATH_FIELD.to_string(),
            value: "<seed file>".to_string(),
            reason: e.to_string(),
        })
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::InvalidValue {
            field: SEED_PATH_FIELD.to_string(),
            value: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_json(&raw)
    }

    /// Populate fresh in-memory stores.
    pub fn into_stores(self) -> (Arc<InMemoryBrokerStore>, Arc<InMemoryWeightStore>) {
        let brokers = InMemoryBrokerStore::with_brokers(self.brokers);
        for (slug, ids) in self.categories {
            brokers.map_category(&slug, ids);
        }
        for row in self.availability {
            brokers.set_availability(row.broker_id, &row.country, row.availability);
        }
        let weights = InMemoryWeightStore::with_rows(self.weights);
        (Arc::new(brokers), Arc::new(weights))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use brokerlist_core::AvailabilityConfidence;
    use brokerlist_ranking::{BrokerStore, WeightStore};

    const SEED: &str = r#"{
        "brokers": [
            {"id": 1, "name": "Alpha", "is_active": true, "regulation_status": "FCA, ASIC"},
            {"id": 2, "name": "Beta", "is_active": true}
        ],
        "categories": {"ecn-brokers": [1]},
        "availability": [
            {"broker_id": 2, "country": "germany", "available": false, "confidence": "high"}
        ],
        "weights": [{"factor": "regulation", "weight": 0.3}]
    }"#;

    #[tokio::test]
    async fn test_seed_populates_stores() {
        let seed = SeedData::from_json(SEED).expect("valid seed");
        let (brokers, weights) = seed.into_stores();

        assert_eq!(brokers.list_active_brokers().await.expect("list").len(), 2);
        assert_eq!(
            brokers
                .list_brokers_for_category("ecn-brokers")
                .await
                .expect("lookup")
                .map(|rows| rows.len()),
            Some(1)
        );
        let availability = brokers
            .get_country_availability(2, "germany")
            .await
            .expect("lookup")
            .expect("record");
        assert_eq!(availability.available, Some(false));
        assert_eq!(availability.confidence, AvailabilityConfidence::High);
        assert_eq!(weights.list_active_weights().await.expect("rows").len(), 1);
    }

    #[test]
    fn test_missing_sections_default_to_empty() {
        let seed = SeedData::from_json("{}").expect("empty seed");
        assert_eq!(seed, SeedData::default());
    }

    #[test]
    fn test_malformed_seed_is_config_error() {
        let err = SeedData::from_json("[1, 2").expect_err("malformed");
        assert!(matches!(err, ConfigError::InvalidValue { ref field, .. } if field == SEED_PATH_FIELD));
    }

    #[test]
    fn test_missing_file_is_config_error() {
        assert!(SeedData::load(Path::new("/nonexistent/brokerlist-seed.json")).is_err());
    }
}
