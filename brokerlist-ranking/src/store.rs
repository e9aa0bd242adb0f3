//! Collaborator store traits and in-memory implementations.
//!
//! The broker and weight tables live in an external store. The ranking
//! engine only sees them through [`BrokerStore`] and [`WeightStore`].

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use brokerlist_core::{
    BrokerError, BrokerId, BrokerResult, CountryAvailability, RawBroker, UpstreamError, WeightRow,
};

// ============================================================================
// STORE TRAITS
// ============================================================================

/// Read access to broker rows.
#[async_trait]
pub trait BrokerStore: Send + Sync {
    /// All active brokers, best rated first.
    async fn list_active_brokers(&self) -> BrokerResult<Vec<RawBroker>>;

    /// Active brokers mapped to a category, in mapping order.
    ///
    /// `Ok(None)` means the category has no mapping at all.
    async fn list_brokers_for_category(
        &self,
        category_slug: &str,
    ) -> BrokerResult<Option<Vec<RawBroker>>>;

    /// Availability record for a broker in a country, if the store has one.
    async fn get_country_availability(
        &self,
        broker_id: BrokerId,
        country_slug: &str,
    ) -> BrokerResult<Option<CountryAvailability>>;
}

/// Read/write access to the ranking weight table.
#[async_trait]
pub trait WeightStore: Send + Sync {
    /// Rows currently marked active.
    async fn list_active_weights(&self) -> BrokerResult<Vec<WeightRow>>;

    /// Insert or replace rows by factor name.
    async fn upsert_weights(&self, rows: &[WeightRow]) -> BrokerResult<()>;
}

// ============================================================================
// IN-MEMORY BROKER STORE
// ============================================================================

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|e| e.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|e| e.into_inner())
}

fn broker_store_error(operation: &str) -> BrokerError {
    UpstreamError::BrokerStore {
        operation: operation.to_string(),
        reason: "store set to fail".to_string(),
    }
    .into()
}

/// In-memory broker store, used by tests and for seeded local runs.
///
/// All mutators take `&self` so a store shared behind an `Arc` can be
/// reconfigured mid-test.
#[derive(Debug, Default)]
pub struct InMemoryBrokerStore {
    brokers: RwLock<Vec<RawBroker>>,
    categories: RwLock<HashMap<String, Vec<BrokerId>>>,
    availability: RwLock<HashMap<(BrokerId, String), CountryAvailability>>,
    failing_availability: RwLock<HashSet<BrokerId>>,
    fail_listing: AtomicBool,
    fail_category_lookup: AtomicBool,
    list_calls: AtomicUsize,
    availability_calls: AtomicUsize,
}

impl InMemoryBrokerStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_brokers(brokers: impl IntoIterator<Item = RawBroker>) -> Self {
        let store = Self::new();
        for broker in brokers {
            store.add_broker(broker);
        }
        store
    }

    /// Add or replace a broker row by id.
    pub fn add_broker(&self, broker: RawBroker) {
        let mut brokers = write(&self.brokers);
        brokers.retain(|b| b.id != broker.id);
        brokers.push(broker);
    }

    /// Map a category slug to broker ids, in ranking order.
    pub fn map_category(&self, slug: &str, broker_ids: impl IntoIterator<Item = BrokerId>) {
        write(&self.categories).insert(slug.to_string(), broker_ids.into_iter().collect());
    }

    pub fn set_availability(
        &self,
        broker_id: BrokerId,
        country_slug: &str,
        availability: CountryAvailability,
    ) {
        write(&self.availability).insert((broker_id, country_slug.to_string()), availability);
    }

    pub fn set_fail_listing(&self, fail: bool) {
        self.fail_listing.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_category_lookup(&self, fail: bool) {
        self.fail_category_lookup.store(fail, Ordering::SeqCst);
    }

    /// Make availability lookups for one broker fail.
    pub fn fail_availability_for(&self, broker_id: BrokerId) {
        write(&self.failing_availability).insert(broker_id);
    }

    /// Number of `list_active_brokers` calls so far.
    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn availability_calls(&self) -> usize {
        self.availability_calls.load(Ordering::SeqCst)
    }

    fn is_active(broker: &RawBroker) -> bool {
        broker.is_active.unwrap_or(true)
    }
}

#[async_trait]
impl BrokerStore for InMemoryBrokerStore {
    async fn list_active_brokers(&self) -> BrokerResult<Vec<RawBroker>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_listing.load(Ordering::SeqCst) {
            return Err(broker_store_error("list_active_brokers"));
        }
        let mut active: Vec<RawBroker> = read(&self.brokers)
            .iter()
            .filter(|b| Self::is_active(b))
            .cloned()
            .collect();
        active.sort_by(|a, b| {
            let (ra, rb) = (a.overall_rating.unwrap_or(0.0), b.overall_rating.unwrap_or(0.0));
            rb.total_cmp(&ra)
        });
        Ok(active)
    }

    async fn list_brokers_for_category(
        &self,
        category_slug: &str,
    ) -> BrokerResult<Option<Vec<RawBroker>>> {
        if self.fail_category_lookup.load(Ordering::SeqCst) {
            return Err(broker_store_error("list_brokers_for_category"));
        }
        let categories = read(&self.categories);
        let Some(ids) = categories.get(category_slug) else {
            return Ok(None);
        };
        let brokers = read(&self.brokers);
        Ok(Some(
            ids.iter()
                .filter_map(|id| brokers.iter().find(|b| b.id == *id))
                .filter(|b| Self::is_active(b))
                .cloned()
                .collect(),
        ))
    }

    async fn get_country_availability(
        &self,
        broker_id: BrokerId,
        country_slug: &str,
    ) -> BrokerResult<Option<CountryAvailability>> {
        self.availability_calls.fetch_add(1, Ordering::SeqCst);
        if read(&self.failing_availability).contains(&broker_id) {
            return Err(broker_store_error("get_country_availability"));
        }
        Ok(read(&self.availability)
            .get(&(broker_id, country_slug.to_string()))
            .copied())
    }
}

// ============================================================================
// IN-MEMORY WEIGHT STORE
// ============================================================================

/// In-memory weight store.
#[derive(Debug, Default)]
pub struct InMemoryWeightStore {
    rows: RwLock<Vec<WeightRow>>,
    fail_list: AtomicBool,
    fail_upsert: AtomicBool,
    list_calls: AtomicUsize,
    upsert_calls: AtomicUsize,
}

impl InMemoryWeightStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rows(rows: impl IntoIterator<Item = WeightRow>) -> Self {
        let store = Self::new();
        *write(&store.rows) = rows.into_iter().collect();
        store
    }

    pub fn rows(&self) -> Vec<WeightRow> {
        read(&self.rows).clone()
    }

    pub fn set_fail_list(&self, fail: bool) {
        self.fail_list.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_upsert(&self, fail: bool) {
        self.fail_upsert.store(fail, Ordering::SeqCst);
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn upsert_calls(&self) -> usize {
        self.upsert_calls.load(Ordering::SeqCst)
    }

    fn error(operation: &str) -> BrokerError {
        UpstreamError::WeightStore {
            operation: operation.to_string(),
            reason: "store set to fail".to_string(),
        }
        .into()
    }
}

#[async_trait]
impl WeightStore for InMemoryWeightStore {
    async fn list_active_weights(&self) -> BrokerResult<Vec<WeightRow>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_list.load(Ordering::SeqCst) {
            return Err(Self::error("list_active_weights"));
        }
        Ok(self.rows())
    }

    async fn upsert_weights(&self, rows: &[WeightRow]) -> BrokerResult<()> {
        self.upsert_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_upsert.load(Ordering::SeqCst) {
            return Err(Self::error("upsert_weights"));
        }
        let mut stored = write(&self.rows);
        for row in rows {
            match stored.iter_mut().find(|r| r.factor == row.factor) {
                Some(existing) => existing.weight = row.weight,
                None => stored.push(row.clone()),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use brokerlist_core::RankingFactor;

    fn broker(id: BrokerId, rating: f64) -> RawBroker {
        RawBroker {
            id,
            name: Some(format!("Broker {id}")),
            overall_rating: Some(rating),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_active_brokers_sorted_by_rating() {
        let store = InMemoryBrokerStore::with_brokers([broker(1, 6.0), broker(2, 9.0)]);
        store.add_broker(RawBroker {
            is_active: Some(false),
            ..broker(3, 10.0)
        });

        let ids: Vec<_> = store
            .list_active_brokers()
            .await
            .expect("list")
            .iter()
            .map(|b| b.id)
            .collect();
        assert_eq!(ids, vec![2, 1]);
        assert_eq!(store.list_calls(), 1);
    }

    #[tokio::test]
    async fn test_unmapped_category_is_none() {
        let store = InMemoryBrokerStore::with_brokers([broker(1, 6.0), broker(2, 9.0)]);
        store.map_category("ecn-brokers", [1]);

        let mapped = store
            .list_brokers_for_category("ecn-brokers")
            .await
            .expect("lookup")
            .expect("mapped");
        assert_eq!(mapped.len(), 1);
        assert!(store
            .list_brokers_for_category("mt5-brokers")
            .await
            .expect("lookup")
            .is_none());
    }

    #[tokio::test]
    async fn test_weight_upsert_replaces_by_factor() {
        let store = InMemoryWeightStore::with_rows([WeightRow::new(RankingFactor::Regulation, 0.25)]);
        store
            .upsert_weights(&[
                WeightRow::new(RankingFactor::Regulation, 0.2),
                WeightRow::new(RankingFactor::UserReviews, 0.15),
            ])
            .await
            .expect("upsert");
        let rows = store.rows();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].weight, 0.2);
    }

    #[tokio::test]
    async fn test_failure_toggles() {
        let store = InMemoryWeightStore::new();
        store.set_fail_list(true);
        assert!(matches!(
            store.list_active_weights().await,
            Err(BrokerError::Upstream(UpstreamError::WeightStore { .. }))
        ));
    }
}
