//! Durable tier trait and cache statistics.

use async_trait::async_trait;
use brokerlist_core::{BrokerResult, Timestamp};
use serde::Serialize;
use serde_json::Value;

use crate::lru_store::LruStats;

/// A row held by a durable tier.
#[derive(Debug, Clone, PartialEq)]
pub struct DurableRow {
    pub value: Value,
    pub expires_at: Timestamp,
}

/// Persistent second tier for long-lived cache entries.
///
/// Writes are best-effort from the cache manager's point of view: a failing
/// tier is logged and never fails a read. The manager only writes through,
/// it never reads from this tier on the hot path.
#[async_trait]
pub trait DurableTier: Send + Sync {
    /// Insert or replace the row for `key`.
    async fn upsert(&self, key: &str, value: &Value, expires_at: Timestamp) -> BrokerResult<()>;

    /// Read the row for `key`, if present.
    async fn get(&self, key: &str) -> BrokerResult<Option<DurableRow>>;

    /// Delete the row for one exact key.
    async fn delete(&self, key: &str) -> BrokerResult<bool>;

    /// Delete every row whose key starts with `prefix`. Returns the count.
    async fn delete_by_key_prefix(&self, prefix: &str) -> BrokerResult<u64>;

    /// Delete every row whose key carries `tag`. Returns the count.
    async fn delete_by_tag(&self, tag: &str) -> BrokerResult<u64>;

    /// Human readable name for logs.
    fn name(&self) -> &'static str;
}

/// Combined statistics for the cache manager.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub total: usize,
    pub fresh: usize,
    pub stale: usize,
    pub expired: usize,
    pub evicted: u64,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
    pub stale_served: u64,
    pub fallbacks_served: u64,
    pub revalidations_started: u64,
    pub revalidations_coalesced: u64,
    pub revalidation_failures: u64,
    pub pending_revalidations: usize,
}

impl CacheStats {
    pub fn from_store(store: LruStats) -> Self {
        Self {
            total: store.total,
            fresh: store.fresh,
            stale: store.stale,
            expired: store.expired,
            evicted: store.evicted,
            capacity: store.capacity,
            ..Self::default()
        }
    }

    /// Fraction of reads served from memory (fresh or stale).
    pub fn hit_rate(&self) -> f64 {
        let served = self.hits + self.stale_served;
        let total = served + self.misses;
        if total == 0 {
            0.0
        } else {
            served as f64 / total as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_rate() {
        let stats = CacheStats {
            hits: 6,
            stale_served: 2,
            misses: 2,
            ..CacheStats::default()
        };
        assert!((stats.hit_rate() - 0.8).abs() < f64::EPSILON);
        assert_eq!(CacheStats::default().hit_rate(), 0.0);
    }

    #[test]
    fn test_stats_serialize_camel_case() {
        let json = serde_json::to_value(CacheStats::default()).expect("serializes");
        assert!(json.get("staleServed").is_some());
        assert!(json.get("pendingRevalidations").is_some());
    }
}
