//! Cache entries and read results.

use std::time::Duration;

use brokerlist_core::{elapsed_between, Timestamp};
use serde::Serialize;

/// One stored value with its insertion time and TTL.
///
/// `stale` flips to true the first time a read observes the entry past its
/// TTL. Expired entries are kept so they can still be served while a
/// revalidation runs.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry<V> {
    pub data: V,
    pub inserted_at: Timestamp,
    pub ttl: Duration,
    pub stale: bool,
}

impl<V> CacheEntry<V> {
    pub fn new(data: V, inserted_at: Timestamp, ttl: Duration) -> Self {
        Self {
            data,
            inserted_at,
            ttl,
            stale: false,
        }
    }

    pub fn age_at(&self, now: Timestamp) -> Duration {
        elapsed_between(self.inserted_at, now)
    }

    /// Whether the entry has outlived its TTL at `now`.
    pub fn is_expired_at(&self, now: Timestamp) -> bool {
        self.age_at(now) > self.ttl
    }

    pub fn expires_at(&self) -> Timestamp {
        expires_at(self.inserted_at, self.ttl)
    }
}

/// `inserted_at + ttl`, saturating at the maximum representable time.
pub fn expires_at(inserted_at: Timestamp, ttl: Duration) -> Timestamp {
    chrono::Duration::from_std(ttl)
        .ok()
        .and_then(|ttl| inserted_at.checked_add_signed(ttl))
        .unwrap_or(chrono::DateTime::<chrono::Utc>::MAX_UTC)
}

/// Where the value of a cache read came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadSource {
    /// Fresh cache hit.
    Fresh,
    /// Stale entry served while a background revalidation runs.
    Stale,
    /// Produced on this call and written to the cache.
    Produced,
    /// Producer failed; an existing entry was served instead.
    Fallback,
}

/// Result of a cache read, carrying where the value came from.
#[derive(Debug, Clone)]
pub struct CacheRead<T> {
    value: T,
    source: ReadSource,
    cached_at: Timestamp,
}

impl<T> CacheRead<T> {
    pub fn new(value: T, source: ReadSource, cached_at: Timestamp) -> Self {
        Self {
            value,
            source,
            cached_at,
        }
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn into_value(self) -> T {
        self.value
    }

    pub fn source(&self) -> ReadSource {
        self.source
    }

    /// When the returned value was written to the cache (or produced).
    pub fn cached_at(&self) -> Timestamp {
        self.cached_at
    }

    pub fn was_cache_hit(&self) -> bool {
        matches!(self.source, ReadSource::Fresh | ReadSource::Stale)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_expiry_is_strictly_after_ttl() {
        let start = Utc::now();
        let entry = CacheEntry::new(1u8, start, Duration::from_secs(60));
        assert!(!entry.is_expired_at(start + chrono::Duration::seconds(60)));
        assert!(entry.is_expired_at(start + chrono::Duration::seconds(61)));
    }

    #[test]
    fn test_expires_at() {
        let start = Utc::now();
        let entry = CacheEntry::new((), start, Duration::from_secs(300));
        assert_eq!(entry.expires_at(), start + chrono::Duration::seconds(300));
    }

    #[test]
    fn test_cache_hit_classification() {
        let now = Utc::now();
        assert!(CacheRead::new(1, ReadSource::Stale, now).was_cache_hit());
        assert!(!CacheRead::new(1, ReadSource::Produced, now).was_cache_hit());
        assert!(!CacheRead::new(1, ReadSource::Fallback, now).was_cache_hit());
    }
}
