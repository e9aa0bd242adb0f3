//! Bounded in-process LRU store with TTL staleness marking.
//!
//! Entries live in an [`lru::LruCache`] guarded by a single mutex, together
//! with two secondary indexes (tag -> keys, base -> keys) so that tag and
//! base invalidation never scan the whole store. Every mutation updates the
//! primary map and both indexes under the same lock.

use std::collections::{HashMap, HashSet};
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use brokerlist_core::{SharedClock, SystemClock};
use lru::LruCache;
use serde::Serialize;

use crate::entry::CacheEntry;
use crate::key::CacheKey;

/// Point-in-time counts for the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LruStats {
    /// Entries currently held.
    pub total: usize,
    /// Entries within their TTL.
    pub fresh: usize,
    /// Entries already flagged stale by a read.
    pub stale: usize,
    /// Entries past their TTL that no read has flagged yet.
    pub expired: usize,
    /// Entries dropped to make room since the store was created.
    pub evicted: u64,
    pub capacity: usize,
}

struct StoreInner<V> {
    entries: LruCache<CacheKey, CacheEntry<V>>,
    by_tag: HashMap<String, HashSet<CacheKey>>,
    by_base: HashMap<String, HashSet<CacheKey>>,
    evicted: u64,
}

impl<V> StoreInner<V> {
    fn index(&mut self, key: &CacheKey) {
        self.by_base
            .entry(key.base().to_string())
            .or_default()
            .insert(key.clone());
        for tag in key.tags() {
            self.by_tag
                .entry(tag.clone())
                .or_default()
                .insert(key.clone());
        }
    }

    fn unindex(&mut self, key: &CacheKey) {
        if let Some(keys) = self.by_base.get_mut(key.base()) {
            keys.remove(key);
            if keys.is_empty() {
                self.by_base.remove(key.base());
            }
        }
        for tag in key.tags() {
            if let Some(keys) = self.by_tag.get_mut(tag) {
                keys.remove(key);
                if keys.is_empty() {
                    self.by_tag.remove(tag);
                }
            }
        }
    }

    fn remove(&mut self, key: &CacheKey) -> bool {
        match self.entries.pop(key) {
            Some(_) => {
                self.unindex(key);
                true
            }
            None => false,
        }
    }

    fn remove_all(&mut self, keys: impl IntoIterator<Item = CacheKey>) -> Vec<CacheKey> {
        keys.into_iter().filter(|k| self.remove(k)).collect()
    }
}

/// Bounded LRU map from [`CacheKey`] to [`CacheEntry`].
pub struct LruStore<V> {
    inner: Mutex<StoreInner<V>>,
    capacity: NonZeroUsize,
    clock: SharedClock,
}

impl<V: Clone> LruStore<V> {
    /// Create a store holding at most `capacity` entries (at least one).
    pub fn new(capacity: usize) -> Self {
        Self::with_clock(capacity, Arc::new(SystemClock))
    }

    pub fn with_clock(capacity: usize, clock: SharedClock) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(StoreInner {
                entries: LruCache::new(capacity),
                by_tag: HashMap::new(),
                by_base: HashMap::new(),
                evicted: 0,
            }),
            capacity,
            clock,
        }
    }

    // The critical sections below never leave the indexes half-updated on
    // panic, so a poisoned lock is safe to keep using.
    fn lock(&self) -> MutexGuard<'_, StoreInner<V>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Read an entry, refreshing its recency.
    ///
    /// An entry past its TTL is flagged stale in place and still returned.
    pub fn get(&self, key: &CacheKey) -> Option<CacheEntry<V>> {
        let now = self.clock.now();
        let mut inner = self.lock();
        let entry = inner.entries.get_mut(key)?;
        if !entry.stale && entry.is_expired_at(now) {
            entry.stale = true;
        }
        Some(entry.clone())
    }

    /// Read an entry without touching recency or the stale flag.
    pub fn peek(&self, key: &CacheKey) -> Option<CacheEntry<V>> {
        self.lock().entries.peek(key).cloned()
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.lock().entries.contains(key)
    }

    /// Insert or replace an entry, making it most recently used.
    ///
    /// Returns the key evicted to make room, if any.
    pub fn set(&self, key: CacheKey, data: V, ttl: Duration) -> Option<CacheKey> {
        let entry = CacheEntry::new(data, self.clock.now(), ttl);
        let mut inner = self.lock();

        if inner.entries.contains(&key) {
            inner.entries.put(key, entry);
            return None;
        }

        let evicted = inner.entries.push(key.clone(), entry).map(|(k, _)| k);
        if let Some(old) = &evicted {
            inner.unindex(old);
            inner.evicted += 1;
        }
        inner.index(&key);
        evicted
    }

    /// Remove one exact key.
    pub fn delete(&self, key: &CacheKey) -> bool {
        self.lock().remove(key)
    }

    /// Remove every entry carrying `tag`. Returns the removed keys.
    pub fn invalidate_by_tag(&self, tag: &str) -> Vec<CacheKey> {
        let mut inner = self.lock();
        let keys = inner.by_tag.get(tag).cloned().unwrap_or_default();
        inner.remove_all(keys)
    }

    /// Remove every entry with the given base key, tagged or not.
    pub fn invalidate_by_base(&self, base: &str) -> Vec<CacheKey> {
        let mut inner = self.lock();
        let keys = inner.by_base.get(base).cloned().unwrap_or_default();
        inner.remove_all(keys)
    }

    /// Drop every entry. The eviction counter is kept.
    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.entries.clear();
        inner.by_tag.clear();
        inner.by_base.clear();
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity.get()
    }

    /// Keys from most to least recently used.
    pub fn keys(&self) -> Vec<CacheKey> {
        self.lock().entries.iter().map(|(k, _)| k.clone()).collect()
    }

    pub fn stats(&self) -> LruStats {
        let now = self.clock.now();
        let inner = self.lock();
        let mut stats = LruStats {
            total: inner.entries.len(),
            evicted: inner.evicted,
            capacity: self.capacity.get(),
            ..LruStats::default()
        };
        for (_, entry) in inner.entries.iter() {
            if entry.stale {
                stats.stale += 1;
            } else if entry.is_expired_at(now) {
                stats.expired += 1;
            } else {
                stats.fresh += 1;
            }
        }
        stats
    }
}
