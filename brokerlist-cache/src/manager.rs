//! Stale-while-revalidate cache manager.
//!
//! Routes every `fetch_with_cache` call through the in-process LRU store and
//! decides, per call, whether to serve a fresh entry, serve a stale one while
//! refreshing it in the background, or await the producer. Long-lived values
//! are written through to an optional durable tier on a best-effort basis.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use brokerlist_core::{BrokerError, BrokerResult, SharedClock, StorageError, SystemClock, Timestamp};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, info, trace, warn};

use crate::entry::{expires_at, CacheEntry, CacheRead, ReadSource};
use crate::key::CacheKey;
use crate::lru_store::LruStore;
use crate::revalidation::RevalidationRegistry;
use crate::traits::{CacheStats, DurableTier};

/// Default entry lifetime: 24 hours.
pub const DEFAULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);
/// Short-lived entries: 5 minutes. Entries at or below this TTL stay in memory only.
pub const SHORT_TTL: Duration = Duration::from_secs(5 * 60);
/// Long-lived entries: 7 days.
pub const LONG_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);
/// Default LRU capacity.
pub const DEFAULT_CAPACITY: usize = 1000;

/// Configuration for the cache manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Maximum number of entries held in memory.
    pub capacity: usize,
    /// TTL applied when a call does not name one.
    pub default_ttl: Duration,
    /// Durable write threshold: only entries with a TTL above this reach the durable tier.
    pub short_ttl: Duration,
    /// TTL for rarely changing data.
    pub long_ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            default_ttl: DEFAULT_TTL,
            short_ttl: SHORT_TTL,
            long_ttl: LONG_TTL,
        }
    }
}

impl CacheConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    pub fn with_short_ttl(mut self, ttl: Duration) -> Self {
        self.short_ttl = ttl;
        self
    }

    pub fn with_long_ttl(mut self, ttl: Duration) -> Self {
        self.long_ttl = ttl;
        self
    }
}

/// Per-call options for [`CacheManager::fetch_with_cache`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOptions {
    /// Entry TTL; `None` uses the manager's default.
    pub ttl: Option<Duration>,
    pub stale_while_revalidate: bool,
    /// Skip the cache lookup and always await the producer.
    pub force_refresh: bool,
    pub tags: Vec<String>,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            ttl: None,
            stale_while_revalidate: true,
            force_refresh: false,
            tags: Vec::new(),
        }
    }
}

impl FetchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_stale_while_revalidate(mut self, enabled: bool) -> Self {
        self.stale_while_revalidate = enabled;
        self
    }

    pub fn force_refresh(mut self) -> Self {
        self.force_refresh = true;
        self
    }
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    stale_served: AtomicU64,
    fallbacks_served: AtomicU64,
    revalidations_started: AtomicU64,
    revalidations_coalesced: AtomicU64,
    revalidation_failures: AtomicU64,
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

/// Durable-tier cleanup queued after an invalidation.
#[derive(Debug, Clone)]
enum DurableDelete {
    Key(String),
    Prefix(String),
    Tag(String),
}

/// Cache manager over an LRU store and an optional durable tier.
///
/// Cheap to clone; clones share the same store, counters and revalidation
/// registry.
#[derive(Clone)]
pub struct CacheManager {
    store: Arc<LruStore<Arc<Value>>>,
    durable: Option<Arc<dyn DurableTier>>,
    revalidations: RevalidationRegistry,
    counters: Arc<Counters>,
    config: CacheConfig,
    clock: SharedClock,
}

impl std::fmt::Debug for CacheManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheManager")
            .field("config", &self.config)
            .field("durable", &self.durable.as_ref().map(|d| d.name()))
            .field("entries", &self.store.len())
            .finish()
    }
}

impl CacheManager {
    /// Memory-only manager on the system clock.
    pub fn new(config: CacheConfig) -> Self {
        Self::with_parts(config, Arc::new(SystemClock), None)
    }

    pub fn with_parts(
        config: CacheConfig,
        clock: SharedClock,
        durable: Option<Arc<dyn DurableTier>>,
    ) -> Self {
        Self {
            store: Arc::new(LruStore::with_clock(config.capacity, Arc::clone(&clock))),
            durable,
            revalidations: RevalidationRegistry::new(),
            counters: Arc::new(Counters::default()),
            config,
            clock,
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn clock(&self) -> &SharedClock {
        &self.clock
    }

    pub fn has_durable_tier(&self) -> bool {
        self.durable.is_some()
    }

    /// Fetch `key` through the cache, invoking `producer` on a miss.
    ///
    /// See [`CacheManager::fetch`] for the decision rules.
    pub async fn fetch_with_cache<T, F, Fut>(
        &self,
        key: &str,
        producer: F,
        options: FetchOptions,
    ) -> BrokerResult<T>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = BrokerResult<T>> + Send + 'static,
    {
        Ok(self.fetch(key, producer, options).await?.into_value())
    }

    /// Like [`CacheManager::fetch_with_cache`], also reporting where the value came from.
    ///
    /// 1. Fresh entry (and not `force_refresh`): served, producer not called.
    /// 2. Stale entry with `stale_while_revalidate`: the stale value is served
    ///    and the producer runs in the background.
    /// 3. Otherwise the producer is awaited. On failure an existing entry is
    ///    served if `stale_while_revalidate` is set; else the error surfaces
    ///    as an upstream error.
    pub async fn fetch<T, F, Fut>(
        &self,
        key: &str,
        producer: F,
        options: FetchOptions,
    ) -> BrokerResult<CacheRead<T>>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = BrokerResult<T>> + Send + 'static,
    {
        let ttl = options.ttl.unwrap_or(self.config.default_ttl);
        let cache_key = CacheKey::new(key, &options.tags);

        if !options.force_refresh {
            if let Some(entry) = self.store.get(&cache_key) {
                match decode::<T>(&cache_key, &entry) {
                    Some(value) if !entry.stale => {
                        bump(&self.counters.hits);
                        trace!(key = %cache_key, "Cache hit");
                        return Ok(CacheRead::new(value, ReadSource::Fresh, entry.inserted_at));
                    }
                    Some(value) if options.stale_while_revalidate => {
                        bump(&self.counters.stale_served);
                        debug!(
                            key = %cache_key,
                            age_secs = entry.age_at(self.clock.now()).as_secs(),
                            "Serving stale entry, revalidating in background"
                        );
                        self.revalidate(cache_key, producer, ttl);
                        return Ok(CacheRead::new(value, ReadSource::Stale, entry.inserted_at));
                    }
                    Some(_) => {
                        debug!(key = %cache_key, "Stale entry without revalidation, refetching");
                    }
                    None => {}
                }
            }
        }

        bump(&self.counters.misses);
        debug!(key = %cache_key, force_refresh = options.force_refresh, "Cache miss");

        match producer().await {
            Ok(value) => {
                let json = encode(&cache_key, &value);
                let cached_at = self.write(&cache_key, json, ttl).await;
                Ok(CacheRead::new(value, ReadSource::Produced, cached_at))
            }
            Err(err) => {
                if options.stale_while_revalidate {
                    let fallback = self
                        .store
                        .peek(&cache_key)
                        .and_then(|entry| decode::<T>(&cache_key, &entry).map(|v| (v, entry)));
                    if let Some((value, entry)) = fallback {
                        bump(&self.counters.fallbacks_served);
                        warn!(key = %cache_key, error = %err, "Producer failed, serving cached value");
                        return Ok(CacheRead::new(value, ReadSource::Fallback, entry.inserted_at));
                    }
                }
                warn!(key = %cache_key, error = %err, "Producer failed with no cached fallback");
                Err(upstream(&cache_key, err))
            }
        }
    }

    /// Run `producer` in the background and overwrite `key` on success.
    ///
    /// Coalesced: if a revalidation for `key` is already running the producer
    /// is dropped unused.
    fn revalidate<T, F, Fut>(&self, key: CacheKey, producer: F, ttl: Duration)
    where
        T: Serialize + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = BrokerResult<T>> + Send + 'static,
    {
        let manager = self.clone();
        let task_key = key.clone();
        let started = self.revalidations.spawn(key, async move {
            match producer().await {
                Ok(value) => {
                    let json = encode(&task_key, &value);
                    manager.write(&task_key, json, ttl).await;
                    debug!(key = %task_key, "Background revalidation complete");
                }
                Err(err) => {
                    bump(&manager.counters.revalidation_failures);
                    error!(key = %task_key, error = %err, "Background revalidation failed, keeping stale entry");
                }
            }
        });

        if started {
            bump(&self.counters.revalidations_started);
        } else {
            bump(&self.counters.revalidations_coalesced);
            trace!("Revalidation already in flight, coalesced");
        }
    }

    /// Store `json` under `key`, writing through to the durable tier when the
    /// TTL is long enough. Returns the insertion time.
    ///
    /// A value that failed to serialize is returned to the caller but not
    /// cached.
    async fn write(&self, key: &CacheKey, json: Option<Value>, ttl: Duration) -> Timestamp {
        let now = self.clock.now();
        let Some(json) = json else {
            return now;
        };

        let json = Arc::new(json);
        if let Some(evicted) = self.store.set(key.clone(), Arc::clone(&json), ttl) {
            trace!(key = %evicted, "Evicted least recently used entry");
        }

        if ttl > self.config.short_ttl {
            if let Some(durable) = &self.durable {
                if let Err(e) = durable.upsert(key.as_str(), &json, expires_at(now, ttl)).await {
                    warn!(key = %key, tier = durable.name(), error = %e, "Durable tier write failed");
                }
            }
        }
        now
    }

    /// Remove a key.
    ///
    /// A base key removes the untagged entry and every tagged variant; an
    /// encoded composite key (`base|tag:...`) removes exactly that entry.
    pub fn invalidate(&self, key: &str) -> bool {
        let cache_key = CacheKey::parse_lenient(key);
        let removed = if cache_key.has_tags() {
            let removed = self.store.delete(&cache_key);
            self.spawn_durable_cleanup(vec![DurableDelete::Key(cache_key.to_string())]);
            usize::from(removed)
        } else {
            let removed = self.store.invalidate_by_base(cache_key.base()).len();
            self.spawn_durable_cleanup(vec![
                DurableDelete::Key(cache_key.to_string()),
                DurableDelete::Prefix(cache_key.variant_prefix()),
            ]);
            removed
        };
        info!(key, removed, "Invalidated cache key");
        removed > 0
    }

    /// Remove every entry carrying `tag`. Returns the number removed from memory.
    pub fn invalidate_by_tag(&self, tag: &str) -> usize {
        let removed = self.store.invalidate_by_tag(tag).len();
        self.spawn_durable_cleanup(vec![DurableDelete::Tag(tag.to_string())]);
        info!(tag, removed, "Invalidated cache tag");
        removed
    }

    /// Drop every in-memory entry. The durable tier is left untouched.
    pub fn clear(&self) {
        self.store.clear();
        info!("Cleared in-memory cache");
    }

    pub fn stats(&self) -> CacheStats {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        CacheStats {
            hits: load(&self.counters.hits),
            misses: load(&self.counters.misses),
            stale_served: load(&self.counters.stale_served),
            fallbacks_served: load(&self.counters.fallbacks_served),
            revalidations_started: load(&self.counters.revalidations_started),
            revalidations_coalesced: load(&self.counters.revalidations_coalesced),
            revalidation_failures: load(&self.counters.revalidation_failures),
            pending_revalidations: self.revalidations.pending(),
            ..CacheStats::from_store(self.store.stats())
        }
    }

    /// Seed an entry without a producer. `None` uses the default TTL.
    pub async fn preload<T, I, S>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
        tags: I,
    ) -> BrokerResult<()>
    where
        T: Serialize + ?Sized,
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let cache_key = CacheKey::new(key, tags);
        let json = serde_json::to_value(value).map_err(|e| StorageError::Serialization {
            key: cache_key.to_string(),
            reason: e.to_string(),
        })?;
        let ttl = ttl.unwrap_or(self.config.default_ttl);
        self.write(&cache_key, Some(json), ttl).await;
        debug!(key = %cache_key, ttl_secs = ttl.as_secs(), "Preloaded cache entry");
        Ok(())
    }

    /// Fresh cached value for `key`, if any. Never calls a producer and never
    /// returns stale data.
    pub fn get_cached<T, I, S>(&self, key: &str, tags: I) -> Option<T>
    where
        T: DeserializeOwned,
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let cache_key = CacheKey::new(key, tags);
        let entry = self.store.get(&cache_key)?;
        if entry.stale {
            return None;
        }
        decode(&cache_key, &entry)
    }

    /// Wait for the background revalidation of (`key`, `tags`) to finish.
    pub async fn await_revalidation<I, S>(&self, key: &str, tags: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.revalidations.wait(&CacheKey::new(key, tags)).await;
    }

    /// Wait for every revalidation currently in flight.
    pub async fn await_all_revalidations(&self) {
        self.revalidations.wait_all().await;
    }

    pub fn pending_revalidations(&self) -> usize {
        self.revalidations.pending()
    }

    fn spawn_durable_cleanup(&self, deletes: Vec<DurableDelete>) {
        let Some(durable) = self.durable.clone() else {
            return;
        };
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!(tier = durable.name(), "No async runtime, skipping durable tier cleanup");
            return;
        };
        handle.spawn(async move {
            for delete in deletes {
                let result = match &delete {
                    DurableDelete::Key(key) => durable.delete(key).await.map(u64::from),
                    DurableDelete::Prefix(prefix) => durable.delete_by_key_prefix(prefix).await,
                    DurableDelete::Tag(tag) => durable.delete_by_tag(tag).await,
                };
                match result {
                    Ok(deleted) => trace!(?delete, deleted, "Durable tier cleanup"),
                    Err(e) => warn!(?delete, tier = durable.name(), error = %e, "Durable tier cleanup failed"),
                }
            }
        });
    }
}

fn encode<T: Serialize>(key: &CacheKey, value: &T) -> Option<Value> {
    match serde_json::to_value(value) {
        Ok(json) => Some(json),
        Err(e) => {
            warn!(key = %key, error = %e, "Value does not serialize, not caching");
            None
        }
    }
}

fn decode<T: DeserializeOwned>(key: &CacheKey, entry: &CacheEntry<Arc<Value>>) -> Option<T> {
    match T::deserialize(entry.data.as_ref()) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(key = %key, error = %e, "Cached value does not decode, treating as miss");
            None
        }
    }
}

/// Producer errors that already mean "unavailable" pass through; anything
/// else is reported as an upstream failure for this key.
fn upstream(key: &CacheKey, err: BrokerError) -> BrokerError {
    if err.is_unavailable() {
        err
    } else {
        BrokerError::producer_failed(key.base(), err)
    }
}
