//! Brokerlist Cache - Data-serving cache layer
//!
//! A bounded in-process LRU store with TTL staleness marking, wrapped by a
//! [`CacheManager`] that implements stale-while-revalidate reads, tag and base
//! key invalidation, preloading, and write-through to an optional
//! [`DurableTier`].
//!
//! # Staleness
//!
//! An entry past its TTL is not deleted. The first read that observes it
//! flags it stale; with stale-while-revalidate the stale value is served at
//! once and refreshed in the background, at most one refresh per key.
//!
//! # Example
//!
//! ```ignore
//! let cache = CacheManager::new(CacheConfig::default());
//! let brokers = cache
//!     .fetch_with_cache(
//!         "brokers:all",
//!         move || async move { store.list_active_brokers().await },
//!         FetchOptions::new().with_tags(["brokers"]),
//!     )
//!     .await?;
//! ```

pub mod entry;
pub mod key;
pub mod lmdb_tier;
pub mod lru_store;
pub mod manager;
pub mod memory_tier;
pub mod revalidation;
pub mod traits;

pub use entry::{expires_at, CacheEntry, CacheRead, ReadSource};
pub use key::CacheKey;
pub use lmdb_tier::{LmdbDurableTier, LmdbTierError};
pub use lru_store::{LruStats, LruStore};
pub use manager::{
    CacheConfig, CacheManager, FetchOptions, DEFAULT_CAPACITY, DEFAULT_TTL, LONG_TTL, SHORT_TTL,
};
pub use memory_tier::InMemoryDurableTier;
pub use revalidation::RevalidationRegistry;
pub use traits::{CacheStats, DurableRow, DurableTier};
