//! Background revalidation tracking.
//!
//! At most one revalidation per cache key is in flight at a time. A second
//! request for the same key while one runs is coalesced into the running one.
//! Callers that need to observe completion (tests, warmup) can await it.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;

use crate::key::CacheKey;

type InFlight = HashMap<CacheKey, watch::Receiver<bool>>;

/// Registry of in-flight background revalidations, keyed by cache key.
#[derive(Debug, Clone, Default)]
pub struct RevalidationRegistry {
    in_flight: Arc<Mutex<InFlight>>,
}

/// Removes the key from the registry when the task ends, including on panic.
struct InFlightGuard {
    in_flight: Arc<Mutex<InFlight>>,
    key: CacheKey,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        lock(&self.in_flight).remove(&self.key);
    }
}

fn lock(in_flight: &Mutex<InFlight>) -> MutexGuard<'_, InFlight> {
    in_flight.lock().unwrap_or_else(PoisonError::into_inner)
}

impl RevalidationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn `task` for `key` unless a revalidation for it is already running.
    ///
    /// Returns `false` when the request was coalesced into a running task.
    /// Must be called from within a Tokio runtime.
    pub fn spawn<F>(&self, key: CacheKey, task: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let (done_tx, done_rx) = watch::channel(false);
        {
            let mut in_flight = lock(&self.in_flight);
            if in_flight.contains_key(&key) {
                return false;
            }
            in_flight.insert(key.clone(), done_rx);
        }

        let guard = InFlightGuard {
            in_flight: Arc::clone(&self.in_flight),
            key,
        };
        tokio::spawn(async move {
            task.await;
            drop(guard);
            let _ = done_tx.send(true);
        });
        true
    }

    pub fn is_in_flight(&self, key: &CacheKey) -> bool {
        lock(&self.in_flight).contains_key(key)
    }

    pub fn pending(&self) -> usize {
        lock(&self.in_flight).len()
    }

    /// Wait for the revalidation of `key` to finish. Returns immediately if
    /// none is running.
    pub async fn wait(&self, key: &CacheKey) {
        let receiver = lock(&self.in_flight).get(key).cloned();
        if let Some(mut receiver) = receiver {
            // A dropped sender means the task panicked; either way it is over.
            let _ = receiver.wait_for(|done| *done).await;
        }
    }

    /// Wait for every revalidation running at the time of the call.
    pub async fn wait_all(&self) {
        let receivers: Vec<_> = lock(&self.in_flight).values().cloned().collect();
        for mut receiver in receivers {
            let _ = receiver.wait_for(|done| *done).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::Notify;

    #[tokio::test]
    async fn test_second_request_is_coalesced() {
        let registry = RevalidationRegistry::new();
        let key = CacheKey::untagged("brokers:all");
        let release = Arc::new(Notify::new());
        let runs = Arc::new(AtomicUsize::new(0));

        let (r, n) = (Arc::clone(&runs), Arc::clone(&release));
        assert!(registry.spawn(key.clone(), async move {
            n.notified().await;
            r.fetch_add(1, Ordering::SeqCst);
        }));

        let r = Arc::clone(&runs);
        assert!(!registry.spawn(key.clone(), async move {
            r.fetch_add(1, Ordering::SeqCst);
        }));
        assert!(registry.is_in_flight(&key));
        assert_eq!(registry.pending(), 1);

        release.notify_one();
        registry.wait(&key).await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert!(!registry.is_in_flight(&key));
    }

    #[tokio::test]
    async fn test_wait_without_task_returns() {
        let registry = RevalidationRegistry::new();
        tokio::time::timeout(
            Duration::from_secs(1),
            registry.wait(&CacheKey::untagged("missing")),
        )
        .await
        .expect("wait on an idle key returns immediately");
    }

    #[tokio::test]
    async fn test_panicking_task_releases_key() {
        let registry = RevalidationRegistry::new();
        let key = CacheKey::untagged("boom");
        registry.spawn(key.clone(), async {
            panic!("producer exploded");
        });
        registry.wait(&key).await;
        assert!(!registry.is_in_flight(&key));
        assert!(registry.spawn(key.clone(), async {}));
        registry.wait_all().await;
    }
}
