//! In-memory durable tier for tests and single-process deployments.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;
use brokerlist_core::{BrokerResult, StorageError, Timestamp};
use serde_json::Value;

use crate::key::CacheKey;
use crate::traits::{DurableRow, DurableTier};

/// Durable tier backed by a `BTreeMap`. Can be switched into a failing mode
/// to exercise best-effort write handling.
#[derive(Debug, Default)]
pub struct InMemoryDurableTier {
    rows: RwLock<BTreeMap<String, DurableRow>>,
    failing: AtomicBool,
}

impl InMemoryDurableTier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent operation fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.rows.read().map(|rows| rows.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn keys(&self) -> Vec<String> {
        self.rows
            .read()
            .map(|rows| rows.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn check(&self) -> BrokerResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StorageError::TransactionFailed {
                reason: "in-memory tier set to fail".to_string(),
            }
            .into());
        }
        Ok(())
    }

    fn retain(&self, mut keep: impl FnMut(&str) -> bool) -> BrokerResult<u64> {
        self.check()?;
        let mut rows = self.rows.write().map_err(|_| StorageError::LockPoisoned)?;
        let before = rows.len();
        rows.retain(|k, _| keep(k));
        Ok((before - rows.len()) as u64)
    }
}

#[async_trait]
impl DurableTier for InMemoryDurableTier {
    async fn upsert(&self, key: &str, value: &Value, expires_at: Timestamp) -> BrokerResult<()> {
        self.check()?;
        let mut rows = self.rows.write().map_err(|_| StorageError::LockPoisoned)?;
        rows.insert(
            key.to_string(),
            DurableRow {
                value: value.clone(),
                expires_at,
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> BrokerResult<Option<DurableRow>> {
        self.check()?;
        let rows = self.rows.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(rows.get(key).cloned())
    }

    async fn delete(&self, key: &str) -> BrokerResult<bool> {
        self.check()?;
        let mut rows = self.rows.write().map_err(|_| StorageError::LockPoisoned)?;
        Ok(rows.remove(key).is_some())
    }

    async fn delete_by_key_prefix(&self, prefix: &str) -> BrokerResult<u64> {
        self.retain(|k| !k.starts_with(prefix))
    }

    async fn delete_by_tag(&self, tag: &str) -> BrokerResult<u64> {
        self.retain(|k| !CacheKey::decode(k).is_some_and(|key| key.has_tag(tag)))
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    #[tokio::test]
    async fn test_upsert_get_delete() {
        let tier = InMemoryDurableTier::new();
        let expires = Utc::now();
        tier.upsert("brokers:all", &json!([1, 2]), expires)
            .await
            .expect("upsert");

        let row = tier.get("brokers:all").await.expect("get").expect("row");
        assert_eq!(row.value, json!([1, 2]));
        assert_eq!(row.expires_at, expires);

        assert!(tier.delete("brokers:all").await.expect("delete"));
        assert!(!tier.delete("brokers:all").await.expect("delete"));
        assert!(tier.is_empty());
    }

    #[tokio::test]
    async fn test_delete_by_tag_matches_whole_tags() {
        let tier = InMemoryDurableTier::new();
        let now = Utc::now();
        for key in [
            CacheKey::new("a", ["brokers"]),
            CacheKey::new("b", ["brokers", "rankings"]),
            CacheKey::new("c", ["brokers-eu"]),
        ] {
            tier.upsert(key.as_str(), &json!(null), now)
                .await
                .expect("upsert");
        }

        assert_eq!(tier.delete_by_tag("brokers").await.expect("delete"), 2);
        assert_eq!(tier.keys(), vec!["c|tag:brokers-eu".to_string()]);
    }

    #[tokio::test]
    async fn test_failing_mode() {
        let tier = InMemoryDurableTier::new();
        tier.set_failing(true);
        let err = tier
            .upsert("k", &json!(1), Utc::now())
            .await
            .expect_err("tier is failing");
        assert!(err.to_string().contains("set to fail"));
        tier.set_failing(false);
        assert!(tier.upsert("k", &json!(1), Utc::now()).await.is_ok());
    }
}
