//! LMDB-backed durable tier.
//!
//! Uses the heed crate (Rust bindings for LMDB) to keep long-lived cache
//! entries in a memory-mapped file so they survive process restarts.
//!
//! # Row format
//!
//! Keys are the encoded [`CacheKey`] bytes. Values are
//! `[expires_at millis: 8 bytes LE][json value]`.

use std::path::Path;

use async_trait::async_trait;
use brokerlist_core::{BrokerError, BrokerResult, StorageError, Timestamp};
use chrono::{DateTime, Utc};
use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions};
use serde_json::Value;
use tracing::debug;

use crate::key::CacheKey;
use crate::traits::{DurableRow, DurableTier};

const EXPIRY_PREFIX_LEN: usize = 8;

/// Error type for LMDB tier operations.
#[derive(Debug, thiserror::Error)]
pub enum LmdbTierError {
    /// Failed to open or create the LMDB environment.
    #[error("Failed to open LMDB environment: {0}")]
    EnvOpen(String),

    /// Failed to open the database within the environment.
    #[error("Failed to open database: {0}")]
    DbOpen(String),

    #[error("Transaction error: {0}")]
    Transaction(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<LmdbTierError> for BrokerError {
    fn from(e: LmdbTierError) -> Self {
        match e {
            LmdbTierError::Io(io) => StorageError::Io {
                reason: io.to_string(),
            }
            .into(),
            other => StorageError::TransactionFailed {
                reason: other.to_string(),
            }
            .into(),
        }
    }
}

fn txn_err(e: heed::Error) -> LmdbTierError {
    LmdbTierError::Transaction(e.to_string())
}

/// Durable tier stored in a single unnamed LMDB database.
pub struct LmdbDurableTier {
    env: Env,
    db: Database<Bytes, Bytes>,
}

impl LmdbDurableTier {
    /// Open (or create) the tier under `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or the LMDB
    /// environment or database cannot be opened.
    pub fn open<P: AsRef<Path>>(path: P, max_size_mb: usize) -> Result<Self, LmdbTierError> {
        std::fs::create_dir_all(&path)?;

        // SAFETY: the environment is opened once per path by this process and
        // the map is never resized while transactions are live.
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(max_size_mb.max(1) * 1024 * 1024)
                .max_dbs(1)
                .open(path.as_ref())
        }
        .map_err(|e| LmdbTierError::EnvOpen(e.to_string()))?;

        let mut wtxn = env.write_txn().map_err(txn_err)?;
        let db: Database<Bytes, Bytes> = env
            .create_database(&mut wtxn, None)
            .map_err(|e| LmdbTierError::DbOpen(e.to_string()))?;
        wtxn.commit().map_err(txn_err)?;

        debug!(path = %path.as_ref().display(), max_size_mb, "Opened LMDB durable tier");
        Ok(Self { env, db })
    }

    fn encode_row(value: &Value, expires_at: Timestamp) -> Result<Vec<u8>, LmdbTierError> {
        let json =
            serde_json::to_vec(value).map_err(|e| LmdbTierError::Serialization(e.to_string()))?;
        let mut bytes = Vec::with_capacity(EXPIRY_PREFIX_LEN + json.len());
        bytes.extend_from_slice(&expires_at.timestamp_millis().to_le_bytes());
        bytes.extend_from_slice(&json);
        Ok(bytes)
    }

    fn decode_row(bytes: &[u8]) -> Result<DurableRow, LmdbTierError> {
        if bytes.len() < EXPIRY_PREFIX_LEN {
            return Err(LmdbTierError::Deserialization("row too short".into()));
        }
        let millis: [u8; EXPIRY_PREFIX_LEN] = bytes[..EXPIRY_PREFIX_LEN]
            .try_into()
            .map_err(|_| LmdbTierError::Deserialization("invalid expiry".into()))?;
        let expires_at = DateTime::from_timestamp_millis(i64::from_le_bytes(millis))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        let value = serde_json::from_slice(&bytes[EXPIRY_PREFIX_LEN..])
            .map_err(|e| LmdbTierError::Deserialization(e.to_string()))?;
        Ok(DurableRow { value, expires_at })
    }

    /// Collect every key for which `wanted` holds.
    fn collect_keys(&self, wanted: impl Fn(&[u8]) -> bool) -> Result<Vec<Vec<u8>>, LmdbTierError> {
        let rtxn = self.env.read_txn().map_err(txn_err)?;
        let mut keys = Vec::new();
        for result in self.db.iter(&rtxn).map_err(txn_err)? {
            match result {
                Ok((key, _)) if wanted(key) => keys.push(key.to_vec()),
                Ok(_) => {}
                Err(_) => continue,
            }
        }
        Ok(keys)
    }

    fn delete_keys(&self, keys: &[Vec<u8>]) -> Result<u64, LmdbTierError> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut wtxn = self.env.write_txn().map_err(txn_err)?;
        let mut deleted = 0u64;
        for key in keys {
            if self.db.delete(&mut wtxn, key).map_err(txn_err)? {
                deleted += 1;
            }
        }
        wtxn.commit().map_err(txn_err)?;
        Ok(deleted)
    }

    /// Number of rows currently stored.
    pub fn len(&self) -> BrokerResult<u64> {
        let rtxn = self.env.read_txn().map_err(txn_err)?;
        Ok(self.db.len(&rtxn).map_err(txn_err)?)
    }

    pub fn is_empty(&self) -> BrokerResult<bool> {
        Ok(self.len()? == 0)
    }
}

#[async_trait]
impl DurableTier for LmdbDurableTier {
    async fn upsert(&self, key: &str, value: &Value, expires_at: Timestamp) -> BrokerResult<()> {
        let bytes = Self::encode_row(value, expires_at)?;
        let mut wtxn = self.env.write_txn().map_err(txn_err)?;
        self.db
            .put(&mut wtxn, key.as_bytes(), &bytes)
            .map_err(txn_err)?;
        wtxn.commit().map_err(txn_err)?;
        Ok(())
    }

    async fn get(&self, key: &str) -> BrokerResult<Option<DurableRow>> {
        let rtxn = self.env.read_txn().map_err(txn_err)?;
        match self.db.get(&rtxn, key.as_bytes()).map_err(txn_err)? {
            Some(bytes) => Ok(Some(Self::decode_row(bytes)?)),
            None => Ok(None),
        }
    }

    async fn delete(&self, key: &str) -> BrokerResult<bool> {
        let mut wtxn = self.env.write_txn().map_err(txn_err)?;
        let deleted = self.db.delete(&mut wtxn, key.as_bytes()).map_err(txn_err)?;
        wtxn.commit().map_err(txn_err)?;
        Ok(deleted)
    }

    async fn delete_by_key_prefix(&self, prefix: &str) -> BrokerResult<u64> {
        let prefix = prefix.as_bytes();
        let keys = self.collect_keys(|key| key.starts_with(prefix))?;
        Ok(self.delete_keys(&keys)?)
    }

    async fn delete_by_tag(&self, tag: &str) -> BrokerResult<u64> {
        let keys = self.collect_keys(|key| {
            std::str::from_utf8(key)
                .ok()
                .and_then(CacheKey::decode)
                .is_some_and(|k| k.has_tag(tag))
        })?;
        Ok(self.delete_keys(&keys)?)
    }

    fn name(&self) -> &'static str {
        "lmdb"
    }
}
