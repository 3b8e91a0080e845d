//! Shared (cross-process) cache tier contract.
//!
//! The shared tier is an external networked key-value store with a minimal
//! key/value/TTL contract; reads are eventually consistent and writes are
//! best-effort. Records carry their original lifetime boundaries so a
//! promotion into another process's local tier never extends an entry's
//! life. Which backend is in play is a construction-time decision modelled
//! by [`TierTopology`], not a runtime null-check.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A serialized cache entry as stored in the shared tier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharedRecord {
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub stale_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Errors a shared tier backend can surface. The tiered cache logs and
/// counts these; they are never propagated to cache callers.
#[derive(Debug, thiserror::Error)]
pub enum SharedTierError {
    #[error("shared tier unavailable: {0}")]
    Unavailable(String),

    #[error("shared tier payload could not be decoded: {0}")]
    Codec(String),
}

/// Minimal key/value/TTL contract for a shared tier backend.
///
/// Backends derive their own expiry from `expires_at` on the record; the
/// cache does not prescribe a persistence format beyond this.
#[async_trait]
pub trait SharedTier: Send + Sync + std::fmt::Debug {
    async fn load(&self, key: &str) -> Result<Option<SharedRecord>, SharedTierError>;

    async fn store(&self, key: &str, record: SharedRecord) -> Result<(), SharedTierError>;

    /// Returns true iff the key was present
    async fn remove(&self, key: &str) -> Result<bool, SharedTierError>;

    /// Remove every record whose key starts with `prefix`, returning the count
    async fn purge_prefix(&self, prefix: &str) -> Result<u64, SharedTierError>;
}

/// Storage backend chosen at construction time
#[derive(Debug, Clone)]
pub enum TierTopology {
    /// No shared tier configured; the cache serves from the local tier only
    LocalOnly,
    /// Local tier backed by a shared cross-process store
    LocalPlusShared(Arc<dyn SharedTier>),
}

impl TierTopology {
    pub fn shared(&self) -> Option<&Arc<dyn SharedTier>> {
        match self {
            TierTopology::LocalOnly => None,
            TierTopology::LocalPlusShared(tier) => Some(tier),
        }
    }
}

/// Process-local [`SharedTier`] implementation.
///
/// Backs tests and single-instance deployments where no external store is
/// available but the two-tier read path should still be exercised.
#[derive(Debug, Default)]
pub struct InMemorySharedTier {
    records: DashMap<String, SharedRecord>,
}

impl InMemorySharedTier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl SharedTier for InMemorySharedTier {
    async fn load(&self, key: &str) -> Result<Option<SharedRecord>, SharedTierError> {
        match self.records.get(key) {
            Some(record) if record.expires_at > Utc::now() => Ok(Some(record.clone())),
            Some(_) => {
                drop(self.records.remove(key));
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn store(&self, key: &str, record: SharedRecord) -> Result<(), SharedTierError> {
        self.records.insert(key.to_string(), record);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<bool, SharedTierError> {
        Ok(self.records.remove(key).is_some())
    }

    async fn purge_prefix(&self, prefix: &str) -> Result<u64, SharedTierError> {
        let matching: Vec<String> = self
            .records
            .iter()
            .filter(|entry| entry.key().starts_with(prefix))
            .map(|entry| entry.key().clone())
            .collect();

        let mut removed = 0u64;
        for key in matching {
            if self.records.remove(&key).is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn record(value: &str, ttl: Duration) -> SharedRecord {
        let now = Utc::now();
        let ttl = chrono::Duration::from_std(ttl).unwrap();
        SharedRecord {
            payload: serde_json::json!(value),
            created_at: now,
            stale_at: now + (ttl * 4 / 5),
            expires_at: now + ttl,
        }
    }

    #[tokio::test]
    async fn store_then_load_round_trips() {
        let tier = InMemorySharedTier::new();
        tier.store("acme:doc:k", record("v", Duration::from_secs(60)))
            .await
            .unwrap();

        let loaded = tier.load("acme:doc:k").await.unwrap().unwrap();
        assert_eq!(loaded.payload, serde_json::json!("v"));
    }

    #[tokio::test]
    async fn expired_records_read_as_absent() {
        let tier = InMemorySharedTier::new();
        tier.store("k", record("v", Duration::ZERO)).await.unwrap();

        assert!(tier.load("k").await.unwrap().is_none());
        assert!(tier.is_empty());
    }

    #[tokio::test]
    async fn purge_prefix_respects_tenant_boundaries() {
        let tier = InMemorySharedTier::new();
        tier.store("acme:doc:a", record("1", Duration::from_secs(60)))
            .await
            .unwrap();
        tier.store("acme:doc:b", record("2", Duration::from_secs(60)))
            .await
            .unwrap();
        tier.store("globex:doc:a", record("3", Duration::from_secs(60)))
            .await
            .unwrap();

        assert_eq!(tier.purge_prefix("acme:doc:").await.unwrap(), 2);
        assert!(tier.load("globex:doc:a").await.unwrap().is_some());
    }
}
