//! Two-tier cache with stale-while-revalidate scheduling.
//!
//! Read path: local tier, then shared tier (promoting on hit), applying the
//! freshness rules from [`crate::cache::entry`]. A stale-but-usable hit with
//! SWR enabled is served immediately while a single background refresh is
//! scheduled; a true miss awaits the caller-supplied fetch function. The
//! cache itself never retries - callers wrap their fetch function with the
//! resilience layer before handing it over.

use crate::cache::entry::{CacheEntry, Freshness};
use crate::cache::key;
use crate::cache::local::LocalTier;
use crate::cache::shared::{SharedRecord, TierTopology};
use crate::config::{CacheKind, CacheSettings};
use chrono::Utc;
use dashmap::DashSet;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Per-call options for [`TieredCache::get_or_fetch`]
#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    /// Selects the default TTL pair from configuration
    pub kind: CacheKind,

    /// Override the configured stale-while-revalidate default
    pub stale_while_revalidate: Option<bool>,

    /// Override the local-tier TTL for this write
    pub local_ttl: Option<Duration>,

    /// Override the shared-tier TTL for this write
    pub shared_ttl: Option<Duration>,

    /// Refuse to serve entries more than this far past their staleness
    /// boundary; they are refetched synchronously instead
    pub max_stale_age: Option<Duration>,
}

impl FetchOptions {
    pub fn for_kind(kind: CacheKind) -> Self {
        Self {
            kind,
            ..Self::default()
        }
    }

    pub fn with_ttls(mut self, local: Duration, shared: Duration) -> Self {
        self.local_ttl = Some(local);
        self.shared_ttl = Some(shared);
        self
    }

    pub fn without_stale_while_revalidate(mut self) -> Self {
        self.stale_while_revalidate = Some(false);
        self
    }
}

#[derive(Debug, Default)]
struct CacheCounters {
    local_hits: AtomicU64,
    shared_hits: AtomicU64,
    misses: AtomicU64,
    stale_served: AtomicU64,
    refreshes_scheduled: AtomicU64,
    refresh_failures: AtomicU64,
    shared_tier_errors: AtomicU64,
}

/// Snapshot of cache counters at a point in time
#[derive(Debug, Clone)]
pub struct CacheStatsSnapshot {
    pub local_hits: u64,
    pub shared_hits: u64,
    pub misses: u64,
    pub stale_served: u64,
    pub refreshes_scheduled: u64,
    pub refresh_failures: u64,
    pub shared_tier_errors: u64,
    pub evictions: u64,
    pub local_entries: usize,
}

impl CacheStatsSnapshot {
    /// Fraction of reads answered without fetching (0.0-1.0)
    pub fn hit_rate(&self) -> f64 {
        let hits = self.local_hits + self.shared_hits + self.stale_served;
        let total = hits + self.misses;
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }
}

struct CacheShared<T> {
    namespace: String,
    settings: CacheSettings,
    local: LocalTier<T>,
    topology: TierTopology,
    refreshing: DashSet<String>,
    counters: CacheCounters,
}

/// Two-tier, tenant-scoped cache. Cheap to clone; clones share state.
///
/// Values are handed out as clones - the cache never exposes a mutable
/// reference to a stored value.
pub struct TieredCache<T> {
    inner: Arc<CacheShared<T>>,
}

impl<T> Clone for TieredCache<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct RefreshGuard<T> {
    inner: Arc<CacheShared<T>>,
    key: String,
}

impl<T> Drop for RefreshGuard<T> {
    fn drop(&mut self) {
        self.inner.refreshing.remove(&self.key);
    }
}

impl<T> TieredCache<T>
where
    T: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    pub fn new(
        namespace: impl Into<String>,
        settings: CacheSettings,
        topology: TierTopology,
    ) -> Self {
        let namespace = namespace.into();
        match &topology {
            TierTopology::LocalOnly => info!(
                namespace = %namespace,
                "🗂️ Tiered cache initialized without shared tier (local-only operation)"
            ),
            TierTopology::LocalPlusShared(_) => info!(
                namespace = %namespace,
                "🗂️ Tiered cache initialized with shared tier"
            ),
        }

        let local = LocalTier::new(settings.max_entries, settings.max_bytes);

        Self {
            inner: Arc::new(CacheShared {
                namespace,
                settings,
                local,
                topology,
                refreshing: DashSet::new(),
                counters: CacheCounters::default(),
            }),
        }
    }

    /// Look up a value without ever fetching. Non-dead shared-tier hits are
    /// promoted into the local tier, keeping their original lifetimes.
    pub async fn get(&self, tenant: &str, key: &str) -> Option<T> {
        if !self.inner.settings.enabled {
            return None;
        }

        let composed = self.composed_key(tenant, key);

        if let Some(entry) = self.inner.local.get(&composed) {
            self.inner.counters.local_hits.fetch_add(1, Ordering::Relaxed);
            return Some(entry.value);
        }

        if let Some(entry) = self.load_shared(&composed).await {
            self.promote(&composed, &entry);
            self.inner.counters.shared_hits.fetch_add(1, Ordering::Relaxed);
            return Some(entry.value);
        }

        self.inner.counters.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Write to both tiers. The shared-tier write is best-effort: a failure
    /// is logged and counted, never surfaced, because the local tier holds
    /// the authoritative copy for this process.
    pub async fn set(&self, tenant: &str, key: &str, value: T, ttl: Duration) {
        if !self.inner.settings.enabled {
            return;
        }
        let composed = self.composed_key(tenant, key);
        self.store_entry(&composed, &value, ttl, ttl).await;
    }

    /// Cache-or-compute. Fetch errors propagate only on a true miss; tier
    /// storage problems never do.
    pub async fn get_or_fetch<F, Fut, E>(
        &self,
        tenant: &str,
        key: &str,
        fetch: F,
        options: FetchOptions,
    ) -> Result<T, E>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        E: std::fmt::Display + Send + 'static,
    {
        if !self.inner.settings.enabled {
            return fetch().await;
        }

        let composed = self.composed_key(tenant, key);
        let swr = options
            .stale_while_revalidate
            .unwrap_or(self.inner.settings.stale_while_revalidate);
        let pair = self.inner.settings.ttl_pair(options.kind);
        let local_ttl = options.local_ttl.unwrap_or_else(|| pair.local());
        let shared_ttl = options.shared_ttl.unwrap_or_else(|| pair.shared());

        if let Some(entry) = self.inner.local.get(&composed) {
            match entry.freshness() {
                Freshness::Fresh => {
                    self.inner.counters.local_hits.fetch_add(1, Ordering::Relaxed);
                    return Ok(entry.value);
                }
                Freshness::StaleUsable if swr && within_stale_budget(&entry, &options) => {
                    self.inner.counters.stale_served.fetch_add(1, Ordering::Relaxed);
                    self.schedule_refresh(composed, fetch, local_ttl, shared_ttl);
                    return Ok(entry.value);
                }
                _ => {}
            }
        }

        if let Some(entry) = self.load_shared(&composed).await {
            self.promote(&composed, &entry);
            match entry.freshness() {
                Freshness::Fresh => {
                    self.inner.counters.shared_hits.fetch_add(1, Ordering::Relaxed);
                    return Ok(entry.value);
                }
                Freshness::StaleUsable if swr && within_stale_budget(&entry, &options) => {
                    self.inner.counters.stale_served.fetch_add(1, Ordering::Relaxed);
                    self.schedule_refresh(composed, fetch, local_ttl, shared_ttl);
                    return Ok(entry.value);
                }
                _ => {}
            }
        }

        // True miss: the caller waits for the fetch. Concurrent misses for
        // the same key each fetch independently; only background refreshes
        // are deduplicated.
        self.inner.counters.misses.fetch_add(1, Ordering::Relaxed);
        debug!(key = %composed, "cache miss; fetching from upstream");

        let value = fetch().await?;
        self.store_entry(&composed, &value, local_ttl, shared_ttl).await;
        Ok(value)
    }

    /// Remove a key from both tiers. Returns true iff some tier held it.
    pub async fn invalidate(&self, tenant: &str, key: &str) -> bool {
        let composed = self.composed_key(tenant, key);
        let local_removed = self.inner.local.remove(&composed);

        let shared_removed = match self.inner.topology.shared() {
            Some(tier) => match tier.remove(&composed).await {
                Ok(removed) => removed,
                Err(err) => {
                    self.note_shared_error("remove", &composed, &err);
                    false
                }
            },
            None => false,
        };

        local_removed || shared_removed
    }

    /// Remove every entry under the tenant's prefix from both tiers,
    /// iterating a stable snapshot of matching keys. Returns the number of
    /// entries removed, summed across tiers (a key present in both tiers
    /// counts twice).
    pub async fn invalidate_tenant(&self, tenant: &str) -> u64 {
        let prefix = key::tenant_prefix(tenant, &self.inner.namespace);
        let local_removed = self.inner.local.remove_prefix(&prefix);

        let shared_removed = match self.inner.topology.shared() {
            Some(tier) => match tier.purge_prefix(&prefix).await {
                Ok(count) => count,
                Err(err) => {
                    self.note_shared_error("purge_prefix", &prefix, &err);
                    0
                }
            },
            None => 0,
        };

        info!(
            tenant = %tenant,
            namespace = %self.inner.namespace,
            local_removed,
            shared_removed,
            "tenant cache entries invalidated"
        );

        local_removed + shared_removed
    }

    pub fn stats(&self) -> CacheStatsSnapshot {
        let counters = &self.inner.counters;
        CacheStatsSnapshot {
            local_hits: counters.local_hits.load(Ordering::Relaxed),
            shared_hits: counters.shared_hits.load(Ordering::Relaxed),
            misses: counters.misses.load(Ordering::Relaxed),
            stale_served: counters.stale_served.load(Ordering::Relaxed),
            refreshes_scheduled: counters.refreshes_scheduled.load(Ordering::Relaxed),
            refresh_failures: counters.refresh_failures.load(Ordering::Relaxed),
            shared_tier_errors: counters.shared_tier_errors.load(Ordering::Relaxed),
            evictions: self.inner.local.eviction_count(),
            local_entries: self.inner.local.len(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.inner.namespace
    }

    fn composed_key(&self, tenant: &str, logical: &str) -> String {
        key::compose(tenant, &self.inner.namespace, logical)
    }

    /// Schedule at most one background refresh for a key. `DashSet::insert`
    /// is the atomic check-then-act: a false return means a refresh is
    /// already in flight and its result will serve every stale reader.
    fn schedule_refresh<F, Fut, E>(
        &self,
        composed: String,
        fetch: F,
        local_ttl: Duration,
        shared_ttl: Duration,
    ) where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        E: std::fmt::Display + Send + 'static,
    {
        if !self.inner.refreshing.insert(composed.clone()) {
            return;
        }
        self.inner
            .counters
            .refreshes_scheduled
            .fetch_add(1, Ordering::Relaxed);

        let cache = self.clone();
        tokio::spawn(async move {
            // The guard clears the in-flight marker whatever happens below,
            // including a panic inside the fetch future.
            let _guard = RefreshGuard {
                inner: Arc::clone(&cache.inner),
                key: composed.clone(),
            };

            match fetch().await {
                Ok(value) => {
                    cache
                        .store_entry(&composed, &value, local_ttl, shared_ttl)
                        .await;
                    debug!(key = %composed, "background refresh stored a new value");
                }
                Err(err) => {
                    cache
                        .inner
                        .counters
                        .refresh_failures
                        .fetch_add(1, Ordering::Relaxed);
                    warn!(
                        key = %composed,
                        error = %err,
                        "background refresh failed; stale entry remains servable"
                    );
                }
            }
        });
    }

    async fn store_entry(&self, composed: &str, value: &T, local_ttl: Duration, shared_ttl: Duration) {
        let now = Utc::now();
        let stale_fraction = self.inner.settings.stale_fraction;

        let payload = match serde_json::to_value(value) {
            Ok(payload) => Some(payload),
            Err(err) => {
                warn!(key = %composed, error = %err, "value not serializable; skipping shared tier");
                None
            }
        };

        let approx_bytes = payload
            .as_ref()
            .map(|p| p.to_string().len())
            .unwrap_or(0)
            + composed.len();

        let local_entry =
            CacheEntry::with_created_at(value.clone(), now, local_ttl, stale_fraction);
        self.inner
            .local
            .insert(composed.to_string(), local_entry, approx_bytes);

        if let (Some(tier), Some(payload)) = (self.inner.topology.shared(), payload) {
            let boundaries =
                CacheEntry::with_created_at((), now, shared_ttl, stale_fraction);
            let record = SharedRecord {
                payload,
                created_at: boundaries.created_at,
                stale_at: boundaries.stale_at,
                expires_at: boundaries.expires_at,
            };
            if let Err(err) = tier.store(composed, record).await {
                self.note_shared_error("store", composed, &err);
            }
        }
    }

    async fn load_shared(&self, composed: &str) -> Option<CacheEntry<T>> {
        let tier = self.inner.topology.shared()?;

        let record = match tier.load(composed).await {
            Ok(Some(record)) => record,
            Ok(None) => return None,
            Err(err) => {
                self.note_shared_error("load", composed, &err);
                return None;
            }
        };

        if record.expires_at <= Utc::now() {
            return None;
        }

        match serde_json::from_value::<T>(record.payload) {
            Ok(value) => Some(CacheEntry {
                value,
                created_at: record.created_at,
                stale_at: record.stale_at,
                expires_at: record.expires_at,
            }),
            Err(err) => {
                self.note_shared_error_msg("decode", composed, &err.to_string());
                None
            }
        }
    }

    /// Promotion preserves the record's original boundaries: an entry's life
    /// is never extended by moving between tiers.
    fn promote(&self, composed: &str, entry: &CacheEntry<T>) {
        let approx_bytes = serde_json::to_string(&entry.value)
            .map(|s| s.len())
            .unwrap_or(0)
            + composed.len();
        self.inner
            .local
            .insert(composed.to_string(), entry.clone(), approx_bytes);
    }

    fn note_shared_error(&self, operation: &str, key: &str, err: &dyn std::fmt::Display) {
        self.note_shared_error_msg(operation, key, &err.to_string());
    }

    fn note_shared_error_msg(&self, operation: &str, key: &str, message: &str) {
        self.inner
            .counters
            .shared_tier_errors
            .fetch_add(1, Ordering::Relaxed);
        warn!(
            operation,
            key = %key,
            error = %message,
            "shared tier degraded; continuing on local tier"
        );
    }
}

fn within_stale_budget<T>(entry: &CacheEntry<T>, options: &FetchOptions) -> bool {
    match options.max_stale_age {
        Some(budget) => entry
            .stale_age(Utc::now())
            .map_or(true, |age| age <= budget),
        None => true,
    }
}
