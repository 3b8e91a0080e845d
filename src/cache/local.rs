//! Local (in-process) cache tier.
//!
//! Bounded by entry count and approximate payload bytes, evicting
//! least-recently-used entries first. Uses `IndexMap` for recency ordering:
//! the front of the map is the coldest entry, reads move an entry to the
//! back. All operations take a short `parking_lot` mutex and never suspend,
//! which keeps check-then-act sequences in the tiered cache atomic.

use crate::cache::entry::{CacheEntry, Freshness};
use indexmap::IndexMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

struct Stored<T> {
    entry: CacheEntry<T>,
    size_bytes: usize,
}

struct LocalInner<T> {
    entries: IndexMap<String, Stored<T>>,
    total_bytes: usize,
}

pub(crate) struct LocalTier<T> {
    inner: Mutex<LocalInner<T>>,
    max_entries: usize,
    max_bytes: usize,
    evictions: AtomicU64,
}

impl<T: Clone> LocalTier<T> {
    pub(crate) fn new(max_entries: usize, max_bytes: usize) -> Self {
        Self {
            inner: Mutex::new(LocalInner {
                entries: IndexMap::new(),
                total_bytes: 0,
            }),
            max_entries,
            max_bytes,
            evictions: AtomicU64::new(0),
        }
    }

    /// Look up a non-dead entry, refreshing its recency. Dead entries are
    /// removed on sight so natural expiry needs no sweeper task.
    pub(crate) fn get(&self, key: &str) -> Option<CacheEntry<T>> {
        let mut inner = self.inner.lock();
        let stored = inner.entries.shift_remove(key)?;

        if stored.entry.freshness() == Freshness::Dead {
            inner.total_bytes = inner.total_bytes.saturating_sub(stored.size_bytes);
            return None;
        }

        let entry = stored.entry.clone();
        inner.entries.insert(key.to_string(), stored);
        Some(entry)
    }

    /// Insert or replace an entry, then evict from the cold end until the
    /// tier is back within its bounds.
    pub(crate) fn insert(&self, key: String, entry: CacheEntry<T>, size_bytes: usize) {
        let mut inner = self.inner.lock();

        if let Some(previous) = inner.entries.shift_remove(&key) {
            inner.total_bytes = inner.total_bytes.saturating_sub(previous.size_bytes);
        }

        inner.total_bytes += size_bytes;
        inner.entries.insert(key, Stored { entry, size_bytes });

        while inner.entries.len() > self.max_entries
            || (inner.total_bytes > self.max_bytes && inner.entries.len() > 1)
        {
            match inner.entries.shift_remove_index(0) {
                Some((evicted_key, evicted)) => {
                    inner.total_bytes = inner.total_bytes.saturating_sub(evicted.size_bytes);
                    self.evictions.fetch_add(1, Ordering::Relaxed);
                    debug!(key = %evicted_key, "evicted least-recently-used local entry");
                }
                None => break,
            }
        }
    }

    pub(crate) fn remove(&self, key: &str) -> bool {
        let mut inner = self.inner.lock();
        match inner.entries.shift_remove(key) {
            Some(stored) => {
                inner.total_bytes = inner.total_bytes.saturating_sub(stored.size_bytes);
                true
            }
            None => false,
        }
    }

    /// Remove every entry whose key starts with `prefix`, iterating a stable
    /// snapshot of matching keys so concurrent writers cannot cause skips.
    pub(crate) fn remove_prefix(&self, prefix: &str) -> u64 {
        let mut inner = self.inner.lock();

        let matching: Vec<String> = inner
            .entries
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect();

        let mut removed = 0u64;
        for key in matching {
            if let Some(stored) = inner.entries.shift_remove(&key) {
                inner.total_bytes = inner.total_bytes.saturating_sub(stored.size_bytes);
                removed += 1;
            }
        }
        removed
    }

    pub(crate) fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub(crate) fn eviction_count(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn entry(value: &str) -> CacheEntry<String> {
        CacheEntry::new(value.to_string(), Duration::from_secs(60), 0.8)
    }

    #[test]
    fn insert_then_get() {
        let tier = LocalTier::new(10, 1024);
        tier.insert("a:doc:k".to_string(), entry("v"), 8);
        assert_eq!(tier.get("a:doc:k").map(|e| e.value), Some("v".to_string()));
        assert!(tier.get("a:doc:other").is_none());
    }

    #[test]
    fn count_bound_evicts_least_recently_used() {
        let tier = LocalTier::new(2, 1024);
        tier.insert("k1".to_string(), entry("v1"), 8);
        tier.insert("k2".to_string(), entry("v2"), 8);

        // Touch k1 so k2 becomes the coldest entry
        assert!(tier.get("k1").is_some());

        tier.insert("k3".to_string(), entry("v3"), 8);
        assert!(tier.get("k1").is_some());
        assert!(tier.get("k2").is_none());
        assert!(tier.get("k3").is_some());
        assert_eq!(tier.eviction_count(), 1);
    }

    #[test]
    fn byte_bound_evicts_from_the_cold_end() {
        let tier = LocalTier::new(100, 100);
        tier.insert("k1".to_string(), entry("v1"), 60);
        tier.insert("k2".to_string(), entry("v2"), 60);
        assert!(tier.get("k1").is_none());
        assert!(tier.get("k2").is_some());
    }

    #[test]
    fn an_oversized_entry_is_still_admitted_alone() {
        let tier = LocalTier::new(100, 10);
        tier.insert("k1".to_string(), entry("big"), 500);
        assert!(tier.get("k1").is_some());
        assert_eq!(tier.len(), 1);
    }

    #[test]
    fn dead_entries_vanish_on_read() {
        let tier = LocalTier::new(10, 1024);
        tier.insert(
            "k".to_string(),
            CacheEntry::new("v".to_string(), Duration::ZERO, 0.8),
            8,
        );
        assert!(tier.get("k").is_none());
        assert_eq!(tier.len(), 0);
    }

    #[test]
    fn replacing_an_entry_releases_its_bytes() {
        let tier = LocalTier::new(10, 100);
        tier.insert("k".to_string(), entry("v1"), 80);
        tier.insert("k".to_string(), entry("v2"), 10);
        // The 80-byte accounting must be gone: this insert fits without eviction
        tier.insert("k2".to_string(), entry("v3"), 80);
        assert!(tier.get("k").is_some());
        assert!(tier.get("k2").is_some());
    }

    #[test]
    fn prefix_removal_only_touches_matching_keys() {
        let tier = LocalTier::new(10, 1024);
        tier.insert("acme:doc:a".to_string(), entry("1"), 8);
        tier.insert("acme:doc:b".to_string(), entry("2"), 8);
        tier.insert("globex:doc:a".to_string(), entry("3"), 8);

        assert_eq!(tier.remove_prefix("acme:doc:"), 2);
        assert!(tier.get("acme:doc:a").is_none());
        assert!(tier.get("globex:doc:a").is_some());
    }
}
