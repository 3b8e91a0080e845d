//! Cache entry lifecycle: fresh, stale-but-usable, dead.
//!
//! Entries carry wall-clock timestamps (not process-local instants) because
//! shared-tier entries cross process boundaries and must keep their original
//! lifetime when promoted into another process's local tier.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Lifecycle stage of a cache entry at a given instant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// Before the staleness boundary: serve without refreshing
    Fresh,
    /// Past the staleness boundary but not expired: servable, wants a refresh
    StaleUsable,
    /// Expired: indistinguishable from a miss
    Dead,
}

/// A single cached value with its lifetime boundaries.
///
/// Invariant: `created_at <= stale_at <= expires_at`. Entries are replaced
/// whole, never partially updated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry<T> {
    pub value: T,
    pub created_at: DateTime<Utc>,
    pub stale_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl<T> CacheEntry<T> {
    /// Create an entry expiring `ttl` from now, becoming stale at
    /// `stale_fraction` of that interval. A zero TTL produces an entry that
    /// is already dead.
    pub fn new(value: T, ttl: Duration, stale_fraction: f64) -> Self {
        Self::with_created_at(value, Utc::now(), ttl, stale_fraction)
    }

    pub(crate) fn with_created_at(
        value: T,
        created_at: DateTime<Utc>,
        ttl: Duration,
        stale_fraction: f64,
    ) -> Self {
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        let fraction = stale_fraction.clamp(0.0, 1.0);
        let stale_ms = (ttl_ms as f64 * fraction) as i64;

        Self {
            value,
            created_at,
            stale_at: created_at + chrono::Duration::milliseconds(stale_ms),
            expires_at: created_at + chrono::Duration::milliseconds(ttl_ms),
        }
    }

    /// Freshness at an explicit instant
    pub fn freshness_at(&self, now: DateTime<Utc>) -> Freshness {
        if now < self.stale_at {
            Freshness::Fresh
        } else if now < self.expires_at {
            Freshness::StaleUsable
        } else {
            Freshness::Dead
        }
    }

    /// Freshness right now
    pub fn freshness(&self) -> Freshness {
        self.freshness_at(Utc::now())
    }

    pub fn is_dead(&self) -> bool {
        self.freshness() == Freshness::Dead
    }

    /// How long the entry has been past its staleness boundary, if it is
    pub fn stale_age(&self, now: DateTime<Utc>) -> Option<Duration> {
        if now >= self.stale_at {
            (now - self.stale_at).to_std().ok()
        } else {
            None
        }
    }

    /// Map the value, preserving all lifetime boundaries
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> CacheEntry<U> {
        CacheEntry {
            value: f(self.value),
            created_at: self.created_at,
            stale_at: self.stale_at,
            expires_at: self.expires_at,
        }
    }
}
