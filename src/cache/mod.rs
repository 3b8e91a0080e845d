//! # Tiered Cache Module
//!
//! Two-tier, tenant-scoped caching for the values the bot derives from its
//! upstreams: document bodies, folder metadata, translation output, and
//! issue metadata.
//!
//! ## Architecture
//!
//! - **Local tier**: in-process, bounded by entry count and approximate
//!   bytes, LRU-evicted, lost on restart
//! - **Shared tier**: optional external key-value store behind the
//!   [`SharedTier`] trait, survives restarts, shared across instances
//! - **Freshness protocol**: entries pass through fresh, stale-but-usable,
//!   and dead stages; stale entries are served while a single background
//!   refresh runs
//! - **Tenant isolation**: every key is prefixed `tenant:namespace:` and all
//!   bulk operations are prefix-scoped
//!
//! ## Usage
//!
//! ```rust,no_run
//! use herald_core::cache::{FetchOptions, TierTopology, TieredCache};
//! use herald_core::config::{CacheKind, CacheSettings};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let cache: TieredCache<String> =
//!     TieredCache::new("doc", CacheSettings::default(), TierTopology::LocalOnly);
//!
//! let body = cache
//!     .get_or_fetch(
//!         "acme",
//!         "guides/setup.md",
//!         || async { Ok::<_, std::io::Error>("# Setup".to_string()) },
//!         FetchOptions::for_kind(CacheKind::DocumentContent),
//!     )
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod entry;
pub mod key;
mod local;
pub mod shared;
pub mod tiered;

pub use entry::{CacheEntry, Freshness};
pub use key::{content_digest, CacheKey};
pub use shared::{InMemorySharedTier, SharedRecord, SharedTier, SharedTierError, TierTopology};
pub use tiered::{CacheStatsSnapshot, FetchOptions, TieredCache};
