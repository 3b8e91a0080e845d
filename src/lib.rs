#![allow(clippy::doc_markdown)] // Allow technical terms like DevRel, TTL in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Herald Core
//!
//! Caching and resilience core for the Herald DevRel automation bot.
//!
//! ## Overview
//!
//! Herald fans out to a chat platform, an issue tracker, a document store,
//! and a language model to translate engineering artifacts into
//! stakeholder-facing summaries. Those upstreams are slow and unreliable;
//! this crate provides the control loop that keeps the bot responsive
//! anyway: a two-tier cache with a stale-while-revalidate freshness
//! protocol, a circuit breaker state machine, and an exponential-backoff
//! retry executor, composed so that a cache miss triggers a guarded fetch
//! whose outcome feeds the breaker.
//!
//! ## Architecture
//!
//! A consumer calls [`cache::TieredCache::get_or_fetch`] with a fetch
//! function it has wrapped via [`resilience::ProtectedUpstream`]. The cache
//! answers from its local tier, then the shared tier, applying freshness
//! rules; on a stale hit it serves the old value and schedules exactly one
//! background refresh; on a true miss the guarded fetch runs - retried with
//! backoff inside a per-dependency circuit breaker that fails fast while
//! the upstream is isolated.
//!
//! ## Module Organization
//!
//! - [`cache`] - Tiered cache, freshness protocol, tenant-scoped keys
//! - [`resilience`] - Circuit breaker, breaker registry, retry executor
//! - [`config`] - Environment-aware configuration
//! - [`error`] - Structured error handling
//! - [`logging`] - Structured logging initialization
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use herald_core::cache::{FetchOptions, TierTopology, TieredCache};
//! use herald_core::config::{CacheKind, HeraldConfig};
//! use herald_core::resilience::{BreakerRegistry, ProtectedUpstream, RetryExecutor, UpstreamError};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = HeraldConfig::from_environment();
//! config.validate()?;
//!
//! // One registry and one cache per process, passed to consumers
//! let registry = Arc::new(BreakerRegistry::new(config.circuit_breakers.clone()));
//! let cache: TieredCache<String> =
//!     TieredCache::new("doc", config.cache.clone(), TierTopology::LocalOnly);
//!
//! let docstore = ProtectedUpstream::new(
//!     "document_store",
//!     registry.clone(),
//!     RetryExecutor::new(config.retry.clone()),
//! );
//!
//! let body = cache
//!     .get_or_fetch(
//!         "acme",
//!         "guides/setup.md",
//!         docstore.fetcher(|| async {
//!             // Real document-store client call goes here
//!             Ok::<_, UpstreamError>("# Setup".to_string())
//!         }),
//!         FetchOptions::for_kind(CacheKind::DocumentContent),
//!     )
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod logging;
pub mod resilience;

pub use cache::{
    CacheEntry, CacheKey, CacheStatsSnapshot, FetchOptions, Freshness, InMemorySharedTier,
    SharedRecord, SharedTier, SharedTierError, TierTopology, TieredCache,
};
pub use config::{
    BreakerSettings, CacheKind, CacheSettings, CircuitBreakerSettings, HeraldConfig,
    RetrySettings, TtlPair,
};
pub use error::{HeraldError, Result};
pub use resilience::{
    is_circuit_open, BreakerListener, BreakerRegistry, BreakerStats, CircuitBreaker,
    CircuitBreakerError, CircuitState, ErrorCategory, ErrorClassification, GuardedError,
    ProtectedUpstream, RetryError, RetryExecutor, RetryOutcome, UpstreamError,
};
