//! # Resilience Module
//!
//! Failure isolation for the unreliable upstreams the bot depends on: the
//! chat platform, issue tracker, document store, and language model.
//!
//! ## Architecture
//!
//! - **Circuit Breakers**: Prevent cascade failures by isolating failing
//!   upstream dependencies behind a three-state gate
//! - **Breaker Registry**: One shared breaker per named dependency, so all
//!   call sites hitting the same upstream share failure state
//! - **Retry Executor**: Bounded retries with exponential backoff and
//!   per-attempt timeouts, driven by error classification
//! - **Protected Upstream**: The canonical retry-inside-breaker composition,
//!   adaptable into a cache fetch function
//!
//! ## Usage
//!
//! ```rust,no_run
//! use herald_core::config::{BreakerSettings, RetrySettings};
//! use herald_core::resilience::{CircuitBreaker, RetryExecutor, UpstreamError};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let circuit_breaker = CircuitBreaker::new(
//!     "document_store".to_string(),
//!     BreakerSettings::default(),
//! );
//!
//! let result = circuit_breaker
//!     .call(|| async {
//!         // Upstream call here
//!         Ok::<&str, UpstreamError>("success")
//!     })
//!     .await?;
//!
//! let retry = RetryExecutor::new(RetrySettings::default());
//! let outcome = retry
//!     .execute(|| async { Ok::<_, UpstreamError>("fetched") })
//!     .await;
//! # Ok(())
//! # }
//! ```

pub mod circuit_breaker;
pub mod classification;
pub mod protected;
pub mod registry;
pub mod retry;

pub use circuit_breaker::{
    BreakerListener, BreakerStats, CircuitBreaker, CircuitBreakerError, CircuitState,
};
pub use classification::{ErrorCategory, ErrorClassification, UpstreamError};
pub use protected::{is_circuit_open, GuardedError, ProtectedUpstream};
pub use registry::BreakerRegistry;
pub use retry::{retry, RetryError, RetryExecutor, RetryOutcome};
