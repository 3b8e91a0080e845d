//! Composition of the resilience layer around an upstream operation.
//!
//! [`ProtectedUpstream`] is the canonical wiring of the control loop: an
//! operation runs under the retry executor *inside* a registry-issued
//! circuit breaker, so one exhausted retry sequence counts as a single
//! breaker failure, and an open breaker rejects before any attempt is made.
//! [`ProtectedUpstream::fetcher`] adapts the protected operation into the
//! closure shape [`TieredCache::get_or_fetch`](crate::cache::TieredCache)
//! expects, completing the miss -> guarded fetch -> record outcome loop.

use crate::resilience::circuit_breaker::CircuitBreakerError;
use crate::resilience::classification::ErrorClassification;
use crate::resilience::registry::BreakerRegistry;
use crate::resilience::retry::{RetryError, RetryExecutor};
use futures::future::BoxFuture;
use std::future::Future;
use std::sync::Arc;

/// Error from a protected call: breaker rejection or the (retried)
/// underlying failure. Breaker-open stays distinguishable through the
/// composed type so boundaries can render "temporarily unavailable"
/// messaging instead of a generic failure.
pub type GuardedError<E> = CircuitBreakerError<RetryError<E>>;

/// Returns true when the error means the dependency is currently isolated
/// and the call never reached it
pub fn is_circuit_open<E>(error: &GuardedError<E>) -> bool {
    error.is_circuit_open()
}

/// An upstream dependency wrapped in retry-inside-breaker protection
#[derive(Debug, Clone)]
pub struct ProtectedUpstream {
    component: String,
    registry: Arc<BreakerRegistry>,
    retry: RetryExecutor,
}

impl ProtectedUpstream {
    pub fn new(
        component: impl Into<String>,
        registry: Arc<BreakerRegistry>,
        retry: RetryExecutor,
    ) -> Self {
        let component = component.into();
        let retry = retry.with_label(component.clone());
        Self {
            component,
            registry,
            retry,
        }
    }

    pub fn component(&self) -> &str {
        &self.component
    }

    /// Run an operation under retry protection inside this component's
    /// shared circuit breaker
    pub async fn run<F, Fut, T, E>(&self, operation: F) -> Result<T, GuardedError<E>>
    where
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = Result<T, E>> + Send,
        T: Send,
        E: ErrorClassification + std::fmt::Display + Send,
    {
        let breaker = self.registry.breaker(&self.component);
        breaker
            .call(move || async move { self.retry.execute(operation).await.into_result() })
            .await
    }

    /// Adapt a protected operation into a fetch closure for
    /// `TieredCache::get_or_fetch`
    pub fn fetcher<F, Fut, T, E>(
        &self,
        operation: F,
    ) -> impl FnOnce() -> BoxFuture<'static, Result<T, GuardedError<E>>> + Send + 'static
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: ErrorClassification + std::fmt::Display + Send + 'static,
    {
        let this = self.clone();
        move || Box::pin(async move { this.run(operation).await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BreakerSettings, CircuitBreakerSettings, RetrySettings};
    use crate::resilience::circuit_breaker::CircuitState;
    use crate::resilience::classification::UpstreamError;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn protected(failure_threshold: u32, max_retries: u32) -> (ProtectedUpstream, Arc<BreakerRegistry>) {
        let registry = Arc::new(BreakerRegistry::new(CircuitBreakerSettings {
            default: BreakerSettings {
                failure_threshold,
                success_threshold: 1,
                reset_timeout_seconds: 30,
                window_size: 10,
                min_samples: 100,
            },
            components: HashMap::new(),
        }));
        let retry = RetryExecutor::new(RetrySettings {
            max_retries,
            initial_delay_ms: 5,
            backoff_multiplier: 2.0,
            max_delay_ms: 50,
            attempt_timeout_ms: 500,
            jitter_enabled: false,
            jitter_max_percentage: 0.1,
        });
        (
            ProtectedUpstream::new("docstore", registry.clone(), retry),
            registry,
        )
    }

    fn server_error() -> UpstreamError {
        UpstreamError::from_status("docstore", 503, "unavailable")
    }

    #[tokio::test]
    async fn success_passes_through() {
        let (upstream, registry) = protected(2, 2);

        let value = upstream.run(|| async { Ok::<_, UpstreamError>(7) }).await;
        assert_eq!(value.unwrap(), 7);
        assert_eq!(registry.breaker("docstore").state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn one_exhausted_retry_sequence_is_one_breaker_failure() {
        let (upstream, registry) = protected(2, 2);
        let calls = Arc::new(AtomicU32::new(0));

        let counted = calls.clone();
        let result = upstream
            .run(move || {
                counted.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(server_error()) }
            })
            .await;

        assert!(result.is_err());
        // All three attempts ran inside a single breaker-recorded failure
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        let stats = registry.component_stats("docstore").await.unwrap();
        assert_eq!(stats.failure_count, 1);
        assert_eq!(registry.breaker("docstore").state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn open_breaker_rejects_before_any_attempt() {
        let (upstream, registry) = protected(2, 1);

        for _ in 0..2 {
            let _ = upstream
                .run(|| async { Err::<(), _>(server_error()) })
                .await;
        }
        assert_eq!(registry.breaker("docstore").state(), CircuitState::Open);

        let calls = Arc::new(AtomicU32::new(0));
        let counted = calls.clone();
        let result = upstream
            .run(move || {
                counted.fetch_add(1, Ordering::SeqCst);
                async { Ok::<_, UpstreamError>(1) }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        match result {
            Err(err) => assert!(is_circuit_open(&err)),
            Ok(_) => panic!("expected fast failure"),
        }
    }

    #[tokio::test]
    async fn permanent_errors_fail_without_retries() {
        let (upstream, _registry) = protected(5, 3);
        let calls = Arc::new(AtomicU32::new(0));

        let counted = calls.clone();
        let result = upstream
            .run(move || {
                counted.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(UpstreamError::from_status("docstore", 404, "gone")) }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
