//! Bounded retries with exponential backoff and per-attempt timeouts.
//!
//! [`RetryExecutor::execute`] never fails outright: it returns a
//! [`RetryOutcome`] carrying the attempt count, total duration, and either
//! the value or the *last* error, so callers decide how to surface
//! exhaustion. The [`retry`] convenience re-surfaces the last error as
//! `Err`. Whether an error is worth another attempt is decided by its
//! [`ErrorCategory`](crate::resilience::ErrorCategory); a per-attempt
//! timeout is always treated as retryable.
//!
//! Timing out an attempt stops waiting for it - it does not abort the
//! underlying operation, which may keep running after losing the race.

use crate::config::RetrySettings;
use crate::resilience::classification::{ErrorCategory, ErrorClassification};
use rand::Rng;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Failure surfaced by the retry executor: either the last upstream error
/// or a per-attempt timeout
#[derive(Debug, thiserror::Error)]
pub enum RetryError<E> {
    #[error("attempt timed out after {timeout_ms}ms")]
    TimedOut { timeout_ms: u64 },

    #[error("{0}")]
    Upstream(E),
}

impl<E> ErrorClassification for RetryError<E>
where
    E: ErrorClassification,
{
    fn category(&self) -> ErrorCategory {
        match self {
            RetryError::TimedOut { .. } => ErrorCategory::Timeout,
            RetryError::Upstream(err) => err.category(),
        }
    }
}

/// Result of one `execute` call: the value or the last error, plus how much
/// work it took to get there
#[derive(Debug)]
pub struct RetryOutcome<T, E> {
    pub attempts: u32,
    pub total_duration: Duration,
    pub result: Result<T, RetryError<E>>,
}

impl<T, E> RetryOutcome<T, E> {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    pub fn into_result(self) -> Result<T, RetryError<E>> {
        self.result
    }
}

type OnRetry = Arc<dyn Fn(u32, Duration) + Send + Sync>;

/// Wraps arbitrary async operations with bounded retries and exponential
/// backoff
#[derive(Clone)]
pub struct RetryExecutor {
    settings: RetrySettings,
    label: Option<String>,
    on_retry: Option<OnRetry>,
}

impl std::fmt::Debug for RetryExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryExecutor")
            .field("settings", &self.settings)
            .field("label", &self.label)
            .finish()
    }
}

impl RetryExecutor {
    pub fn new(settings: RetrySettings) -> Self {
        Self {
            settings,
            label: None,
            on_retry: None,
        }
    }

    /// Label used in log lines, typically the upstream dependency name
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Observability callback invoked with (attempt, delay) before each
    /// backoff sleep
    pub fn with_on_retry(mut self, callback: OnRetry) -> Self {
        self.on_retry = Some(callback);
        self
    }

    /// Backoff delay after a given 1-based attempt number:
    /// `min(initial_delay * multiplier^(attempt-1), max_delay)`, with
    /// optional jitter applied on top.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        let raw = self.settings.initial_delay().as_millis() as f64
            * self.settings.backoff_multiplier.powi(exponent);
        let capped = raw.min(self.settings.max_delay().as_millis() as f64);

        let final_ms = if self.settings.jitter_enabled {
            let spread = self.settings.jitter_max_percentage;
            let factor = 1.0 + rand::thread_rng().gen_range(-spread..=spread);
            (capped * factor).max(0.0)
        } else {
            capped
        };

        Duration::from_millis(final_ms as u64)
    }

    /// Run an operation with up to `max_retries` additional attempts
    pub async fn execute<F, Fut, T, E>(&self, mut operation: F) -> RetryOutcome<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: ErrorClassification + std::fmt::Display,
    {
        let started = Instant::now();
        let max_attempts = self.settings.max_retries + 1;
        let label = self.label.as_deref().unwrap_or("upstream");
        let mut attempt = 0u32;

        loop {
            attempt += 1;

            let error = match tokio::time::timeout(self.settings.attempt_timeout(), operation())
                .await
            {
                Ok(Ok(value)) => {
                    if attempt > 1 {
                        debug!(
                            component = label,
                            attempt,
                            "operation succeeded after retry"
                        );
                    }
                    return RetryOutcome {
                        attempts: attempt,
                        total_duration: started.elapsed(),
                        result: Ok(value),
                    };
                }
                Ok(Err(err)) => RetryError::Upstream(err),
                Err(_elapsed) => RetryError::TimedOut {
                    timeout_ms: self.settings.attempt_timeout_ms,
                },
            };

            if !error.category().is_retryable() || attempt >= max_attempts {
                warn!(
                    component = label,
                    attempt,
                    category = ?error.category(),
                    error = %error,
                    "giving up after final attempt"
                );
                return RetryOutcome {
                    attempts: attempt,
                    total_duration: started.elapsed(),
                    result: Err(error),
                };
            }

            let delay = self.backoff_delay(attempt);
            debug!(
                component = label,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "retrying after backoff"
            );
            if let Some(callback) = &self.on_retry {
                callback(attempt, delay);
            }
            tokio::time::sleep(delay).await;
        }
    }
}

/// Convenience wrapper that re-surfaces the last error as `Err`
pub async fn retry<F, Fut, T, E>(operation: F, settings: RetrySettings) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: ErrorClassification + std::fmt::Display,
{
    RetryExecutor::new(settings).execute(operation).await.into_result()
}
