//! # Circuit Breaker Implementation
//!
//! Fault isolation for the bot's upstream dependencies. This follows the
//! classic three-state pattern: Closed (normal operation), Open (failing
//! fast), and Half-Open (testing recovery). Opening is driven by two rules:
//! a consecutive-failure threshold, and a failure-ratio rule over a bounded
//! rolling window of recent outcomes (gated on a minimum sample count so a
//! single early failure cannot trip it).

use crate::config::BreakerSettings;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Circuit breaker states representing the current operational mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CircuitState {
    /// Normal operation - all calls are allowed through
    Closed = 0,
    /// Failure mode - all calls fail fast without executing
    Open = 1,
    /// Testing recovery - limited calls allowed to test system health
    HalfOpen = 2,
}

impl From<u8> for CircuitState {
    fn from(value: u8) -> Self {
        match value {
            0 => CircuitState::Closed,
            1 => CircuitState::Open,
            2 => CircuitState::HalfOpen,
            _ => CircuitState::Open, // Default to safest state
        }
    }
}

/// Errors that can occur during circuit breaker operation
#[derive(Debug, thiserror::Error)]
pub enum CircuitBreakerError<E> {
    /// Circuit is open, rejecting all calls. Carries the last upstream
    /// error observed before the circuit opened so boundaries can explain
    /// why the dependency is isolated.
    #[error("circuit breaker is open for {component} (last error: {last_error:?})")]
    CircuitOpen {
        component: String,
        last_error: Option<String>,
    },

    /// Operation failed and was recorded
    #[error("operation failed: {0}")]
    OperationFailed(E),
}

impl<E> CircuitBreakerError<E> {
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, CircuitBreakerError::CircuitOpen { .. })
    }
}

impl<E> crate::resilience::ErrorClassification for CircuitBreakerError<E>
where
    E: crate::resilience::ErrorClassification,
{
    fn category(&self) -> crate::resilience::ErrorCategory {
        match self {
            CircuitBreakerError::CircuitOpen { .. } => crate::resilience::ErrorCategory::Isolation,
            CircuitBreakerError::OperationFailed(err) => err.category(),
        }
    }
}

/// Observer for state transitions, registered at construction.
/// Observability only: listeners cannot affect the state machine's outcome.
pub trait BreakerListener: Send + Sync {
    fn on_open(&self, _component: &str) {}
    fn on_half_open(&self, _component: &str) {}
    fn on_close(&self, _component: &str) {}
}

/// Outcome bookkeeping behind one mutex
struct OutcomeLedger {
    consecutive_failures: u32,
    half_open_calls: u32,
    half_open_successes: u32,
    /// Bounded FIFO of recent call outcomes, true = success, oldest dropped
    recent: VecDeque<bool>,
    opened_at: Option<Instant>,
    half_opened_at: Option<Instant>,
    last_error: Option<String>,
    total_calls: u64,
    success_count: u64,
    failure_count: u64,
    rejected_count: u64,
}

impl OutcomeLedger {
    fn new() -> Self {
        Self {
            consecutive_failures: 0,
            half_open_calls: 0,
            half_open_successes: 0,
            recent: VecDeque::new(),
            opened_at: None,
            half_opened_at: None,
            last_error: None,
            total_calls: 0,
            success_count: 0,
            failure_count: 0,
            rejected_count: 0,
        }
    }

    fn push_outcome(&mut self, success: bool, window_size: usize) {
        if window_size == 0 {
            return;
        }
        while self.recent.len() >= window_size {
            self.recent.pop_front();
        }
        self.recent.push_back(success);
    }

    fn window_failure_ratio(&self) -> f64 {
        if self.recent.is_empty() {
            return 0.0;
        }
        let failures = self.recent.iter().filter(|ok| !**ok).count();
        failures as f64 / self.recent.len() as f64
    }
}

/// Read-only snapshot of a breaker's state and counters
#[derive(Debug, Clone, Serialize)]
pub struct BreakerStats {
    pub component: String,
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub total_calls: u64,
    pub success_count: u64,
    pub failure_count: u64,
    pub rejected_count: u64,
    pub window_samples: usize,
    pub window_failure_ratio: f64,
    pub last_error: Option<String>,
    /// Milliseconds the circuit has been open, when it is
    pub open_for_ms: Option<u64>,
    /// Milliseconds the circuit has been half-open, when it is
    pub half_open_for_ms: Option<u64>,
}

/// Core circuit breaker implementation with atomic state management
pub struct CircuitBreaker {
    /// Component name for logging and metrics
    name: String,

    /// Current circuit state (atomic for lock-free reads)
    state: AtomicU8,

    settings: BreakerSettings,

    ledger: Mutex<OutcomeLedger>,

    listeners: Vec<Arc<dyn BreakerListener>>,
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("state", &self.state())
            .field("settings", &self.settings)
            .finish()
    }
}

impl CircuitBreaker {
    /// Create a new circuit breaker with the given name and settings
    pub fn new(name: String, settings: BreakerSettings) -> Self {
        Self::with_listeners(name, settings, Vec::new())
    }

    pub fn with_listeners(
        name: String,
        settings: BreakerSettings,
        listeners: Vec<Arc<dyn BreakerListener>>,
    ) -> Self {
        info!(
            component = %name,
            failure_threshold = settings.failure_threshold,
            success_threshold = settings.success_threshold,
            reset_timeout_seconds = settings.reset_timeout_seconds,
            window_size = settings.window_size,
            "🛡️ Circuit breaker initialized"
        );

        Self {
            name,
            state: AtomicU8::new(CircuitState::Closed as u8),
            settings,
            ledger: Mutex::new(OutcomeLedger::new()),
            listeners,
        }
    }

    /// Get current circuit state
    pub fn state(&self) -> CircuitState {
        CircuitState::from(self.state.load(Ordering::Acquire))
    }

    /// Get component name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Execute an operation with circuit breaker protection
    pub async fn call<F, T, E, Fut>(&self, operation: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        if !self.admit().await {
            let last_error = self.ledger.lock().await.last_error.clone();
            return Err(CircuitBreakerError::CircuitOpen {
                component: self.name.clone(),
                last_error,
            });
        }

        let start_time = Instant::now();
        let result = operation().await;
        let duration = start_time.elapsed();

        match &result {
            Ok(_) => self.record_success(duration).await,
            Err(err) => self.record_failure(&err.to_string(), duration).await,
        }

        result.map_err(CircuitBreakerError::OperationFailed)
    }

    /// Check if a call should be allowed based on current state
    async fn admit(&self) -> bool {
        match self.state() {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let mut ledger = self.ledger.lock().await;
                match ledger.opened_at {
                    // Timeout elapsed: flip to half-open and admit this call
                    // as the first trial
                    Some(opened) if opened.elapsed() >= self.settings.reset_timeout() => {
                        self.enter_half_open(&mut ledger);
                        ledger.half_open_calls += 1;
                        true
                    }
                    Some(_) => {
                        ledger.rejected_count += 1;
                        false
                    }
                    None => {
                        // Circuit is open but no timestamp - shouldn't happen, but allow call
                        warn!(component = %self.name, "Circuit open but no timestamp recorded");
                        true
                    }
                }
            }
            CircuitState::HalfOpen => {
                let mut ledger = self.ledger.lock().await;
                if ledger.half_open_calls < self.settings.success_threshold {
                    ledger.half_open_calls += 1;
                    true
                } else {
                    ledger.rejected_count += 1;
                    false
                }
            }
        }
    }

    /// Record a successful operation
    async fn record_success(&self, duration: Duration) {
        let mut ledger = self.ledger.lock().await;
        ledger.total_calls += 1;
        ledger.success_count += 1;
        ledger.push_outcome(true, self.settings.window_size);

        debug!(
            component = %self.name,
            duration_ms = duration.as_millis(),
            "🟢 Operation succeeded"
        );

        match self.state() {
            CircuitState::HalfOpen => {
                ledger.half_open_successes += 1;
                if ledger.half_open_successes >= self.settings.success_threshold {
                    self.enter_closed(&mut ledger);
                }
            }
            CircuitState::Closed => {
                // A success resets the consecutive-failure count but leaves
                // the rolling window intact
                ledger.consecutive_failures = 0;
            }
            CircuitState::Open => {
                warn!(component = %self.name, "Success recorded while circuit is open");
            }
        }
    }

    /// Record a failed operation
    async fn record_failure(&self, message: &str, duration: Duration) {
        let mut ledger = self.ledger.lock().await;
        ledger.total_calls += 1;
        ledger.failure_count += 1;
        ledger.last_error = Some(message.to_string());
        ledger.push_outcome(false, self.settings.window_size);

        error!(
            component = %self.name,
            duration_ms = duration.as_millis(),
            error = %message,
            "🔴 Operation failed"
        );

        match self.state() {
            CircuitState::Closed => {
                ledger.consecutive_failures += 1;

                let consecutive_trip =
                    ledger.consecutive_failures >= self.settings.failure_threshold;
                let ratio_trip = ledger.recent.len() >= self.settings.min_samples
                    && ledger.window_failure_ratio() >= 0.5;

                if consecutive_trip || ratio_trip {
                    self.enter_open(&mut ledger);
                }
            }
            CircuitState::HalfOpen => {
                // Any failure in half-open state immediately reopens the circuit
                self.enter_open(&mut ledger);
            }
            CircuitState::Open => {
                // Already open, just record the failure
            }
        }
    }

    /// Transition to closed state (normal operation), clearing counters and
    /// the rolling window
    fn enter_closed(&self, ledger: &mut OutcomeLedger) {
        self.state
            .store(CircuitState::Closed as u8, Ordering::Release);
        ledger.consecutive_failures = 0;
        ledger.half_open_calls = 0;
        ledger.half_open_successes = 0;
        ledger.recent.clear();
        ledger.opened_at = None;
        ledger.half_opened_at = None;

        info!(
            component = %self.name,
            total_calls = ledger.total_calls,
            "🟢 Circuit breaker closed (recovered)"
        );

        for listener in &self.listeners {
            listener.on_close(&self.name);
        }
    }

    /// Transition to open state (failing fast)
    fn enter_open(&self, ledger: &mut OutcomeLedger) {
        self.state.store(CircuitState::Open as u8, Ordering::Release);
        ledger.opened_at = Some(Instant::now());
        ledger.half_open_calls = 0;
        ledger.half_open_successes = 0;

        error!(
            component = %self.name,
            consecutive_failures = ledger.consecutive_failures,
            failure_threshold = self.settings.failure_threshold,
            reset_timeout_seconds = self.settings.reset_timeout_seconds,
            "🔴 Circuit breaker opened (failing fast)"
        );

        for listener in &self.listeners {
            listener.on_open(&self.name);
        }
    }

    /// Transition to half-open state (testing recovery)
    fn enter_half_open(&self, ledger: &mut OutcomeLedger) {
        self.state
            .store(CircuitState::HalfOpen as u8, Ordering::Release);
        ledger.half_opened_at = Some(Instant::now());
        ledger.half_open_calls = 0;
        ledger.half_open_successes = 0;

        info!(
            component = %self.name,
            success_threshold = self.settings.success_threshold,
            "🟡 Circuit breaker half-open (testing recovery)"
        );

        for listener in &self.listeners {
            listener.on_half_open(&self.name);
        }
    }

    /// Force circuit to open state (for emergency situations)
    pub async fn force_open(&self) {
        warn!(component = %self.name, "🚨 Circuit breaker forced open");
        let mut ledger = self.ledger.lock().await;
        self.enter_open(&mut ledger);
    }

    /// Force circuit to closed state (for emergency recovery)
    pub async fn force_close(&self) {
        warn!(component = %self.name, "🚨 Circuit breaker forced closed");
        let mut ledger = self.ledger.lock().await;
        self.enter_closed(&mut ledger);
    }

    /// Reset to a pristine closed state, dropping all history
    pub async fn reset(&self) {
        let mut ledger = self.ledger.lock().await;
        self.enter_closed(&mut ledger);
        ledger.total_calls = 0;
        ledger.success_count = 0;
        ledger.failure_count = 0;
        ledger.rejected_count = 0;
        ledger.last_error = None;
    }

    /// Get current stats snapshot
    pub async fn stats(&self) -> BreakerStats {
        let ledger = self.ledger.lock().await;
        BreakerStats {
            component: self.name.clone(),
            state: self.state(),
            consecutive_failures: ledger.consecutive_failures,
            total_calls: ledger.total_calls,
            success_count: ledger.success_count,
            failure_count: ledger.failure_count,
            rejected_count: ledger.rejected_count,
            window_samples: ledger.recent.len(),
            window_failure_ratio: ledger.window_failure_ratio(),
            last_error: ledger.last_error.clone(),
            open_for_ms: ledger
                .opened_at
                .filter(|_| self.state() == CircuitState::Open)
                .map(|opened| opened.elapsed().as_millis() as u64),
            half_open_for_ms: ledger
                .half_opened_at
                .filter(|_| self.state() == CircuitState::HalfOpen)
                .map(|entered| entered.elapsed().as_millis() as u64),
        }
    }

    /// Check if circuit is healthy (closed state with a low failure ratio
    /// over the recent window)
    pub async fn is_healthy(&self) -> bool {
        if self.state() != CircuitState::Closed {
            return false;
        }

        let ledger = self.ledger.lock().await;
        if ledger.recent.len() < self.settings.min_samples {
            // Too few calls to determine health
            return true;
        }
        ledger.window_failure_ratio() < 0.1
    }
}
