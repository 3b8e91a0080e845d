//! Keyed circuit breaker factory.
//!
//! Hands out one shared breaker per named upstream dependency so every call
//! site hitting the same dependency shares its failure state. Breakers are
//! created on first use with per-component settings overrides falling back
//! to the configured default.

use crate::config::CircuitBreakerSettings;
use crate::resilience::circuit_breaker::{BreakerListener, BreakerStats, CircuitBreaker};
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

pub struct BreakerRegistry {
    breakers: DashMap<String, Arc<CircuitBreaker>>,
    settings: CircuitBreakerSettings,
    listeners: Vec<Arc<dyn BreakerListener>>,
}

impl std::fmt::Debug for BreakerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BreakerRegistry")
            .field("components", &self.breakers.len())
            .field("settings", &self.settings)
            .finish()
    }
}

impl BreakerRegistry {
    pub fn new(settings: CircuitBreakerSettings) -> Self {
        Self {
            breakers: DashMap::new(),
            settings,
            listeners: Vec::new(),
        }
    }

    /// Attach a listener propagated to every breaker created afterwards
    pub fn with_listener(mut self, listener: Arc<dyn BreakerListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    /// Get or create the breaker for a named upstream dependency. Every
    /// caller asking for the same component receives the same instance.
    pub fn breaker(&self, component: &str) -> Arc<CircuitBreaker> {
        self.breakers
            .entry(component.to_string())
            .or_insert_with(|| {
                debug!(component = %component, "creating circuit breaker");
                Arc::new(CircuitBreaker::with_listeners(
                    component.to_string(),
                    self.settings.for_component(component),
                    self.listeners.clone(),
                ))
            })
            .clone()
    }

    /// Names of every breaker created so far
    pub fn components(&self) -> Vec<String> {
        self.breakers.iter().map(|e| e.key().clone()).collect()
    }

    /// Stats snapshot for a single component, if its breaker exists
    pub async fn component_stats(&self, component: &str) -> Option<BreakerStats> {
        let breaker = self.breakers.get(component).map(|e| e.value().clone())?;
        Some(breaker.stats().await)
    }

    /// Stats snapshots for every known breaker
    pub async fn all_stats(&self) -> HashMap<String, BreakerStats> {
        // Collect the Arcs first so no shard lock is held across an await
        let breakers: Vec<Arc<CircuitBreaker>> =
            self.breakers.iter().map(|e| e.value().clone()).collect();

        let mut stats = HashMap::with_capacity(breakers.len());
        for breaker in breakers {
            stats.insert(breaker.name().to_string(), breaker.stats().await);
        }
        stats
    }

    /// Reset every breaker to a pristine closed state
    pub async fn reset_all(&self) {
        let breakers: Vec<Arc<CircuitBreaker>> =
            self.breakers.iter().map(|e| e.value().clone()).collect();
        for breaker in breakers {
            breaker.reset().await;
        }
    }
}
