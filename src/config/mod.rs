//! # Configuration Management
//!
//! Environment-aware configuration for the caching and resilience core.
//! Production defaults live in `Default` impls; `for_test()` and
//! `for_development()` provide environment-tuned variants, and
//! `from_environment()` selects between them and applies `HERALD_*`
//! environment variable overrides.

use crate::error::{HeraldError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::time::Duration;
use tracing::{info, warn};

/// Top-level configuration for the Herald core
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct HeraldConfig {
    /// Tiered cache settings
    pub cache: CacheSettings,

    /// Circuit breaker settings (default plus per-component overrides)
    pub circuit_breakers: CircuitBreakerSettings,

    /// Retry and backoff settings
    pub retry: RetrySettings,
}

/// The kind of data a cache entry holds, selecting its default TTL pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CacheKind {
    /// Rendered document bodies fetched from the document store
    #[default]
    DocumentContent,
    /// Folder listings and document-tree metadata
    FolderMetadata,
    /// Stakeholder-facing translations produced by the language model
    TranslationResult,
    /// Issue-tracker ticket metadata
    IssueMetadata,
}

/// Local/shared TTL pair for one kind of cached data
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TtlPair {
    pub local_ttl_seconds: u64,
    pub shared_ttl_seconds: u64,
}

impl TtlPair {
    /// Local-tier TTL as a Duration
    pub fn local(&self) -> Duration {
        Duration::from_secs(self.local_ttl_seconds)
    }

    /// Shared-tier TTL as a Duration
    pub fn shared(&self) -> Duration {
        Duration::from_secs(self.shared_ttl_seconds)
    }
}

/// Configuration for the tiered cache
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSettings {
    pub enabled: bool,

    /// Local tier bound: maximum number of entries
    pub max_entries: usize,

    /// Local tier bound: approximate total payload bytes
    pub max_bytes: usize,

    /// Fraction of an entry's lifetime after which it is stale-but-usable
    pub stale_fraction: f64,

    /// Default for stale-while-revalidate when a call does not override it
    pub stale_while_revalidate: bool,

    /// Shared tier endpoint; `None` degrades the cache to local-only operation
    pub shared_tier_url: Option<String>,

    pub document_content: TtlPair,
    pub folder_metadata: TtlPair,
    pub translation_result: TtlPair,
    pub issue_metadata: TtlPair,
}

impl Default for CacheSettings {
    /// Default configuration suitable for production
    fn default() -> Self {
        Self {
            enabled: true,
            max_entries: 10_000,
            max_bytes: 64 * 1024 * 1024,
            stale_fraction: 0.8,
            stale_while_revalidate: true,
            shared_tier_url: None,
            document_content: TtlPair {
                local_ttl_seconds: 300,
                shared_ttl_seconds: 900,
            },
            folder_metadata: TtlPair {
                local_ttl_seconds: 600,
                shared_ttl_seconds: 3600,
            },
            translation_result: TtlPair {
                local_ttl_seconds: 1800,
                shared_ttl_seconds: 7200,
            },
            issue_metadata: TtlPair {
                local_ttl_seconds: 120,
                shared_ttl_seconds: 600,
            },
        }
    }
}

impl CacheSettings {
    /// Look up the default TTL pair for a cache kind
    pub fn ttl_pair(&self, kind: CacheKind) -> TtlPair {
        match kind {
            CacheKind::DocumentContent => self.document_content,
            CacheKind::FolderMetadata => self.folder_metadata,
            CacheKind::TranslationResult => self.translation_result,
            CacheKind::IssueMetadata => self.issue_metadata,
        }
    }

    /// Create test-optimized configuration with rapid expiry
    pub fn for_test() -> Self {
        Self {
            max_entries: 100,
            max_bytes: 1024 * 1024,
            document_content: TtlPair {
                local_ttl_seconds: 1,
                shared_ttl_seconds: 5,
            },
            folder_metadata: TtlPair {
                local_ttl_seconds: 1,
                shared_ttl_seconds: 5,
            },
            translation_result: TtlPair {
                local_ttl_seconds: 5,
                shared_ttl_seconds: 10,
            },
            issue_metadata: TtlPair {
                local_ttl_seconds: 1,
                shared_ttl_seconds: 5,
            },
            ..Self::default()
        }
    }

    /// Create development-optimized configuration
    pub fn for_development() -> Self {
        Self {
            max_entries: 1000,
            max_bytes: 8 * 1024 * 1024,
            document_content: TtlPair {
                local_ttl_seconds: 30,
                shared_ttl_seconds: 120,
            },
            folder_metadata: TtlPair {
                local_ttl_seconds: 60,
                shared_ttl_seconds: 300,
            },
            translation_result: TtlPair {
                local_ttl_seconds: 120,
                shared_ttl_seconds: 600,
            },
            issue_metadata: TtlPair {
                local_ttl_seconds: 15,
                shared_ttl_seconds: 60,
            },
            ..Self::default()
        }
    }
}

/// Configuration for a single circuit breaker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerSettings {
    /// Consecutive failures before the circuit opens
    pub failure_threshold: u32,

    /// Consecutive half-open successes before the circuit closes
    pub success_threshold: u32,

    /// Seconds the circuit stays open before trial calls are admitted
    pub reset_timeout_seconds: u64,

    /// Rolling outcome window bound
    pub window_size: usize,

    /// Minimum window samples before the failure-ratio rule applies
    pub min_samples: usize,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            reset_timeout_seconds: 30,
            window_size: 50,
            min_samples: 10,
        }
    }
}

impl BreakerSettings {
    /// Reset timeout as a Duration
    pub fn reset_timeout(&self) -> Duration {
        Duration::from_secs(self.reset_timeout_seconds)
    }
}

/// Circuit breaker configuration: a default plus per-component overrides
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CircuitBreakerSettings {
    pub default: BreakerSettings,
    pub components: HashMap<String, BreakerSettings>,
}

impl CircuitBreakerSettings {
    /// Effective settings for a named upstream component
    pub fn for_component(&self, component: &str) -> BreakerSettings {
        self.components
            .get(component)
            .cloned()
            .unwrap_or_else(|| self.default.clone())
    }
}

/// Configuration for the retry executor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    /// Retries after the first attempt (total attempts = max_retries + 1)
    pub max_retries: u32,

    pub initial_delay_ms: u64,
    pub backoff_multiplier: f64,
    pub max_delay_ms: u64,

    /// Per-attempt timeout; an attempt that loses the race is a retryable failure
    pub attempt_timeout_ms: u64,

    /// Randomize delays by up to `jitter_max_percentage` in either direction
    pub jitter_enabled: bool,
    pub jitter_max_percentage: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 1000,
            backoff_multiplier: 2.0,
            max_delay_ms: 30_000,
            attempt_timeout_ms: 15_000,
            jitter_enabled: false,
            jitter_max_percentage: 0.1,
        }
    }
}

impl RetrySettings {
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_millis(self.attempt_timeout_ms)
    }
}

impl HeraldConfig {
    /// Test configuration: rapid expiry, fast breaker cycles, short backoff
    pub fn for_test() -> Self {
        Self {
            cache: CacheSettings::for_test(),
            circuit_breakers: CircuitBreakerSettings {
                default: BreakerSettings {
                    failure_threshold: 2,
                    success_threshold: 1,
                    reset_timeout_seconds: 1,
                    window_size: 10,
                    min_samples: 4,
                },
                components: HashMap::new(),
            },
            retry: RetrySettings {
                max_retries: 2,
                initial_delay_ms: 10,
                backoff_multiplier: 2.0,
                max_delay_ms: 100,
                attempt_timeout_ms: 500,
                jitter_enabled: false,
                jitter_max_percentage: 0.1,
            },
        }
    }

    /// Development configuration
    pub fn for_development() -> Self {
        Self {
            cache: CacheSettings::for_development(),
            ..Self::default()
        }
    }

    /// Load configuration from environment or use defaults
    pub fn from_environment() -> Self {
        let environment = env::var("HERALD_ENV")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "production".to_string());

        let config = match environment.as_str() {
            "test" => {
                info!("Loading test configuration (rapid expiry)");
                Self::for_test()
            }
            "development" => {
                info!("Loading development configuration");
                Self::for_development()
            }
            _ => {
                info!("Loading production configuration");
                Self::default()
            }
        };

        config.with_env_overrides()
    }

    /// Apply environment variable overrides to configuration
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(enabled) = env::var("HERALD_CACHE_ENABLED") {
            self.cache.enabled = enabled.parse().unwrap_or(self.cache.enabled);
            info!("Cache enabled override: {}", self.cache.enabled);
        }

        if let Ok(max) = env::var("HERALD_CACHE_MAX_ENTRIES") {
            if let Ok(entries) = max.parse::<usize>() {
                self.cache.max_entries = entries;
                info!("Cache max entries override: {}", entries);
            }
        }

        if let Ok(url) = env::var("HERALD_SHARED_TIER_URL") {
            if url.is_empty() {
                self.cache.shared_tier_url = None;
            } else {
                info!("Shared tier URL override: {}", url);
                self.cache.shared_tier_url = Some(url);
            }
        }

        if let Ok(threshold) = env::var("HERALD_BREAKER_FAILURE_THRESHOLD") {
            if let Ok(value) = threshold.parse::<u32>() {
                self.circuit_breakers.default.failure_threshold = value;
                info!("Breaker failure threshold override: {}", value);
            }
        }

        if let Ok(timeout) = env::var("HERALD_BREAKER_RESET_TIMEOUT_SECONDS") {
            if let Ok(seconds) = timeout.parse::<u64>() {
                self.circuit_breakers.default.reset_timeout_seconds = seconds;
                info!("Breaker reset timeout override: {}s", seconds);
            }
        }

        if let Ok(retries) = env::var("HERALD_RETRY_MAX_RETRIES") {
            if let Ok(value) = retries.parse::<u32>() {
                self.retry.max_retries = value;
                info!("Retry max retries override: {}", value);
            }
        }

        self
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.cache.stale_fraction <= 0.0 || self.cache.stale_fraction > 1.0 {
            return Err(HeraldError::ConfigurationError(
                "stale_fraction must be in (0.0, 1.0]".to_string(),
            ));
        }

        if self.circuit_breakers.default.failure_threshold == 0 {
            return Err(HeraldError::ConfigurationError(
                "breaker failure_threshold must be greater than 0".to_string(),
            ));
        }

        if self.circuit_breakers.default.success_threshold == 0 {
            return Err(HeraldError::ConfigurationError(
                "breaker success_threshold must be greater than 0".to_string(),
            ));
        }

        if self.retry.backoff_multiplier < 1.0 {
            return Err(HeraldError::ConfigurationError(
                "retry backoff_multiplier must be at least 1.0".to_string(),
            ));
        }

        if self.retry.jitter_max_percentage < 0.0 || self.retry.jitter_max_percentage >= 1.0 {
            return Err(HeraldError::ConfigurationError(
                "retry jitter_max_percentage must be in [0.0, 1.0)".to_string(),
            ));
        }

        // Warn about configurations that technically work but defeat the cache
        if self.cache.max_entries == 0 {
            warn!("Cache max entries is 0 - caching effectively disabled");
        }

        if self.cache.document_content.local_ttl_seconds == 0 {
            warn!("Document content local TTL is 0 - every read will miss");
        }

        Ok(())
    }

    /// Log current configuration for debugging
    pub fn log_configuration(&self) {
        info!("Herald Core Configuration:");
        info!("  Cache enabled: {}", self.cache.enabled);
        info!(
            "  Local tier: {} max entries, {} max bytes",
            self.cache.max_entries, self.cache.max_bytes
        );
        match &self.cache.shared_tier_url {
            Some(url) => info!("  Shared tier: {}", url),
            None => info!("  Shared tier: not configured (local-only operation)"),
        }
        info!(
            "  Document content: {}s/{}s TTL",
            self.cache.document_content.local_ttl_seconds,
            self.cache.document_content.shared_ttl_seconds
        );
        info!(
            "  Folder metadata: {}s/{}s TTL",
            self.cache.folder_metadata.local_ttl_seconds,
            self.cache.folder_metadata.shared_ttl_seconds
        );
        info!(
            "  Breaker: {} failures to open, {}s reset timeout",
            self.circuit_breakers.default.failure_threshold,
            self.circuit_breakers.default.reset_timeout_seconds
        );
        info!(
            "  Retry: {} retries, {}ms initial delay, x{} backoff",
            self.retry.max_retries, self.retry.initial_delay_ms, self.retry.backoff_multiplier
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_configuration_is_valid() {
        let config = HeraldConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.cache.enabled);
        assert!(config.cache.shared_tier_url.is_none());
    }

    #[test]
    fn test_configuration_uses_rapid_expiry() {
        let config = HeraldConfig::for_test();
        assert!(config.validate().is_ok());
        assert_eq!(config.cache.document_content.local_ttl_seconds, 1);
        assert_eq!(config.circuit_breakers.default.reset_timeout_seconds, 1);
    }

    #[test]
    fn ttl_pair_lookup_by_kind() {
        let settings = CacheSettings::default();
        assert_eq!(
            settings.ttl_pair(CacheKind::DocumentContent).local_ttl_seconds,
            300
        );
        assert_eq!(
            settings.ttl_pair(CacheKind::FolderMetadata).shared_ttl_seconds,
            3600
        );
    }

    #[test]
    fn component_override_falls_back_to_default() {
        let mut settings = CircuitBreakerSettings::default();
        settings.components.insert(
            "issue_tracker".to_string(),
            BreakerSettings {
                failure_threshold: 2,
                ..BreakerSettings::default()
            },
        );

        assert_eq!(settings.for_component("issue_tracker").failure_threshold, 2);
        assert_eq!(settings.for_component("document_store").failure_threshold, 5);
    }

    #[test]
    fn invalid_stale_fraction_is_rejected() {
        let mut config = HeraldConfig::default();
        config.cache.stale_fraction = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn invalid_backoff_multiplier_is_rejected() {
        let mut config = HeraldConfig::default();
        config.retry.backoff_multiplier = 0.5;
        assert!(config.validate().is_err());
    }
}
