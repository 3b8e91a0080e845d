//! Upstream failure classification.
//!
//! The retry executor decides per-error whether another attempt is
//! worthwhile. That decision is driven by a small category taxonomy rather
//! than string matching: network-class errors, rate-limit signals, timeouts
//! and 5xx-class errors are retryable; other 4xx-class client errors and
//! validation failures are permanent and surface immediately.

use serde::{Deserialize, Serialize};

/// Primary categories for upstream failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Connection-level failure - retry with backoff
    Network,

    /// The operation ran out of time - retry with backoff
    Timeout,

    /// The upstream asked us to slow down - retry with backoff
    RateLimit,

    /// 5xx-class upstream fault - may succeed on retry
    ServerError,

    /// 4xx-class client fault (other than rate limiting) - will never
    /// succeed if retried
    ClientError,

    /// The request itself is malformed - requires caller intervention
    Validation,

    /// A circuit breaker rejected the call - retrying before the cooldown
    /// elapses cannot help
    Isolation,

    /// Anything unrecognized - treated as permanent to be safe
    Internal,
}

impl ErrorCategory {
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            ErrorCategory::Network
                | ErrorCategory::Timeout
                | ErrorCategory::RateLimit
                | ErrorCategory::ServerError
        )
    }
}

/// Implemented by error types the retry executor can make decisions about
pub trait ErrorClassification {
    fn category(&self) -> ErrorCategory;

    fn is_retryable(&self) -> bool {
        self.category().is_retryable()
    }
}

/// Canonical classified failure from one of the bot's upstream dependencies
/// (chat platform, issue tracker, document store, language model).
#[derive(Debug, Clone, thiserror::Error)]
pub enum UpstreamError {
    #[error("network error talking to {service}: {message}")]
    Network { service: String, message: String },

    #[error("{service} timed out after {timeout_ms}ms")]
    Timeout { service: String, timeout_ms: u64 },

    #[error("{service} rate limited the request")]
    RateLimited {
        service: String,
        retry_after_ms: Option<u64>,
    },

    #[error("{service} returned server error {status}: {message}")]
    Server {
        service: String,
        status: u16,
        message: String,
    },

    #[error("{service} rejected the request with status {status}: {message}")]
    Client {
        service: String,
        status: u16,
        message: String,
    },

    #[error("invalid request for {service}: {message}")]
    Validation { service: String, message: String },
}

impl UpstreamError {
    /// Classify an HTTP-shaped upstream response status
    pub fn from_status(service: impl Into<String>, status: u16, message: impl Into<String>) -> Self {
        let service = service.into();
        match status {
            429 => UpstreamError::RateLimited {
                service,
                retry_after_ms: None,
            },
            500..=599 => UpstreamError::Server {
                service,
                status,
                message: message.into(),
            },
            _ => UpstreamError::Client {
                service,
                status,
                message: message.into(),
            },
        }
    }

    pub fn service(&self) -> &str {
        match self {
            UpstreamError::Network { service, .. }
            | UpstreamError::Timeout { service, .. }
            | UpstreamError::RateLimited { service, .. }
            | UpstreamError::Server { service, .. }
            | UpstreamError::Client { service, .. }
            | UpstreamError::Validation { service, .. } => service,
        }
    }
}

impl ErrorClassification for UpstreamError {
    fn category(&self) -> ErrorCategory {
        match self {
            UpstreamError::Network { .. } => ErrorCategory::Network,
            UpstreamError::Timeout { .. } => ErrorCategory::Timeout,
            UpstreamError::RateLimited { .. } => ErrorCategory::RateLimit,
            UpstreamError::Server { .. } => ErrorCategory::ServerError,
            UpstreamError::Client { .. } => ErrorCategory::ClientError,
            UpstreamError::Validation { .. } => ErrorCategory::Validation,
        }
    }
}
