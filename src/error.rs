use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum HeraldError {
    CacheError(String),
    ResilienceError(String),
    ConfigurationError(String),
    ValidationError(String),
}

impl fmt::Display for HeraldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeraldError::CacheError(msg) => write!(f, "Cache error: {msg}"),
            HeraldError::ResilienceError(msg) => write!(f, "Resilience error: {msg}"),
            HeraldError::ConfigurationError(msg) => write!(f, "Configuration error: {msg}"),
            HeraldError::ValidationError(msg) => write!(f, "Validation error: {msg}"),
        }
    }
}

impl std::error::Error for HeraldError {}

pub type Result<T> = std::result::Result<T, HeraldError>;
