//! Error types for the gateway core.
//!
//! Mirrors the layered error hierarchy a rate-limiting library needs: a
//! narrow KV-backend error, a configuration error, and a top-level gateway
//! error that middleware can map straight onto an HTTP status.

use thiserror::Error;

/// Result type used throughout the gateway core.
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Top-level error for gateway operations.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// KV backend error (transient by nature — see `KvError`).
    #[error("kv error: {0}")]
    Kv(#[from] KvError),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The upstream returned a non-2xx status or failed to respond in time.
    #[error("upstream error: {message}")]
    Upstream {
        /// HTTP status to surface to the client, if known.
        status: Option<u16>,
        /// Human-readable detail.
        message: String,
    },

    /// Any unhandled failure in the pipeline.
    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// Create an upstream error carrying a specific status.
    pub fn upstream(status: u16, message: impl Into<String>) -> Self {
        Self::Upstream {
            status: Some(status),
            message: message.into(),
        }
    }

    /// Create an upstream error for a timeout or connection failure.
    pub fn upstream_unreachable(message: impl Into<String>) -> Self {
        Self::Upstream {
            status: None,
            message: message.into(),
        }
    }
}

/// Errors surfaced by a `KvStore` implementation.
///
/// Every KV operation "may fail with a transient error" per the adapter
/// contract; callers that can tolerate staleness (rate limiter reads) are
/// expected to fail open rather than propagate this upward.
#[derive(Debug, Error)]
pub enum KvError {
    /// The backend rejected or failed to complete the operation.
    #[error("{message}")]
    OperationFailed {
        /// Error detail.
        message: String,
        /// Whether a retry is likely to succeed.
        retryable: bool,
    },

    /// A stored value could not be decoded back into the expected shape.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl KvError {
    /// Construct an operation-failed error.
    pub fn operation_failed(message: impl Into<String>, retryable: bool) -> Self {
        Self::OperationFailed {
            message: message.into(),
            retryable,
        }
    }

    /// Whether this error is worth retrying.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::OperationFailed { retryable, .. } => *retryable,
            Self::Serialization(_) => false,
        }
    }
}

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A rate limit / quota configuration value was invalid.
    #[error("invalid quota: {0}")]
    InvalidQuota(String),

    /// A required environment variable or field was missing.
    #[error("missing required configuration: {0}")]
    MissingRequired(String),

    /// An environment variable was present but malformed.
    #[error("invalid configuration value for {field}: {message}")]
    InvalidValue {
        /// Field name.
        field: String,
        /// Why it was rejected.
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kv_error_retryable() {
        let err = KvError::operation_failed("timeout", true);
        assert!(err.is_retryable());

        let err = KvError::Serialization("bad json".into());
        assert!(!err.is_retryable());
    }

    #[test]
    fn gateway_error_display() {
        let err = GatewayError::upstream(502, "bad gateway");
        assert!(err.to_string().contains("upstream error"));
    }
}
