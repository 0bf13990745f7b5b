//! Error types for the ESTA cache layer
//!
//! Provides structured error types for the store client, cache service,
//! and circuit breaker. Deserialization problems are deliberately absent:
//! the cache treats undecodable payloads as misses instead of errors.

use std::time::Duration;
use thiserror::Error;

/// Unified error type for the cache layer
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Internal Errors
    // =========================================================================
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    // =========================================================================
    // Store Errors
    // =========================================================================
    #[error("Store transport error: {0}")]
    StoreTransport(#[from] reqwest::Error),

    #[error("Store rejected command {command}: {reason}")]
    StoreCommand { command: String, reason: String },

    #[error("Unexpected store response to {command}: {response}")]
    StoreResponse { command: String, response: String },

    #[error("Invalid TTL for key {key}: must be greater than zero")]
    InvalidTtl { key: String },

    #[error("Invalid {component} '{value}' in key pattern: {reason}")]
    InvalidKeyComponent {
        component: &'static str,
        value: String,
        reason: &'static str,
    },

    // =========================================================================
    // Serialization Errors
    // =========================================================================
    #[error("Failed to encode cache payload: {0}")]
    Encode(#[from] serde_json::Error),

    // =========================================================================
    // Circuit Breaker Errors
    // =========================================================================
    #[error(transparent)]
    CircuitOpen(#[from] crate::circuit::CircuitOpenError),

    #[error("Circuit not registered: {name}")]
    CircuitNotFound { name: String },

}

/// Suggested caller reaction to an error
///
/// This layer never retries on its own; the action is advice for callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorAction {
    /// Retry with exponential backoff
    RetryWithBackoff,
    /// Retry after specific duration
    RetryAfter(Duration),
    /// Don't retry, the request itself is wrong
    NoRetry,
}

impl Error {
    /// Determine what action a caller should take for this error
    pub fn action(&self) -> ErrorAction {
        match self {
            // Transient errors - retry with backoff
            Error::StoreTransport(_) => ErrorAction::RetryWithBackoff,

            // Circuit cool-down - wait it out
            Error::CircuitOpen(open) => {
                ErrorAction::RetryAfter(Duration::from_millis(open.remaining_ms))
            }

            // Programmer/configuration errors - don't retry automatically
            Error::Configuration(_)
            | Error::InvalidTtl { .. }
            | Error::InvalidKeyComponent { .. }
            | Error::Encode(_)
            | Error::CircuitNotFound { .. }
            | Error::StoreCommand { .. } => ErrorAction::NoRetry,

            // All other errors - retry with backoff
            _ => ErrorAction::RetryWithBackoff,
        }
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        !matches!(self.action(), ErrorAction::NoRetry)
    }

    /// Check if this error is transient
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::StoreTransport(_) | Error::CircuitOpen(_)
        )
    }
}

/// Result type alias for the cache layer
pub type Result<T> = std::result::Result<T, Error>;
