//! Error Handling Module
//!
//! A single error type covers every failure the relay can surface:
//! - request validation (rejected before any backend call)
//! - transport failures against the model server
//! - errors reported by the model server itself, either as an HTTP status or
//!   as an `error` field inside a decoded stream line
//! - parse and internal failures
//!
//! Malformed stream lines never become a `RelayError`; the line decoder drops
//! them silently.
//!
//! # Example
//!
//! ```rust,ignore
//! use ollama_relay::error::{ErrorCategory, RelayError};
//!
//! let error = RelayError::validation("Model name is required");
//! assert_eq!(error.category(), ErrorCategory::Client);
//! assert!(!error.is_retryable());
//! ```

use std::time::Duration;

use thiserror::Error;

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, RelayError>;

/// Coarse classification used for logging and status mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// The caller sent something the relay refuses to forward.
    Client,
    /// The model server could not be reached or the connection dropped.
    Network,
    /// The model server answered, but with a failure.
    Backend,
    /// A payload could not be decoded.
    Parsing,
    /// Everything else.
    Internal,
}

/// Errors produced by the relay.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RelayError {
    /// Missing or invalid request fields.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Payload exceeds a configured size bound.
    #[error("Payload too large: {size} bytes (limit {limit})")]
    PayloadTooLarge { size: usize, limit: usize },

    /// Backend unreachable, or the connection failed mid-stream.
    #[error("Transport error: {0}")]
    Transport(String),

    /// A bounded request ran out of time.
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// The backend answered with a non-success HTTP status.
    #[error("Backend error {status}: {message}")]
    Backend { status: u16, message: String },

    /// A decoded stream line carried an `error` field.
    #[error("{0}")]
    BackendReported(String),

    /// A response body could not be interpreted.
    #[error("Parse error: {0}")]
    Parse(String),

    /// JSON (de)serialization failure.
    #[error("JSON error: {0}")]
    Json(String),

    /// The stream ended in a way the consumer cannot recover from.
    #[error("Stream error: {0}")]
    Stream(String),

    /// Invalid configuration value.
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O failure (binding, file logging).
    #[error("IO error: {0}")]
    Io(String),

    /// Unexpected internal failure.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl RelayError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    pub fn backend(status: u16, msg: impl Into<String>) -> Self {
        Self::Backend {
            status,
            message: msg.into(),
        }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Convert a reqwest failure of a call bounded by `timeout`.
    ///
    /// Covers both sending and reading the body, which share the
    /// per-request deadline.
    pub fn from_reqwest(err: reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            Self::Timeout(timeout)
        } else {
            Self::from(err)
        }
    }

    /// Classify the error.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Validation(_) | Self::PayloadTooLarge { .. } => ErrorCategory::Client,
            Self::Transport(_) | Self::Timeout(_) | Self::Stream(_) => ErrorCategory::Network,
            Self::Backend { .. } | Self::BackendReported(_) => ErrorCategory::Backend,
            Self::Parse(_) | Self::Json(_) => ErrorCategory::Parsing,
            Self::Config(_) | Self::Io(_) | Self::Internal(_) => ErrorCategory::Internal,
        }
    }

    /// Whether a user-initiated retry has a reasonable chance of succeeding.
    ///
    /// Advisory only. The relay itself never retries.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) | Self::Timeout(_) | Self::Stream(_) => true,
            Self::Backend { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }

    /// HTTP status the gateway answers with for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Validation(_) => 400,
            Self::PayloadTooLarge { .. } => 413,
            Self::Timeout(_) => 504,
            _ => 500,
        }
    }

    /// Message suitable for showing to an end user.
    ///
    /// Backend-reported errors are surfaced verbatim.
    pub fn user_message(&self) -> String {
        match self {
            Self::BackendReported(msg) | Self::Validation(msg) => msg.clone(),
            Self::Backend { message, .. } if !message.is_empty() => message.clone(),
            other => other.to_string(),
        }
    }
}

impl From<reqwest::Error> for RelayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            // reqwest does not report the configured duration
            Self::Timeout(crate::config::defaults::REQUEST_TIMEOUT)
        } else if err.is_decode() {
            Self::Parse(err.to_string())
        } else {
            Self::Transport(err.to_string())
        }
    }
}

impl From<serde_json::Error> for RelayError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err.to_string())
    }
}

impl From<std::io::Error> for RelayError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
