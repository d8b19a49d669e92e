//! # Error Handling Module
//!
//! This module defines every failure the balancer can report, using the `thiserror`
//! crate, and maps them onto HTTP status codes for client responses.
//!
//! ## Error Taxonomy
//!
//! - [`AppendError`]: returned while populating the destination pool
//!   (empty URL, negative weight). The caller decides whether to abort startup.
//! - [`SelectionError`]: returned per request by a selector. These are values,
//!   never panics; the dispatcher turns them into a 503 response.
//! - [`BalancerError`]: the crate-wide error, wrapping the two above plus
//!   configuration, bind, lifecycle and shutdown failures.
//!
//! ## The `?` Operator
//! `From` conversions are provided so `?` lifts an `AppendError` or a
//! `SelectionError` into a `BalancerError` without ceremony:
//! ```rust,ignore
//! fn build(pool: &WeightedRoundRobin) -> BalancerResult<String> {
//!     pool.append_destination("http://h1", 2)?;
//!     Ok(pool.next()?)
//! }
//! ```

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

/// Main result type used throughout the balancer
pub type BalancerResult<T> = Result<T, BalancerError>;

/// Failures when adding a destination to the pool
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AppendError {
    /// Destination URLs must be non-empty
    #[error("destination URL can't be empty")]
    EmptyUrl,

    /// Weights must be within `0..=u32::MAX`; zero is normalized to the default weight
    #[error("destination weight must be >= 0, got {weight}")]
    InvalidWeight { weight: i64 },
}

/// Failures when choosing the next destination
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SelectionError {
    /// The pool is empty
    #[error("no destinations in the pool")]
    NoDestinations,

    /// Every destination carries a weight of zero
    #[error("all destinations have 0 weight")]
    AllZeroWeight,
}

/// Crate-wide error type
///
/// Each variant represents a different category of failure. The `#[error("...")]`
/// attribute implements `Display` with the given message.
#[derive(Debug, Error, Clone)]
pub enum BalancerError {
    /// Configuration-related errors (unreadable file, malformed JSON, invalid values)
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// A destination was rejected while building the pool
    #[error("Destination rejected: {0}")]
    Append(#[from] AppendError),

    /// The selector could not choose a destination
    #[error("Selection failed: {0}")]
    Selection(#[from] SelectionError),

    /// The listener could not be bound
    #[error("Failed to bind {address}: {message}")]
    Bind { address: String, message: String },

    /// An operation was attempted in the wrong lifecycle state
    #[error("Lifecycle error: {message}")]
    Lifecycle { message: String },

    /// In-flight requests did not drain before the deadline
    #[error("Shutdown timed out after {timeout_ms}ms")]
    ShutdownTimeout { timeout_ms: u64 },

    /// I/O errors
    #[error("I/O error: {message}")]
    Io { message: String },

    /// JSON serialization/deserialization errors
    #[error("JSON error: {message}")]
    Json { message: String },

    /// Internal server errors for unexpected failures
    #[error("Internal server error: {message}")]
    Internal { message: String },
}

impl BalancerError {
    /// Create a configuration error with a custom message
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a lifecycle error with a custom message
    pub fn lifecycle<S: Into<String>>(message: S) -> Self {
        Self::Lifecycle {
            message: message.into(),
        }
    }

    /// Create an internal error with a custom message
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Get the appropriate HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Selection(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Append(_) => StatusCode::BAD_REQUEST,
            Self::Json { .. } => StatusCode::BAD_REQUEST,
            Self::ShutdownTimeout { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Self::Configuration { .. }
            | Self::Bind { .. }
            | Self::Lifecycle { .. }
            | Self::Io { .. }
            | Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get a string representation of the error type for API responses
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::Configuration { .. } => "configuration_error",
            Self::Append(_) => "append_error",
            Self::Selection(SelectionError::NoDestinations) => "no_destinations",
            Self::Selection(SelectionError::AllZeroWeight) => "all_zero_weight",
            Self::Bind { .. } => "bind_error",
            Self::Lifecycle { .. } => "lifecycle_error",
            Self::ShutdownTimeout { .. } => "shutdown_timeout",
            Self::Io { .. } => "io_error",
            Self::Json { .. } => "json_error",
            Self::Internal { .. } => "internal_error",
        }
    }
}

impl From<std::io::Error> for BalancerError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for BalancerError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json {
            message: err.to_string(),
        }
    }
}

/// Converts errors into JSON error responses so handlers can return them directly
impl IntoResponse for BalancerError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let error_response = json!({
            "error": {
                "code": status.as_u16(),
                "message": self.to_string(),
                "type": self.error_type(),
            }
        });

        (status, Json(error_response)).into_response()
    }
}
