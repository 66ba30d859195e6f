//! # Error Handling
//!
//! Centralized error types for Trestle core.
//! Uses `thiserror` for ergonomic error definitions.
//!
//! Routing and handler errors never escape `Router::dispatch`: they are
//! converted to responses at the router boundary with [`Error::into_response`].
//! Database errors propagate to the caller as `Err` values.

use crate::response::Response;
use crate::validation::ValidationErrors;
use thiserror::Error;

/// Result type alias for Trestle operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for the Trestle toolkit
#[derive(Error, Debug)]
pub enum Error {
    /// Server failed to bind to the specified address
    #[error("Failed to bind server to {address}: {source}")]
    BindError {
        /// The address we tried to bind to
        address: String,
        /// The underlying IO error
        #[source]
        source: std::io::Error,
    },

    /// No route matches the requested method and path
    #[error("Route not found {method} {path}")]
    RouteNotFound {
        /// Request method
        method: String,
        /// The path that wasn't matched
        path: String,
    },

    /// A handler or middleware reference could not be resolved
    #[error("{reason}")]
    HandlerResolution {
        /// The reference as registered (e.g. `"Users@show"`)
        reference: String,
        /// Human readable reason
        reason: String,
    },

    /// Invalid route pattern provided
    #[error("Invalid route pattern: {pattern}: {reason}")]
    InvalidRoutePattern {
        /// The invalid pattern
        pattern: String,
        /// Reason for invalidity
        reason: String,
    },

    /// One or more field rules failed
    #[error("Validation failed")]
    Validation(ValidationErrors),

    /// Configuration is missing or malformed
    #[error("Configuration error: {message}")]
    Config {
        /// What was wrong
        message: String,
    },

    /// The configured driver is not one of `mysql`, `pgsql`, `sqlite`
    #[error("Unsupported database driver: {driver}")]
    UnsupportedDriver {
        /// The driver value from configuration
        driver: String,
    },

    /// Adapter failed to establish (or lost) its connection
    #[error("Database connection failed ({driver}): {message}")]
    Connection {
        /// Driver name
        driver: &'static str,
        /// Context plus the driver's message
        message: String,
    },

    /// Operation attempted on an adapter that is not connected
    #[error("Database connection not established")]
    NotConnected,

    /// Builder state cannot be rendered into a safe statement
    #[error("Query error: {message}")]
    Query {
        /// What was wrong with the query
        message: String,
    },

    /// Transaction misuse (nested begin, commit without begin)
    #[error("Transaction error: {message}")]
    Transaction {
        /// What was wrong
        message: String,
    },

    /// Statement execution failed
    #[error("Database error: {message}")]
    Database {
        /// Error message from database
        message: String,
    },

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Request payload too large
    #[error("Payload too large: limit={limit} bytes, received={actual} bytes")]
    PayloadTooLarge {
        /// Max allowed size
        limit: usize,
        /// Actual size
        actual: usize,
    },
}

impl Error {
    /// Build a `Query` error
    pub fn query(message: impl Into<String>) -> Self {
        Self::Query {
            message: message.into(),
        }
    }

    /// Build a `Transaction` error
    pub fn transaction(message: impl Into<String>) -> Self {
        Self::Transaction {
            message: message.into(),
        }
    }

    /// Build a `Config` error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// HTTP status code this error is reported with
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::RouteNotFound { .. } => 404,
            Self::Validation(_) | Self::Json(_) => 400,
            Self::PayloadTooLarge { .. } => 413,
            _ => 500,
        }
    }

    /// Render the error as a structured error envelope
    #[must_use]
    pub fn into_response(self) -> Response {
        match self {
            Self::RouteNotFound { path, .. } => {
                Response::not_found(format!("Route not found {path}"))
            }
            Self::Validation(errors) => Response::validation_failed(&errors),
            other => {
                let status = other.status_code();
                Response::error(other.to_string(), status)
            }
        }
    }
}

impl From<ValidationErrors> for Error {
    fn from(errors: ValidationErrors) -> Self {
        Self::Validation(errors)
    }
}
