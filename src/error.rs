//! Error types and handling for Utility Costs
//!
//! This module defines the error types used throughout the application.
//! The three rate-fetch failures (`Connection`, `Http`, `Schema`) are the
//! ones the coordinator turns into a stale-data signal; everything else is
//! plumbing around configuration, persistence and the web API.

use thiserror::Error;

/// Result type alias for Utility Costs operations
pub type Result<T> = std::result::Result<T, UtilityCostsError>;

/// Main error type for Utility Costs
#[derive(Debug, Error)]
pub enum UtilityCostsError {
    /// Configuration-related errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Transport failure or timeout while talking to the rates backend
    #[error("Connection error: {message}")]
    Connection { message: String },

    /// Backend answered with a non-success status
    #[error("HTTP {status} from {url}: {message}")]
    Http {
        status: u16,
        url: String,
        message: String,
    },

    /// Response body was not the JSON object we expected
    #[error("Schema error: {message}")]
    Schema { message: String },

    /// HTTP/Web server errors
    #[error("Web server error: {message}")]
    Web { message: String },

    /// Serialization/deserialization errors
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// File I/O errors
    #[error("I/O error: {message}")]
    Io { message: String },

    /// Validation errors
    #[error("Validation error: {field} - {message}")]
    Validation { field: String, message: String },

    /// A config entry with the same unique id already exists
    #[error("Already configured: {unique_id}")]
    AlreadyConfigured { unique_id: String },

    /// Lookup of an unknown config entry or setup flow
    #[error("Not found: {message}")]
    NotFound { message: String },
}

impl UtilityCostsError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a new connection error
    pub fn connection<S: Into<String>>(message: S) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Create a new HTTP status error
    pub fn http<U: Into<String>, S: Into<String>>(status: u16, url: U, message: S) -> Self {
        Self::Http {
            status,
            url: url.into(),
            message: message.into(),
        }
    }

    /// Create a new schema error
    pub fn schema<S: Into<String>>(message: S) -> Self {
        Self::Schema {
            message: message.into(),
        }
    }

    /// Create a new web error
    pub fn web<S: Into<String>>(message: S) -> Self {
        Self::Web {
            message: message.into(),
        }
    }

    /// Create a new validation error
    pub fn validation<S: Into<String>>(field: S, message: S) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a new I/O error
    pub fn io<S: Into<String>>(message: S) -> Self {
        Self::Io {
            message: message.into(),
        }
    }

    /// Create a new not-found error
    pub fn not_found<S: Into<String>>(message: S) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    /// True for the failures a rates fetch can produce
    pub fn is_fetch_error(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. } | Self::Http { .. } | Self::Schema { .. }
        )
    }

    /// HTTP status carried by an `Http` error
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<std::io::Error> for UtilityCostsError {
    fn from(err: std::io::Error) -> Self {
        Self::io(err.to_string())
    }
}

impl From<serde_yaml::Error> for UtilityCostsError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for UtilityCostsError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<reqwest::Error> for UtilityCostsError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::schema(format!("Response is not valid JSON: {}", err))
        } else if err.is_timeout() {
            Self::connection(format!("Request timed out: {}", err))
        } else {
            Self::connection(err.to_string())
        }
    }
}

impl From<chrono::ParseError> for UtilityCostsError {
    fn from(err: chrono::ParseError) -> Self {
        Self::validation("datetime", &err.to_string())
    }
}
