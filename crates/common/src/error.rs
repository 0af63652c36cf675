//! Common error types for the POS telemetry components.

use std::fmt;

/// A specialized Result type for telemetry operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for telemetry operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Healthcheck error: {0}")]
    Healthcheck(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Unknown error: {0}")]
    Other(String),
}

impl Error {
    /// Create a new database error.
    pub fn database(msg: impl fmt::Display) -> Self {
        Error::Database(msg.to_string())
    }

    /// Create a new HTTP error.
    pub fn http(msg: impl fmt::Display) -> Self {
        Error::Http(msg.to_string())
    }

    /// Create a new healthcheck error.
    pub fn healthcheck(msg: impl fmt::Display) -> Self {
        Error::Healthcheck(msg.to_string())
    }

    /// Create a new configuration error.
    pub fn config(msg: impl fmt::Display) -> Self {
        Error::Config(msg.to_string())
    }

    /// Create a new other error.
    pub fn other(msg: impl fmt::Display) -> Self {
        Error::Other(msg.to_string())
    }

    /// Short machine-friendly name of the variant, used as `error.name` in log entries.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Io(_) => "IoError",
            Error::Database(_) => "DatabaseError",
            Error::Http(_) => "HttpError",
            Error::Timeout(_) => "TimeoutError",
            Error::Healthcheck(_) => "HealthcheckError",
            Error::Config(_) => "ConfigError",
            Error::Serialization(_) => "SerializationError",
            Error::Other(_) => "Error",
        }
    }
}
