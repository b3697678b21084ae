//! Error types for logbeam.

use thiserror::Error;

/// Result type alias using logbeam's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for logbeam operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Shared store round-trip failed (wraps redis::RedisError)
    #[error("Store error: {0}")]
    Store(#[from] redis::RedisError),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Relay publish or subscribe failed
    #[error("Relay error: {0}")]
    Relay(String),

    /// Work queue error
    #[error("Queue error: {0}")]
    Queue(String),

    /// Rate limiter could not reach its counter store
    #[error("Rate limit error: {0}")]
    RateLimit(String),

    /// Channel sender reported a delivery failure
    #[error("Channel error: {0}")]
    Channel(String),

    /// Realtime hub is not accepting commands
    #[error("Hub error: {0}")]
    Hub(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
