//! Error types for model definition and query construction.

use thiserror::Error;

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// Anything raised by sqlx while executing a statement.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Record serialization or row deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The declared model name has no letters left to build a table name from.
    #[error("Cannot derive a table name from `{0}`: no letters remain after stripping")]
    NamingPrecondition(String),

    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),
}

impl Error {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn invalid_record(msg: impl Into<String>) -> Self {
        Self::InvalidRecord(msg.into())
    }

    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }
}
