//! Error types for the SBORR client.

use thiserror::Error;

/// Result type alias using the SBORR Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for SBORR client operations.
#[derive(Error, Debug)]
pub enum Error {
    /// The data API rejected a query or mutation
    #[error("Backend error: {0}")]
    Backend(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Blob storage operation failed
    #[error("Storage error: {0}")]
    Storage(String),

    /// Auth provider rejected the call
    #[error("Auth error: {0}")]
    Auth(String),

    /// Authentication required or session missing
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Forbidden (authenticated but not allowed)
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// HTTP/network request failed
    #[error("Request error: {0}")]
    Request(String),

    /// Realtime channel failed
    #[error("Realtime error: {0}")]
    Realtime(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// File I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// The message without the category prefix, as shown to the user.
    pub fn message(&self) -> String {
        match self {
            Error::Backend(m)
            | Error::NotFound(m)
            | Error::Storage(m)
            | Error::Auth(m)
            | Error::Unauthorized(m)
            | Error::Forbidden(m)
            | Error::InvalidInput(m)
            | Error::Request(m)
            | Error::Realtime(m)
            | Error::Serialization(m)
            | Error::Config(m)
            | Error::Internal(m) => m.clone(),
            Error::Io(e) => e.to_string(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Request(e.to_string())
    }
}
