//! Client error types

use thiserror::Error;

/// Client error type
#[derive(Debug, Error)]
pub enum ClientError {
    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Server rejected the request (error envelope)
    #[error("API error {code}: {message}")]
    Api { code: String, message: String },

    /// Table access denied (another device holds the session)
    #[error("Access denied: {0}")]
    Denied(String),

    /// Bus transport failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// Request timed out
    #[error("Request timed out")]
    Timeout,

    /// Connection closed
    #[error("Connection closed")]
    Closed,

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for client operations
pub type ClientResult<T> = Result<T, ClientError>;
