//! Error types for the chat session.
//!
//! `ChatError` is what callers of [`crate::Session`] see. `DecodeError` stays
//! mostly internal: the dispatcher logs and drops frames that fail to decode.

use thiserror::Error;

/// Result alias used across the crate.
pub type Result<T, E = ChatError> = std::result::Result<T, E>;

/// Errors surfaced by the session and its transport.
#[derive(Debug, Error)]
pub enum ChatError {
    /// Dial or transport failure.
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Web socket is already open")]
    AlreadyOpen,

    #[error("Session is read-only")]
    ReadOnly,

    #[error("Connection not established")]
    NotConnected,

    /// Malformed payload for a known frame tag.
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Malformed frame shape (e.g. missing tag/payload separator).
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Invalid arguments when building or configuring a session.
    #[error("Invalid session setup: {0}")]
    Construction(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ChatError {
    /// True for errors coming from the underlying connection.
    pub fn is_connection(&self) -> bool {
        matches!(self, ChatError::Connection(_))
    }
}

/// Errors produced while decoding a frame payload.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("invalid JSON payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("payload is not valid UTF-8")]
    Utf8,

    #[error("timestamp out of range: {0}")]
    Timestamp(i64),
}
