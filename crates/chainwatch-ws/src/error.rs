//! Errors for the streaming connection and frame decoding.

use thiserror::Error;

/// Why a frame could not be decoded. Never fatal to the connection.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("frame is not a JSON object")]
    NotObject,

    #[error("notification missing field `{0}`")]
    MissingField(&'static str),
}

/// Why a connection attempt failed or an open connection was lost.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConnectionError {
    #[error("handshake failed: {0}")]
    Handshake(String),

    #[error("handshake timed out after {ms}ms")]
    HandshakeTimeout { ms: u64 },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("closed by peer (code {code}): {reason}")]
    ClosedByPeer { code: u16, reason: String },

    #[error("stream ended")]
    StreamEnded,

    #[error("no pong within {ms}ms")]
    PongTimeout { ms: u64 },

    #[error("closed locally")]
    LocalClose,
}
