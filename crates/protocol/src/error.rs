//! Protocol error types.

use thiserror::Error;

/// Errors that can occur during message encoding/decoding.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Malformed JSON payload: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Payload is not valid UTF-8")]
    InvalidUtf8,

    #[error("Room code must not be empty")]
    EmptyRoomCode,
}
