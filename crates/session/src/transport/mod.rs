//! Signaling transport.
//!
//! A transport is a connection to the shared pub/sub broker. Sends are
//! fire-and-forget; inbound traffic is delivered in arrival order on an
//! unbounded channel. There is no ordering guarantee across topics and no
//! automatic reconnect: once a connection is lost the session is dead until
//! the user restarts the join flow.

pub mod memory;
pub mod ws;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Transport failures. Connection loss after establishment is reported as a
/// [`TransportEvent::Lost`] on the inbound channel, not as an error here.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Cannot connect to broker: {0}")]
    Connect(String),

    #[error("Connection closed")]
    Closed,

    /// The relay protocol carries payloads as JSON text; arbitrary bytes
    /// cannot be published.
    #[error("Payload is not valid UTF-8 text")]
    NonText,
}

/// A message received on a subscribed topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inbound {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// Inbound notifications from a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Message(Inbound),
    /// Connection lost after establishment. Terminal.
    Lost { reason: String },
}

/// A live broker connection.
///
/// All three operations are non-blocking; they enqueue work for the
/// connection's writer and return immediately.
pub trait Transport: Send {
    fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), TransportError>;
    fn subscribe(&self, topic: &str) -> Result<(), TransportError>;
    fn unsubscribe(&self, topic: &str) -> Result<(), TransportError>;
}

/// Frames exchanged with the relay. Client sends `hello`/`sub`/`unsub`/`pub`;
/// the relay sends `msg`. Payloads ride along as UTF-8 JSON text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Envelope {
    Hello { id: String },
    Sub { topic: String },
    Unsub { topic: String },
    Pub { topic: String, payload: String },
    Msg { topic: String, payload: String },
}

impl Envelope {
    pub fn decode(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn encode(&self) -> String {
        // Enum of strings; serialization cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_roundtrip() {
        let frame = Envelope::Pub {
            topic: "geargrinder/lob/RACE1".to_string(),
            payload: r#"{"type":"presence"}"#.to_string(),
        };
        let decoded = Envelope::decode(&frame.encode()).unwrap();
        assert_eq!(decoded, frame);
    }

    #[test]
    fn test_envelope_unknown_op_rejected() {
        assert!(Envelope::decode(r#"{"op":"shout","topic":"t"}"#).is_err());
    }
}
