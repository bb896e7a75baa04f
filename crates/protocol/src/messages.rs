//! Wire message definitions.
//!
//! Every payload is UTF-8 JSON. Room and voice messages are closed tagged
//! unions keyed on `type`; an unknown tag fails decoding instead of being
//! silently accepted (the transport layer decides whether to drop it).

use crate::{PeerId, ProtocolError, RoomCode};
use serde::{Deserialize, Serialize};

/// Messages carried on a room topic.
///
/// Every variant carries the sender's `id` and display `name`, matching the
/// envelope every peer attaches to its broadcasts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RoomMessage {
    /// Membership announcement, sent on join, on heartbeat, and as an echo
    /// when a new peer is first learned of.
    Presence { id: PeerId, name: String },
    /// Race start broadcast. `start_at` is a ms-epoch timestamp picked by the
    /// triggering peer; every receiver counts down against its own clock.
    StartRace {
        id: PeerId,
        name: String,
        #[serde(rename = "startAt")]
        start_at: u64,
    },
    /// Position update: whole-meter distance and lateral lane offset.
    Pos {
        id: PeerId,
        name: String,
        d: i64,
        x: f64,
    },
}

impl RoomMessage {
    /// Sender identity, common to all variants.
    pub fn sender(&self) -> &PeerId {
        match self {
            RoomMessage::Presence { id, .. }
            | RoomMessage::StartRace { id, .. }
            | RoomMessage::Pos { id, .. } => id,
        }
    }

    /// Sender display name, common to all variants.
    pub fn sender_name(&self) -> &str {
        match self {
            RoomMessage::Presence { name, .. }
            | RoomMessage::StartRace { name, .. }
            | RoomMessage::Pos { name, .. } => name,
        }
    }

    pub fn decode(payload: &[u8]) -> Result<Self, ProtocolError> {
        decode_json(payload)
    }

    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        Ok(serde_json::to_vec(self)?)
    }
}

/// Lightweight room summary broadcast on the global directory topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectorySummary {
    pub room: RoomCode,
    #[serde(default)]
    pub players: usize,
    #[serde(default)]
    pub racing: bool,
}

impl DirectorySummary {
    pub fn decode(payload: &[u8]) -> Result<Self, ProtocolError> {
        decode_json(payload)
    }

    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        Ok(serde_json::to_vec(self)?)
    }
}

/// Voice signaling messages, unicast on a per-peer rtc topic.
///
/// SDP blobs and ICE candidates are opaque strings; this layer only routes
/// them between peers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RtcSignal {
    RtcOffer { sdp: String, from: PeerId },
    RtcAnswer { sdp: String, from: PeerId },
    RtcIce { candidate: String, from: PeerId },
}

impl RtcSignal {
    pub fn from(&self) -> &PeerId {
        match self {
            RtcSignal::RtcOffer { from, .. }
            | RtcSignal::RtcAnswer { from, .. }
            | RtcSignal::RtcIce { from, .. } => from,
        }
    }

    pub fn decode(payload: &[u8]) -> Result<Self, ProtocolError> {
        decode_json(payload)
    }

    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        Ok(serde_json::to_vec(self)?)
    }
}

fn decode_json<'a, T: Deserialize<'a>>(payload: &'a [u8]) -> Result<T, ProtocolError> {
    let text = std::str::from_utf8(payload).map_err(|_| ProtocolError::InvalidUtf8)?;
    Ok(serde_json::from_str(text)?)
}
