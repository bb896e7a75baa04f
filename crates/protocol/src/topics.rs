//! Topic addressing.
//!
//! All traffic flows over three kinds of pub/sub topics:
//! - a single global directory topic for room discovery,
//! - one room topic per room code for presence/start/position messages,
//! - one voice-signaling topic per (room, peer), so offer/answer/ICE traffic
//!   is unicast to its target instead of flooding the room.

use crate::{PeerId, RoomCode};

/// Default topic namespace prefix.
pub const DEFAULT_NAMESPACE: &str = "geargrinder";

/// Global room-directory topic.
pub fn directory(namespace: &str) -> String {
    format!("{namespace}/directory")
}

/// Room topic carrying presence, start_race, and pos messages.
pub fn room(namespace: &str, room: &RoomCode) -> String {
    format!("{namespace}/lob/{room}")
}

/// Per-peer voice signaling topic. Messages published here are addressed to
/// `target` only; each peer subscribes solely to its own rtc topic.
pub fn rtc(namespace: &str, room: &RoomCode, target: &PeerId) -> String {
    format!("{namespace}/rtc/{room}/{target}")
}
