//! Peer and room identifiers.

use crate::ProtocolError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque peer identity, unique per session and stable for its lifetime.
///
/// Generated identities look like `RIDER_4821`. Anonymous directory-scan
/// connections use a separate `SCAN_` prefix so they never collide with a
/// rider already in a room.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(String);

impl PeerId {
    /// Generate a fresh rider identity.
    pub fn generate() -> Self {
        use rand::Rng;
        let mut rng = rand::rng();
        Self(format!("RIDER_{}", rng.random_range(0..10_000)))
    }

    /// Generate an anonymous identity for a directory-scan connection.
    pub fn generate_scan() -> Self {
        use rand::Rng;
        let mut rng = rand::rng();
        Self(format!("SCAN_{}", rng.random_range(0..10_000)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Default display name: the id with the `RIDER_` prefix compressed to `R`.
    pub fn default_name(&self) -> String {
        if let Some(suffix) = self.0.strip_prefix("RIDER_") {
            format!("R{suffix}")
        } else {
            self.0.chars().take(8).collect()
        }
    }
}

impl From<&str> for PeerId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for PeerId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Room code: short uppercase string used as a topic namespace.
///
/// Input is case-normalized; the only validation is non-emptiness.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomCode(String);

impl RoomCode {
    pub fn new(code: &str) -> Result<Self, ProtocolError> {
        let trimmed = code.trim();
        if trimmed.is_empty() {
            return Err(ProtocolError::EmptyRoomCode);
        }
        Ok(Self(trimmed.to_uppercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_room_code_normalized() {
        let code = RoomCode::new("  race1 ").unwrap();
        assert_eq!(code.as_str(), "RACE1");
    }

    #[test]
    fn test_room_code_empty_rejected() {
        assert!(RoomCode::new("   ").is_err());
    }

    #[test]
    fn test_peer_id_ordering_is_lexicographic() {
        assert!(PeerId::from("AAA") < PeerId::from("BBB"));
    }

    #[test]
    fn test_default_name_compresses_prefix() {
        assert_eq!(PeerId::from("RIDER_42").default_name(), "R42");
        assert_eq!(PeerId::from("SOMEBODYELSE").default_name(), "SOMEBODY");
    }
}
