//! Shared protocol crate for gear-grinder.
//!
//! This crate contains:
//! - Wire message definitions (room, directory, and voice signaling)
//! - Topic addressing helpers
//! - Shared types (PeerId, RoomCode, Color)

mod error;
mod ident;
pub mod messages;
pub mod topics;

pub use error::ProtocolError;
pub use ident::{PeerId, RoomCode};

/// Maximum roster size per room, including the local player.
pub const MAX_PLAYERS_PER_ROOM: usize = 10;

/// Display names are truncated to this many characters on insert.
pub const MAX_NAME_LEN: usize = 12;

/// RGB color used for rider bikes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Build from a packed `0xRRGGBB` value.
    pub const fn from_hex(rgb: u32) -> Self {
        Self {
            r: ((rgb >> 16) & 0xFF) as u8,
            g: ((rgb >> 8) & 0xFF) as u8,
            b: (rgb & 0xFF) as u8,
        }
    }
}

/// Bike colors assigned to riders by join order.
pub const PLAYER_COLORS: [Color; 10] = [
    Color::from_hex(0xFF6B3D),
    Color::from_hex(0x4DFFB8),
    Color::from_hex(0x4DB8FF),
    Color::from_hex(0xFF4D8B),
    Color::from_hex(0xFFCC00),
    Color::from_hex(0xAA44FF),
    Color::from_hex(0x44FFAA),
    Color::from_hex(0xFF4444),
    Color::from_hex(0x44AAFF),
    Color::from_hex(0xFFAA44),
];

/// Color for the Nth distinct joiner (0-indexed). Wraps past the palette.
pub fn color_for_join_order(join_order: usize) -> Color {
    PLAYER_COLORS[join_order % PLAYER_COLORS.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_color_from_hex() {
        let c = Color::from_hex(0xFF6B3D);
        assert_eq!(c, Color::new(0xFF, 0x6B, 0x3D));
    }

    #[test]
    fn test_color_wraps_past_palette() {
        assert_eq!(color_for_join_order(0), color_for_join_order(10));
        assert_eq!(color_for_join_order(3), color_for_join_order(13));
    }
}
