//! Presence and roster: who is in the room.
//!
//! Membership is learned through a flood/gossip protocol: every peer
//! announces itself on join and on the heartbeat, and echoes an announcement
//! whenever it first learns of someone else, so late subscribers converge on
//! the full roster within one heartbeat interval. There is no leave message;
//! absence is inferred from staleness by the replication loop.

use protocol::{Color, MAX_NAME_LEN, MAX_PLAYERS_PER_ROOM, PeerId, color_for_join_order};
use std::collections::HashMap;
use tracing::debug;

use crate::visuals::VisualId;

/// Minimum spacing between presence echoes, guarding against re-broadcast
/// storms when many peers join at once.
pub const ECHO_MIN_INTERVAL_MS: u64 = 250;

/// One rider in the room. Owned exclusively by the [`Roster`].
#[derive(Debug, Clone)]
pub struct PlayerRecord {
    pub id: PeerId,
    pub name: String,
    pub color: Color,
    pub ready: bool,
    /// Latest replicated distance along the course, in meters.
    pub target_distance: f64,
    /// Latest replicated lateral lane offset.
    pub lane_offset: f64,
    /// When the last `pos` update arrived (0 = never).
    pub last_update_ms: u64,
    /// Render representation, created lazily on the first position update.
    pub visual: Option<VisualId>,
    /// Smoothed render position, interpolated toward the targets each tick.
    pub render_x: f64,
    pub render_z: f64,
}

impl PlayerRecord {
    fn new(id: PeerId, name: String, color: Color) -> Self {
        Self {
            id,
            name,
            color,
            ready: true,
            target_distance: 0.0,
            lane_offset: 0.0,
            last_update_ms: 0,
            visual: None,
            render_x: 0.0,
            render_z: 0.0,
        }
    }
}

/// Result of observing a presence announcement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceOutcome {
    /// New peer added; an echo announcement and directory update are due.
    Inserted,
    /// Duplicate announcement; nothing to do.
    AlreadyKnown,
    /// Room at capacity; the announcement was silently dropped.
    RoomFull,
}

/// The room membership table, keyed by peer identity.
pub struct Roster {
    local_id: PeerId,
    players: HashMap<PeerId, PlayerRecord>,
    /// Insertion order, for stable UI listings.
    order: Vec<PeerId>,
    /// Monotonic join counter driving color assignment. Deliberately not the
    /// live roster size, so colors stay deterministic after churn.
    next_join_order: usize,
    last_echo_ms: u64,
}

impl Roster {
    pub fn new(local_id: PeerId) -> Self {
        Self {
            local_id,
            players: HashMap::new(),
            order: Vec::new(),
            next_join_order: 0,
            last_echo_ms: 0,
        }
    }

    pub fn local_id(&self) -> &PeerId {
        &self.local_id
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn contains(&self, id: &PeerId) -> bool {
        self.players.contains_key(id)
    }

    pub fn get(&self, id: &PeerId) -> Option<&PlayerRecord> {
        self.players.get(id)
    }

    /// Create the local player's own record on entering the lobby.
    pub fn insert_local(&mut self, name: &str) {
        let name = normalize_name(name, &self.local_id.clone());
        self.insert(self.local_id.clone(), name);
    }

    /// Handle a presence announcement from `id`.
    pub fn observe_presence(&mut self, id: &PeerId, name: &str) -> PresenceOutcome {
        if *id == self.local_id || self.players.contains_key(id) {
            return PresenceOutcome::AlreadyKnown;
        }
        if self.players.len() >= MAX_PLAYERS_PER_ROOM {
            debug!("Room full, dropping presence from {}", id);
            return PresenceOutcome::RoomFull;
        }
        let name = normalize_name(name, id);
        self.insert(id.clone(), name);
        PresenceOutcome::Inserted
    }

    /// Handle a position update from `id`. A record is bootstrapped if this
    /// peer was never announced (capacity permitting). Returns true if a new
    /// record was created.
    pub fn observe_pos(
        &mut self,
        id: &PeerId,
        name: &str,
        distance: f64,
        lane_offset: f64,
        now_ms: u64,
    ) -> bool {
        if *id == self.local_id {
            return false;
        }
        let inserted = match self.observe_presence(id, name) {
            PresenceOutcome::Inserted => true,
            PresenceOutcome::AlreadyKnown => false,
            PresenceOutcome::RoomFull => return false,
        };
        if let Some(record) = self.players.get_mut(id) {
            record.target_distance = distance;
            record.lane_offset = lane_offset;
            record.last_update_ms = now_ms;
        }
        inserted
    }

    fn insert(&mut self, id: PeerId, name: String) {
        let color = color_for_join_order(self.next_join_order);
        self.next_join_order += 1;
        self.players
            .insert(id.clone(), PlayerRecord::new(id.clone(), name, color));
        self.order.push(id);
    }

    /// Whether an echo announcement may be sent now. Stamps the limiter when
    /// it answers yes.
    pub fn allow_echo(&mut self, now_ms: u64) -> bool {
        if now_ms.saturating_sub(self.last_echo_ms) >= ECHO_MIN_INTERVAL_MS {
            self.last_echo_ms = now_ms;
            true
        } else {
            false
        }
    }

    /// All records in join order.
    pub fn entries(&self) -> Vec<&PlayerRecord> {
        self.order
            .iter()
            .filter_map(|id| self.players.get(id))
            .collect()
    }

    /// Mutable access to every remote record, in join order.
    pub fn remotes_mut(&mut self) -> impl Iterator<Item = &mut PlayerRecord> {
        let local = self.local_id.clone();
        self.players.values_mut().filter(move |p| p.id != local)
    }

    /// Drop every remote record, handing back their visuals for the caller
    /// to release. The local record stays.
    pub fn clear_remotes(&mut self) -> Vec<VisualId> {
        let local = self.local_id.clone();
        let mut visuals = Vec::new();
        self.players.retain(|id, record| {
            if *id == local {
                true
            } else {
                if let Some(v) = record.visual.take() {
                    visuals.push(v);
                }
                false
            }
        });
        self.order.retain(|id| *id == local);
        visuals
    }
}

fn normalize_name(name: &str, id: &PeerId) -> String {
    let trimmed = name.trim();
    let base: String = if trimmed.is_empty() {
        id.as_str().chars().take(8).collect()
    } else {
        trimmed.to_string()
    };
    base.chars().take(MAX_NAME_LEN).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use protocol::PLAYER_COLORS;

    fn roster() -> Roster {
        let mut r = Roster::new(PeerId::from("RIDER_0"));
        r.insert_local("Me");
        r
    }

    #[test]
    fn test_capacity_never_exceeded() {
        let mut r = roster();
        for i in 1..=20 {
            r.observe_presence(&PeerId::from(format!("RIDER_{i}").as_str()), "x");
        }
        assert_eq!(r.len(), MAX_PLAYERS_PER_ROOM);
    }

    #[test]
    fn test_color_follows_join_order() {
        let mut r = Roster::new(PeerId::from("HOST"));
        r.insert_local("host");
        for i in 1..MAX_PLAYERS_PER_ROOM {
            let id = PeerId::from(format!("P{i}").as_str());
            r.observe_presence(&id, "x");
            assert_eq!(
                r.get(&id).unwrap().color,
                PLAYER_COLORS[i % PLAYER_COLORS.len()]
            );
        }
    }

    #[test]
    fn test_duplicate_presence_is_noop() {
        let mut r = roster();
        let id = PeerId::from("RIDER_9");
        assert_eq!(r.observe_presence(&id, "A"), PresenceOutcome::Inserted);
        assert_eq!(r.observe_presence(&id, "B"), PresenceOutcome::AlreadyKnown);
        // First-seen name wins.
        assert_eq!(r.get(&id).unwrap().name, "A");
    }

    #[test]
    fn test_pos_bootstraps_unknown_peer() {
        let mut r = roster();
        let id = PeerId::from("RIDER_5");
        assert!(r.observe_pos(&id, "", 1234.0, 2.2, 50));
        let record = r.get(&id).unwrap();
        assert_eq!(record.target_distance, 1234.0);
        assert_eq!(record.last_update_ms, 50);
        assert_eq!(record.name, "RIDER_5");
    }

    #[test]
    fn test_self_pos_ignored() {
        let mut r = roster();
        assert!(!r.observe_pos(&PeerId::from("RIDER_0"), "Me", 99.0, 0.0, 10));
        let me = r.get(&PeerId::from("RIDER_0")).unwrap();
        assert_eq!(me.target_distance, 0.0);
        assert_eq!(me.last_update_ms, 0);
    }

    #[test]
    fn test_name_truncated_to_display_limit() {
        let mut r = roster();
        let id = PeerId::from("RIDER_8");
        r.observe_presence(&id, "ABCDEFGHIJKLMNOP");
        assert_eq!(r.get(&id).unwrap().name, "ABCDEFGHIJKL");
    }

    #[test]
    fn test_echo_rate_limited() {
        let mut r = roster();
        assert!(r.allow_echo(1_000));
        assert!(!r.allow_echo(1_100));
        assert!(r.allow_echo(1_250));
    }

    #[test]
    fn test_clear_remotes_keeps_local() {
        let mut r = roster();
        r.observe_presence(&PeerId::from("RIDER_1"), "a");
        r.observe_presence(&PeerId::from("RIDER_2"), "b");
        r.clear_remotes();
        assert_eq!(r.len(), 1);
        assert!(r.contains(&PeerId::from("RIDER_0")));
    }
}
