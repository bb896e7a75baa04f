//! Position replication: outbound throttling and inbound smoothing.
//!
//! Outbound, the local rider's progress is published at most once per
//! 100 ms, gated by a last-sent stamp rather than a timer, so a slow frame
//! cadence simply sends less often. Inbound updates land as targets on the
//! roster; the per-tick reconcile pass eases each remote rider's rendered
//! position toward its target. This is plain exponential smoothing, not
//! dead reckoning — no velocity prediction happens between updates, so a
//! remote rider visibly lags its true position under jitter.

use glam::Vec3;
use protocol::PeerId;

use crate::roster::Roster;
use crate::visuals::{RemoteVisuals, TrackSampler, Transform};

/// Minimum spacing between outbound position publishes.
pub const POS_SEND_INTERVAL_MS: u64 = 100;

/// A peer silent for longer than this is hidden (but its record persists).
pub const PEER_STALE_MS: u64 = 5_000;

/// Render-active window for the relative longitudinal offset, exclusive on
/// both ends. Matches the world draw distance.
pub const VIEW_BEHIND_Z: f64 = -200.0;
pub const VIEW_AHEAD_Z: f64 = 50.0;

/// Exponential smoothing rate (per second) toward replicated targets.
pub const SMOOTH_RATE: f64 = 5.0;

const LEAN_FACTOR: f64 = 0.08;
const PITCH_FACTOR: f64 = 1.5;

/// Read-only snapshot of the local simulation for one tick.
#[derive(Debug, Clone, Copy)]
pub struct LocalFrame {
    /// Distance along the course, in meters.
    pub distance: f64,
    /// Lateral lane offset.
    pub lane_x: f64,
    /// Local rider's world z, for terrain sampling of remote riders.
    pub world_z: f64,
    /// Difficulty scalar fed to the height sampler.
    pub difficulty: f64,
    /// Seconds since the previous tick.
    pub dt: f64,
}

/// One row of the per-tick leaderboard, distance descending.
#[derive(Debug, Clone, PartialEq)]
pub struct LeaderboardEntry {
    pub id: PeerId,
    pub name: String,
    pub distance: f64,
    pub is_local: bool,
}

/// Outbound publish throttle.
#[derive(Debug, Default)]
pub struct Replication {
    last_sent_ms: u64,
}

impl Replication {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whole-meter distance and lane offset to publish this tick, or `None`
    /// while inside the send interval.
    pub fn outbound(&mut self, now_ms: u64, distance: f64, lane_x: f64) -> Option<(i64, f64)> {
        if now_ms.saturating_sub(self.last_sent_ms) <= POS_SEND_INTERVAL_MS {
            return None;
        }
        self.last_sent_ms = now_ms;
        Some((distance.floor() as i64, lane_x))
    }
}

/// Whether a relative offset falls inside the render-active window.
pub fn in_view_window(rel_z: f64) -> bool {
    rel_z > VIEW_BEHIND_Z && rel_z < VIEW_AHEAD_Z
}

/// Ease every remote rider toward its replicated target and push the result
/// to the renderer. Runs once per local frame while racing.
pub fn reconcile(
    roster: &mut Roster,
    frame: &LocalFrame,
    now_ms: u64,
    track: &dyn TrackSampler,
    visuals: &mut dyn RemoteVisuals,
) {
    let blend = (frame.dt * SMOOTH_RATE).min(1.0);

    for record in roster.remotes_mut() {
        // No position ever received: nothing to draw yet.
        if record.last_update_ms == 0 {
            continue;
        }
        if record.visual.is_none() {
            record.visual = Some(visuals.create(record.color, &record.name));
        }
        let visual = record.visual.expect("visual created above");

        // Silent too long: hide, but keep the record.
        if now_ms.saturating_sub(record.last_update_ms) > PEER_STALE_MS {
            visuals.set_visible(visual, false);
            continue;
        }

        let rel_z = -(record.target_distance - frame.distance);
        if !in_view_window(rel_z) {
            visuals.set_visible(visual, false);
            continue;
        }

        let peer_world_z = frame.world_z + rel_z;
        let target_x = track.curve_x(peer_world_z, frame.distance) + record.lane_offset;
        record.render_x += (target_x - record.render_x) * blend;
        record.render_z += (rel_z - record.render_z) * blend;

        let rot_z = -track.curve_deriv(peer_world_z, frame.distance) * LEAN_FACTOR;
        let rot_x = -track.height_deriv(peer_world_z, frame.distance, frame.difficulty)
            * PITCH_FACTOR;

        visuals.set_visible(visual, true);
        visuals.set_transform(
            visual,
            Transform {
                position: Vec3::new(record.render_x as f32, 0.0, record.render_z as f32),
                rot_x: rot_x as f32,
                rot_z: rot_z as f32,
            },
        );
    }
}

/// Derive the leaderboard from the local distance plus every live peer's
/// replicated target.
pub fn leaderboard(roster: &Roster, local_distance: f64, now_ms: u64) -> Vec<LeaderboardEntry> {
    let local_id = roster.local_id().clone();
    let mut entries: Vec<LeaderboardEntry> = roster
        .entries()
        .into_iter()
        .filter_map(|record| {
            if record.id == local_id {
                Some(LeaderboardEntry {
                    id: record.id.clone(),
                    name: record.name.clone(),
                    distance: local_distance,
                    is_local: true,
                })
            } else if record.last_update_ms > 0
                && now_ms.saturating_sub(record.last_update_ms) <= PEER_STALE_MS
            {
                Some(LeaderboardEntry {
                    id: record.id.clone(),
                    name: record.name.clone(),
                    distance: record.target_distance,
                    is_local: false,
                })
            } else {
                None
            }
        })
        .collect();
    entries.sort_by(|a, b| b.distance.total_cmp(&a.distance));
    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::visuals::{FlatTrack, VisualId};
    use protocol::Color;
    use std::collections::HashMap;

    /// Records every call so tests can assert on renderer interaction.
    #[derive(Default)]
    struct RecordingVisuals {
        next_id: u64,
        visible: HashMap<VisualId, bool>,
        transforms: HashMap<VisualId, Transform>,
    }

    impl RemoteVisuals for RecordingVisuals {
        fn create(&mut self, _color: Color, _name: &str) -> VisualId {
            let id = VisualId(self.next_id);
            self.next_id += 1;
            id
        }

        fn set_transform(&mut self, id: VisualId, transform: Transform) {
            self.transforms.insert(id, transform);
        }

        fn set_visible(&mut self, id: VisualId, visible: bool) {
            self.visible.insert(id, visible);
        }

        fn remove(&mut self, id: VisualId) {
            self.visible.remove(&id);
            self.transforms.remove(&id);
        }
    }

    fn frame(distance: f64) -> LocalFrame {
        LocalFrame {
            distance,
            lane_x: 0.0,
            world_z: -distance,
            difficulty: 1.0,
            dt: 0.016,
        }
    }

    fn racing_roster(peer_distance: f64, now_ms: u64) -> Roster {
        let mut roster = Roster::new(PeerId::from("RIDER_0"));
        roster.insert_local("Me");
        roster.observe_pos(&PeerId::from("RIDER_1"), "Rival", peer_distance, 0.0, now_ms);
        roster
    }

    #[test]
    fn test_outbound_throttled_to_100ms() {
        let mut rep = Replication::new();
        assert!(rep.outbound(101, 10.0, 0.0).is_some());
        assert!(rep.outbound(150, 11.0, 0.0).is_none());
        assert!(rep.outbound(201, 12.0, 0.0).is_none());
        assert!(rep.outbound(202, 12.9, 0.0).is_some());
    }

    #[test]
    fn test_outbound_floors_distance() {
        let mut rep = Replication::new();
        let (d, x) = rep.outbound(200, 1234.9, 2.2).unwrap();
        assert_eq!(d, 1234);
        assert_eq!(x, 2.2);
    }

    #[test]
    fn test_view_window_boundary_exclusive() {
        // Peer at 950 against local 1000: relZ = 50, exactly on the
        // exclusive boundary — must be hidden.
        let mut roster = racing_roster(950.0, 1_000);
        let mut visuals = RecordingVisuals::default();
        reconcile(&mut roster, &frame(1000.0), 1_000, &FlatTrack, &mut visuals);
        assert_eq!(visuals.visible.values().filter(|v| **v).count(), 0);

        // One meter closer: relZ = 49 — must render.
        let mut roster = racing_roster(951.0, 1_000);
        let mut visuals = RecordingVisuals::default();
        reconcile(&mut roster, &frame(1000.0), 1_000, &FlatTrack, &mut visuals);
        assert_eq!(visuals.visible.values().filter(|v| **v).count(), 1);
    }

    #[test]
    fn test_stale_peer_hidden_not_removed() {
        let mut roster = racing_roster(990.0, 1_000);
        let mut visuals = RecordingVisuals::default();
        reconcile(
            &mut roster,
            &frame(1000.0),
            1_000 + PEER_STALE_MS + 1,
            &FlatTrack,
            &mut visuals,
        );
        assert_eq!(visuals.visible.values().filter(|v| **v).count(), 0);
        assert!(roster.contains(&PeerId::from("RIDER_1")));
    }

    #[test]
    fn test_smoothing_moves_toward_target() {
        let mut roster = racing_roster(990.0, 1_000);
        let mut visuals = RecordingVisuals::default();
        let f = frame(1000.0);
        reconcile(&mut roster, &f, 1_000, &FlatTrack, &mut visuals);
        let z1 = roster.get(&PeerId::from("RIDER_1")).unwrap().render_z;
        reconcile(&mut roster, &f, 1_016, &FlatTrack, &mut visuals);
        let z2 = roster.get(&PeerId::from("RIDER_1")).unwrap().render_z;
        // Target relZ is 10; render z approaches it without snapping.
        assert!(z1 > 0.0 && z1 < 10.0);
        assert!(z2 > z1 && z2 < 10.0);
    }

    #[test]
    fn test_presence_only_peer_gets_no_visual() {
        let mut roster = Roster::new(PeerId::from("RIDER_0"));
        roster.insert_local("Me");
        roster.observe_presence(&PeerId::from("RIDER_1"), "Lurker");
        let mut visuals = RecordingVisuals::default();
        reconcile(&mut roster, &frame(0.0), 1_000, &FlatTrack, &mut visuals);
        assert!(roster.get(&PeerId::from("RIDER_1")).unwrap().visual.is_none());
    }

    #[test]
    fn test_leaderboard_sorted_descending_with_self() {
        let mut roster = Roster::new(PeerId::from("RIDER_0"));
        roster.insert_local("Me");
        roster.observe_pos(&PeerId::from("RIDER_1"), "Ahead", 1500.0, 0.0, 1_000);
        roster.observe_pos(&PeerId::from("RIDER_2"), "Behind", 800.0, 0.0, 1_000);

        let board = leaderboard(&roster, 1000.0, 1_000);
        let names: Vec<&str> = board.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["Ahead", "Me", "Behind"]);
        assert!(board[1].is_local);
    }

    #[test]
    fn test_leaderboard_drops_stale_peers() {
        let mut roster = Roster::new(PeerId::from("RIDER_0"));
        roster.insert_local("Me");
        roster.observe_pos(&PeerId::from("RIDER_1"), "Gone", 2000.0, 0.0, 0);

        let board = leaderboard(&roster, 100.0, PEER_STALE_MS + 1);
        assert_eq!(board.len(), 1);
        assert!(board[0].is_local);
    }
}
