//! Room directory: discovery of joinable rooms before and during a session.
//!
//! Every peer in a lobby broadcasts a lightweight room summary on the global
//! directory topic (on the heartbeat and on roster change). The directory
//! harvests these into a list for the room browser, evicting anything not
//! heard from recently.

use protocol::messages::DirectorySummary;
use protocol::{RoomCode, topics};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::clock;
use crate::transport::{Transport, TransportEvent};

/// A directory entry older than this is evicted.
pub const ROOM_STALE_MS: u64 = 15_000;

/// How long an anonymous scan connection lives if the user never joins.
pub const SCAN_LIFETIME_MS: u64 = 30_000;

/// A known room, as last advertised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomSummary {
    pub room: RoomCode,
    pub players: usize,
    pub racing: bool,
    pub last_seen_ms: u64,
}

/// Rooms heard of on the directory topic, in arrival order.
#[derive(Debug, Default)]
pub struct RoomDirectory {
    rooms: Vec<RoomSummary>,
}

impl RoomDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or refresh an entry. Returns true if the visible list changed
    /// beyond the liveness stamp.
    pub fn observe(&mut self, summary: DirectorySummary, now_ms: u64) -> bool {
        if let Some(existing) = self.rooms.iter_mut().find(|r| r.room == summary.room) {
            let changed = existing.players != summary.players || existing.racing != summary.racing;
            existing.players = summary.players;
            existing.racing = summary.racing;
            existing.last_seen_ms = now_ms;
            changed
        } else {
            self.rooms.push(RoomSummary {
                room: summary.room,
                players: summary.players,
                racing: summary.racing,
                last_seen_ms: now_ms,
            });
            true
        }
    }

    /// Evict entries not heard from within [`ROOM_STALE_MS`]. Returns true
    /// if anything was removed.
    pub fn sweep(&mut self, now_ms: u64) -> bool {
        let before = self.rooms.len();
        self.rooms
            .retain(|r| now_ms.saturating_sub(r.last_seen_ms) <= ROOM_STALE_MS);
        self.rooms.len() != before
    }

    /// Known rooms in arrival order.
    pub fn rooms(&self) -> &[RoomSummary] {
        &self.rooms
    }
}

/// A read-only directory watcher on its own anonymous connection, used to
/// populate the room browser before the user joins anything.
///
/// Self-terminates after [`SCAN_LIFETIME_MS`]; call [`RoomScanner::stop`]
/// earlier once the user joins a room.
pub struct RoomScanner {
    stop: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl RoomScanner {
    /// Start scanning on an already-connected transport. Room-list snapshots
    /// are emitted on `out` whenever the list changes.
    pub fn spawn(
        transport: Box<dyn Transport>,
        mut events: UnboundedReceiver<TransportEvent>,
        namespace: &str,
        out: UnboundedSender<Vec<RoomSummary>>,
    ) -> Self {
        let topic = topics::directory(namespace);
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            if transport.subscribe(&topic).is_err() {
                return;
            }
            let mut directory = RoomDirectory::new();
            let deadline =
                tokio::time::Instant::now() + std::time::Duration::from_millis(SCAN_LIFETIME_MS);
            let mut sweep = tokio::time::interval(std::time::Duration::from_millis(2_000));

            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    _ = tokio::time::sleep_until(deadline) => {
                        debug!("Room scan expired without a join");
                        break;
                    }
                    _ = sweep.tick() => {
                        if directory.sweep(clock::now_ms()) {
                            let _ = out.send(directory.rooms().to_vec());
                        }
                    }
                    event = events.recv() => match event {
                        Some(TransportEvent::Message(inbound)) if inbound.topic == topic => {
                            match DirectorySummary::decode(&inbound.payload) {
                                Ok(summary) => {
                                    directory.observe(summary, clock::now_ms());
                                    let _ = out.send(directory.rooms().to_vec());
                                }
                                Err(e) => debug!("Dropping malformed directory message: {}", e),
                            }
                        }
                        Some(TransportEvent::Message(_)) => {}
                        Some(TransportEvent::Lost { .. }) | None => break,
                    }
                }
            }
            let _ = transport.unsubscribe(&topic);
        });

        Self {
            stop: Some(stop_tx),
            task,
        }
    }

    /// Stop the scan (the user joined a room, or the browser closed). The
    /// task is detached, not aborted: it exits through its stop branch and
    /// runs the unsubscribe cleanup on its way out.
    pub fn stop(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        drop(self.task);
    }
}
