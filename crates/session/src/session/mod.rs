//! The multiplayer session manager.
//!
//! [`MpSession`] owns every coordination subsystem for one room: roster,
//! directory, race coordinator, replication throttle, and the optional
//! voice channel. It is a synchronous core — all mutation funnels through
//! `handle_transport_event`, `tick`, `heartbeat`, and the command methods —
//! so a multi-threaded host serializes access by confining it to one task,
//! which is exactly what [`run_session`] does.

use protocol::messages::{DirectorySummary, RoomMessage, RtcSignal};
use protocol::{Color, PeerId, RoomCode, topics};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::clock;
use crate::directory::{RoomDirectory, RoomSummary};
use crate::race::{COUNTDOWN_LEAD_MS, RaceCoordinator, RaceSignal, RaceState};
use crate::replication::{self, LeaderboardEntry, LocalFrame, Replication};
use crate::roster::{PresenceOutcome, Roster};
use crate::transport::{Transport, TransportEvent};
use crate::visuals::{RemoteVisuals, TrackSampler};
use crate::voice::{MediaEngine, OutboundSignal, SPEAKING_POLL_MS, VoiceChannel, VoiceError};

/// Presence/directory heartbeat interval while in the lobby.
pub const HEARTBEAT_MS: u64 = 2_000;

/// One roster row for UI collaborators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterEntry {
    pub id: PeerId,
    pub name: String,
    pub color: Color,
    pub ready: bool,
    pub is_local: bool,
}

/// Notifications pushed to the host (UI, audio, simulation).
#[derive(Debug)]
pub enum SessionEvent {
    /// Membership changed; full snapshot in join order.
    RosterChanged(Vec<RosterEntry>),
    /// The browsable room list changed.
    RoomList(Vec<RoomSummary>),
    /// Countdown display should show this second (3, 2, 1...).
    CountdownTick(u32),
    /// Countdown hit zero: show GO and start the simulation.
    RaceStarted,
    /// Standings, distance descending, derived each racing tick.
    Leaderboard(Vec<LeaderboardEntry>),
    /// A peer started or stopped speaking.
    SpeakingChanged { peer: PeerId, speaking: bool },
    /// Result of a voice-enable attempt.
    VoiceReady { enabled: bool },
    /// Short human-readable notice for the toast/notification area.
    Toast(String),
    /// The broker connection died. The session is over; a new join flow is
    /// required.
    ConnectionLost { reason: String },
}

/// Commands from the host into the session task.
pub enum SessionCommand {
    /// One render/simulation frame elapsed.
    Tick(LocalFrame),
    /// The local player pressed start.
    TriggerStart,
    /// Try to enable voice with this media engine.
    EnableVoice(Box<dyn MediaEngine>),
    ToggleMute,
    /// Tear everything down and end the session task.
    Leave,
}

/// One multiplayer session, from lobby entry to teardown.
pub struct MpSession {
    self_id: PeerId,
    display_name: String,
    room: RoomCode,
    namespace: String,
    room_topic: String,
    directory_topic: String,
    transport: Box<dyn Transport>,
    events: UnboundedSender<SessionEvent>,
    roster: Roster,
    directory: RoomDirectory,
    race: RaceCoordinator,
    replication: Replication,
    voice: Option<VoiceChannel>,
    track: Box<dyn TrackSampler>,
    visuals: Box<dyn RemoteVisuals>,
    alive: bool,
}

impl MpSession {
    /// Join a room on an established transport: subscribe the room and
    /// directory topics, create the local roster record, and announce.
    #[allow(clippy::too_many_arguments)]
    pub fn join(
        transport: Box<dyn Transport>,
        room: RoomCode,
        self_id: PeerId,
        display_name: &str,
        namespace: &str,
        track: Box<dyn TrackSampler>,
        visuals: Box<dyn RemoteVisuals>,
        events: UnboundedSender<SessionEvent>,
    ) -> Result<Self, crate::transport::TransportError> {
        let room_topic = topics::room(namespace, &room);
        let directory_topic = topics::directory(namespace);
        transport.subscribe(&room_topic)?;
        transport.subscribe(&directory_topic)?;

        let display_name = if display_name.trim().is_empty() {
            self_id.default_name()
        } else {
            display_name.trim().to_string()
        };

        let mut session = Self {
            roster: Roster::new(self_id.clone()),
            self_id,
            display_name,
            room,
            namespace: namespace.to_string(),
            room_topic,
            directory_topic,
            transport,
            events,
            directory: RoomDirectory::new(),
            race: RaceCoordinator::new(),
            replication: Replication::new(),
            voice: None,
            track,
            visuals,
            alive: true,
        };

        session.roster.insert_local(&session.display_name.clone());
        session.race.enter_lobby();
        info!("Entered lobby of room {}", session.room);

        session.announce_presence();
        session.publish_directory();
        session.emit_roster();
        Ok(session)
    }

    pub fn state(&self) -> RaceState {
        self.race.state()
    }

    pub fn is_alive(&self) -> bool {
        self.alive
    }

    pub fn room(&self) -> &RoomCode {
        &self.room
    }

    /// Process one transport notification.
    pub fn handle_transport_event(&mut self, event: TransportEvent, now_ms: u64) {
        match event {
            TransportEvent::Message(inbound) => {
                self.handle_inbound(&inbound.topic, &inbound.payload, now_ms)
            }
            TransportEvent::Lost { reason } => {
                warn!("Connection lost: {}", reason);
                self.alive = false;
                let _ = self.events.send(SessionEvent::ConnectionLost { reason });
            }
        }
    }

    fn handle_inbound(&mut self, topic: &str, payload: &[u8], now_ms: u64) {
        if topic == self.directory_topic {
            match DirectorySummary::decode(payload) {
                Ok(summary) => {
                    if self.directory.observe(summary, now_ms) {
                        self.emit_room_list();
                    }
                }
                Err(e) => debug!("Dropping malformed directory message: {}", e),
            }
            return;
        }

        if topic == self.room_topic {
            let message = match RoomMessage::decode(payload) {
                Ok(m) => m,
                // Malformed payloads are dropped, never surfaced.
                Err(e) => {
                    debug!("Dropping malformed room message: {}", e);
                    return;
                }
            };
            if *message.sender() == self.self_id {
                return;
            }
            self.handle_room_message(message, now_ms);
            return;
        }

        if let Some(voice) = self.voice.as_mut()
            && topic == voice.signal_topic()
        {
            match RtcSignal::decode(payload) {
                Ok(signal) => {
                    let outbound = voice.handle_signal(signal);
                    self.publish_signals(outbound);
                }
                Err(e) => debug!("Dropping malformed rtc message: {}", e),
            }
        }
    }

    fn handle_room_message(&mut self, message: RoomMessage, now_ms: u64) {
        match message {
            RoomMessage::Presence { id, name } => {
                match self.roster.observe_presence(&id, &name) {
                    PresenceOutcome::Inserted => self.on_peer_joined(&id, now_ms),
                    PresenceOutcome::AlreadyKnown => {}
                    // Silent drop; the sender gets no rejection.
                    PresenceOutcome::RoomFull => {}
                }
            }
            RoomMessage::StartRace { start_at, .. } => {
                // First broadcast wins; the guard ignores the rest.
                self.race.schedule_start(start_at);
            }
            RoomMessage::Pos { id, name, d, x } => {
                if self.roster.observe_pos(&id, &name, d as f64, x, now_ms) {
                    self.on_peer_joined(&id, now_ms);
                }
            }
        }
    }

    /// A new peer entered the roster: tell the UI, gossip its existence
    /// onward, refresh the directory, and open a voice link if voice is up.
    fn on_peer_joined(&mut self, id: &PeerId, now_ms: u64) {
        self.emit_roster();
        if let Some(record) = self.roster.get(id) {
            let _ = self
                .events
                .send(SessionEvent::Toast(format!("{} joined", record.name)));
        }
        if self.roster.allow_echo(now_ms) {
            self.announce_presence();
        }
        self.publish_directory();
        if let Some(voice) = self.voice.as_mut() {
            let outbound = voice.connect_to_peer(id);
            self.publish_signals(outbound);
        }
    }

    /// Local start trigger: pick a timestamp three seconds out, broadcast
    /// it, and arm our own countdown from the same value.
    pub fn trigger_race_start(&mut self, now_ms: u64) {
        if self.race.state() != RaceState::Lobby {
            return;
        }
        let start_at = now_ms + COUNTDOWN_LEAD_MS;
        self.send_room(RoomMessage::StartRace {
            id: self.self_id.clone(),
            name: self.display_name.clone(),
            start_at,
        });
        self.race.schedule_start(start_at);
    }

    /// 2-second heartbeat: presence + directory while in the lobby, and the
    /// stale-room sweep.
    pub fn heartbeat(&mut self, now_ms: u64) {
        if self.race.state() == RaceState::Lobby {
            self.announce_presence();
            self.publish_directory();
        }
        if self.directory.sweep(now_ms) {
            self.emit_room_list();
        }
    }

    /// Once per rendered frame. Advances the countdown and, while racing,
    /// replicates the local position out and eases remote riders in.
    pub fn tick(&mut self, frame: &LocalFrame, now_ms: u64) {
        for signal in self.race.poll(now_ms) {
            match signal {
                RaceSignal::Countdown(second) => {
                    let _ = self.events.send(SessionEvent::CountdownTick(second));
                }
                RaceSignal::Go => {
                    info!("Race started");
                    let _ = self.events.send(SessionEvent::RaceStarted);
                    self.publish_directory();
                }
            }
        }

        if !self.race.is_racing() {
            return;
        }

        if let Some((d, x)) = self.replication.outbound(now_ms, frame.distance, frame.lane_x) {
            self.send_room(RoomMessage::Pos {
                id: self.self_id.clone(),
                name: self.display_name.clone(),
                d,
                x,
            });
        }

        replication::reconcile(
            &mut self.roster,
            frame,
            now_ms,
            self.track.as_ref(),
            self.visuals.as_mut(),
        );

        let board = replication::leaderboard(&self.roster, frame.distance, now_ms);
        let _ = self.events.send(SessionEvent::Leaderboard(board));
    }

    /// Try to bring up voice. Permission denial is non-fatal: the session
    /// continues without it and the result is reported as a boolean.
    pub fn enable_voice(&mut self, engine: Box<dyn MediaEngine>) -> bool {
        if self.voice.is_some() {
            return true;
        }
        match VoiceChannel::open(engine, self.self_id.clone(), self.room.clone(), &self.namespace)
        {
            Ok(voice) => {
                if self.transport.subscribe(&voice.signal_topic()).is_err() {
                    let _ = self.events.send(SessionEvent::VoiceReady { enabled: false });
                    return false;
                }
                self.voice = Some(voice);

                // Reach out to everyone already in the room.
                let peers: Vec<PeerId> = self
                    .roster
                    .entries()
                    .into_iter()
                    .filter(|r| r.id != self.self_id)
                    .map(|r| r.id.clone())
                    .collect();
                for peer in peers {
                    let outbound = self
                        .voice
                        .as_mut()
                        .map(|v| v.connect_to_peer(&peer))
                        .unwrap_or_default();
                    self.publish_signals(outbound);
                }
                let _ = self.events.send(SessionEvent::VoiceReady { enabled: true });
                true
            }
            Err(VoiceError::PermissionDenied) => {
                info!("Voice unavailable: microphone permission denied");
                let _ = self.events.send(SessionEvent::VoiceReady { enabled: false });
                false
            }
            Err(e) => {
                warn!("Voice unavailable: {}", e);
                let _ = self.events.send(SessionEvent::VoiceReady { enabled: false });
                false
            }
        }
    }

    /// 150 ms voice service pass: ICE shipping, dead-link teardown,
    /// speaking detection.
    pub fn voice_poll(&mut self) {
        let Some(voice) = self.voice.as_mut() else {
            return;
        };
        let (outbound, speaking_changes) = voice.poll();
        self.publish_signals(outbound);
        for (peer, speaking) in speaking_changes {
            let _ = self
                .events
                .send(SessionEvent::SpeakingChanged { peer, speaking });
        }
    }

    /// Flip the local mute; returns the new state.
    pub fn toggle_mute(&mut self) -> bool {
        self.voice.as_mut().map(|v| v.toggle_mute()).unwrap_or(false)
    }

    /// All-or-nothing teardown: voice links, remote visuals, subscriptions.
    pub fn leave(&mut self) {
        if let Some(mut voice) = self.voice.take() {
            for (peer, speaking) in voice.shutdown() {
                let _ = self
                    .events
                    .send(SessionEvent::SpeakingChanged { peer, speaking });
            }
            let _ = self.transport.unsubscribe(&voice.signal_topic());
        }
        for visual in self.roster.clear_remotes() {
            self.visuals.remove(visual);
        }
        let _ = self.transport.unsubscribe(&self.room_topic);
        let _ = self.transport.unsubscribe(&self.directory_topic);
        self.alive = false;
        info!("Left room {}", self.room);
    }

    fn announce_presence(&mut self) {
        self.send_room(RoomMessage::Presence {
            id: self.self_id.clone(),
            name: self.display_name.clone(),
        });
    }

    fn publish_directory(&mut self) {
        let summary = DirectorySummary {
            room: self.room.clone(),
            players: self.roster.len(),
            racing: self.race.is_racing(),
        };
        match summary.encode() {
            Ok(payload) => {
                if let Err(e) = self.transport.publish(&self.directory_topic, payload) {
                    debug!("Directory publish failed: {}", e);
                }
            }
            Err(e) => debug!("Directory encode failed: {}", e),
        }
    }

    fn send_room(&mut self, message: RoomMessage) {
        match message.encode() {
            Ok(payload) => {
                if let Err(e) = self.transport.publish(&self.room_topic, payload) {
                    debug!("Room publish failed: {}", e);
                }
            }
            Err(e) => debug!("Room message encode failed: {}", e),
        }
    }

    fn publish_signals(&mut self, signals: Vec<OutboundSignal>) {
        let Some(voice) = self.voice.as_ref() else {
            return;
        };
        for OutboundSignal { target, signal } in signals {
            let topic = voice.topic_for(&target);
            match signal.encode() {
                Ok(payload) => {
                    if let Err(e) = self.transport.publish(&topic, payload) {
                        debug!("Voice signal publish failed: {}", e);
                    }
                }
                Err(e) => debug!("Voice signal encode failed: {}", e),
            }
        }
    }

    fn emit_roster(&self) {
        let entries = self
            .roster
            .entries()
            .into_iter()
            .map(|record| RosterEntry {
                id: record.id.clone(),
                name: record.name.clone(),
                color: record.color,
                ready: record.ready,
                is_local: record.id == self.self_id,
            })
            .collect();
        let _ = self.events.send(SessionEvent::RosterChanged(entries));
    }

    fn emit_room_list(&self) {
        let _ = self
            .events
            .send(SessionEvent::RoomList(self.directory.rooms().to_vec()));
    }
}

/// Drive an [`MpSession`] on the current task until the session dies or the
/// host says leave. This is the single place all mutation happens.
pub async fn run_session(
    mut session: MpSession,
    mut transport_events: UnboundedReceiver<TransportEvent>,
    mut commands: UnboundedReceiver<SessionCommand>,
) {
    let mut heartbeat =
        tokio::time::interval(std::time::Duration::from_millis(HEARTBEAT_MS));
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut speaking =
        tokio::time::interval(std::time::Duration::from_millis(SPEAKING_POLL_MS));
    speaking.set_missed_tick_behavior(MissedTickBehavior::Delay);

    while session.is_alive() {
        tokio::select! {
            _ = heartbeat.tick() => session.heartbeat(clock::now_ms()),
            _ = speaking.tick() => session.voice_poll(),
            event = transport_events.recv() => match event {
                Some(event) => session.handle_transport_event(event, clock::now_ms()),
                None => break,
            },
            command = commands.recv() => match command {
                Some(SessionCommand::Tick(frame)) => session.tick(&frame, clock::now_ms()),
                Some(SessionCommand::TriggerStart) => {
                    session.trigger_race_start(clock::now_ms())
                }
                Some(SessionCommand::EnableVoice(engine)) => {
                    session.enable_voice(engine);
                }
                Some(SessionCommand::ToggleMute) => {
                    session.toggle_mute();
                }
                Some(SessionCommand::Leave) | None => {
                    session.leave();
                    break;
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::memory::MemoryBroker;
    use crate::visuals::{FlatTrack, NullVisuals};
    use crate::voice::testing::FakeEngine;
    use protocol::PLAYER_COLORS;

    struct Harness {
        session: MpSession,
        transport_rx: UnboundedReceiver<TransportEvent>,
        events_rx: UnboundedReceiver<SessionEvent>,
    }

    impl Harness {
        fn join(broker: &MemoryBroker, id: &str, name: &str) -> Self {
            let (transport, transport_rx) = broker.connect();
            let (events_tx, events_rx) = tokio::sync::mpsc::unbounded_channel();
            let session = MpSession::join(
                Box::new(transport),
                RoomCode::new("RACE1").unwrap(),
                PeerId::from(id),
                name,
                "geargrinder",
                Box::new(FlatTrack),
                Box::new(NullVisuals::default()),
                events_tx,
            )
            .unwrap();
            Self {
                session,
                transport_rx,
                events_rx,
            }
        }

        /// Deliver everything queued on the transport into the session.
        fn pump(&mut self, now_ms: u64) {
            while let Ok(event) = self.transport_rx.try_recv() {
                self.session.handle_transport_event(event, now_ms);
            }
        }

        fn drain_events(&mut self) -> Vec<SessionEvent> {
            let mut events = Vec::new();
            while let Ok(event) = self.events_rx.try_recv() {
                events.push(event);
            }
            events
        }

        fn roster_names(&self) -> Vec<String> {
            self.session
                .roster
                .entries()
                .iter()
                .map(|r| r.name.clone())
                .collect()
        }
    }

    fn pump_all(peers: &mut [&mut Harness], rounds: usize, now_ms: u64) {
        for _ in 0..rounds {
            for peer in peers.iter_mut() {
                peer.pump(now_ms);
            }
        }
    }

    #[test]
    fn test_two_peers_converge_with_matching_colors() {
        let broker = MemoryBroker::new();
        let mut a = Harness::join(&broker, "RIDER_1000", "Ann");
        let mut b = Harness::join(&broker, "RIDER_2000", "Bob");

        // B joined after A's initial announce; A's echo-on-first-sight of
        // B's announce is what converges them. Two pump rounds cover the
        // gossip round trip.
        pump_all(&mut [&mut a, &mut b], 2, 1_000);

        assert_eq!(a.roster_names(), ["Ann", "Bob"]);
        assert_eq!(b.roster_names(), ["Bob", "Ann"]);
        // Join order drives colors on each side independently.
        let ann_at_b = b.session.roster.get(&PeerId::from("RIDER_1000")).unwrap();
        assert_eq!(ann_at_b.color, PLAYER_COLORS[1]);
    }

    #[test]
    fn test_convergence_within_one_heartbeat() {
        let broker = MemoryBroker::new();
        let mut a = Harness::join(&broker, "RIDER_1000", "Ann");
        // A's initial announce predates B's subscription and is lost.
        let _ = a.drain_events();
        let mut b = Harness::join(&broker, "RIDER_2000", "Bob");
        // Pumping inside the echo rate-limit window suppresses A's echo,
        // so B stays one-sided until a heartbeat re-announce.
        a.pump(100);
        b.pump(100);
        assert_eq!(a.roster_names(), ["Ann", "Bob"]);
        assert_eq!(b.roster_names(), ["Bob"]);
        a.session.heartbeat(2_000);
        b.pump(2_000);
        assert_eq!(b.roster_names(), ["Bob", "Ann"]);
    }

    #[test]
    fn test_own_messages_ignored() {
        let broker = MemoryBroker::new();
        let mut a = Harness::join(&broker, "RIDER_1000", "Ann");
        // The loopback broker echoes our own presence/pos back at us.
        a.pump(1_000);
        assert_eq!(a.roster_names(), ["Ann"]);
        let me = a.session.roster.get(&PeerId::from("RIDER_1000")).unwrap();
        assert_eq!(me.target_distance, 0.0);
        assert_eq!(me.last_update_ms, 0);
    }

    #[test]
    fn test_start_race_converges_and_is_idempotent() {
        let broker = MemoryBroker::new();
        let mut a = Harness::join(&broker, "RIDER_1000", "Ann");
        let mut b = Harness::join(&broker, "RIDER_2000", "Bob");
        pump_all(&mut [&mut a, &mut b], 2, 1_000);

        a.session.trigger_race_start(10_000);
        b.pump(10_050);
        assert_eq!(a.session.state(), RaceState::Countdown);
        assert_eq!(b.session.state(), RaceState::Countdown);

        // A competing trigger from B must not re-arm anyone.
        b.session.trigger_race_start(11_000);
        a.pump(11_050);
        assert_eq!(a.session.state(), RaceState::Countdown);

        let frame = LocalFrame {
            distance: 0.0,
            lane_x: 0.0,
            world_z: 0.0,
            difficulty: 0.0,
            dt: 0.016,
        };
        a.session.tick(&frame, 13_000);
        b.session.tick(&frame, 13_000);
        assert_eq!(a.session.state(), RaceState::Racing);
        assert_eq!(b.session.state(), RaceState::Racing);
        assert!(
            a.drain_events()
                .iter()
                .any(|e| matches!(e, SessionEvent::RaceStarted))
        );
    }

    #[test]
    fn test_pos_replication_and_leaderboard() {
        let broker = MemoryBroker::new();
        let mut a = Harness::join(&broker, "RIDER_1000", "Ann");
        let mut b = Harness::join(&broker, "RIDER_2000", "Bob");
        pump_all(&mut [&mut a, &mut b], 2, 1_000);

        a.session.trigger_race_start(10_000);
        b.pump(10_000);
        let frame_a = LocalFrame {
            distance: 1234.9,
            lane_x: 2.2,
            world_z: -1234.9,
            difficulty: 1.0,
            dt: 0.016,
        };
        a.session.tick(&frame_a, 13_000);
        a.session.tick(&frame_a, 13_200);
        b.session.tick(
            &LocalFrame {
                distance: 1200.0,
                lane_x: 0.0,
                world_z: -1200.0,
                difficulty: 1.0,
                dt: 0.016,
            },
            13_250,
        );
        b.pump(13_300);

        let ann_at_b = b.session.roster.get(&PeerId::from("RIDER_1000")).unwrap();
        assert_eq!(ann_at_b.target_distance, 1234.0);
        assert_eq!(ann_at_b.lane_offset, 2.2);

        b.session.tick(
            &LocalFrame {
                distance: 1200.0,
                lane_x: 0.0,
                world_z: -1200.0,
                difficulty: 1.0,
                dt: 0.016,
            },
            13_400,
        );
        let events = b.drain_events();
        let board = events
            .iter()
            .rev()
            .find_map(|e| match e {
                SessionEvent::Leaderboard(board) => Some(board),
                _ => None,
            })
            .expect("leaderboard emitted while racing");
        let names: Vec<&str> = board.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["Ann", "Bob"]);
    }

    #[test]
    fn test_capacity_enforced_over_the_wire() {
        let broker = MemoryBroker::new();
        let mut a = Harness::join(&broker, "RIDER_1000", "Ann");
        let (stranger, _rx) = broker.connect();
        for i in 0..15 {
            let msg = RoomMessage::Presence {
                id: PeerId::from(format!("GATE_{i:02}")),
                name: format!("G{i}"),
            };
            stranger
                .publish("geargrinder/lob/RACE1", msg.encode().unwrap())
                .unwrap();
        }
        a.pump(1_000);
        assert_eq!(a.session.roster.len(), protocol::MAX_PLAYERS_PER_ROOM);
    }

    #[test]
    fn test_voice_initiator_and_answer_flow() {
        let broker = MemoryBroker::new();
        let mut a = Harness::join(&broker, "AAA", "Ann");
        let mut b = Harness::join(&broker, "BBB", "Bob");
        pump_all(&mut [&mut a, &mut b], 2, 1_000);

        let engine_a = FakeEngine::default();
        let log_a = engine_a.log.clone();
        let engine_b = FakeEngine::default();
        let log_b = engine_b.log.clone();
        // The responder enables first so its signaling topic is live before
        // the initiator's offer goes out.
        assert!(b.session.enable_voice(Box::new(engine_b)));
        assert!(a.session.enable_voice(Box::new(engine_a)));

        // AAA offered toward BBB on enable; BBB (larger id) must not offer.
        pump_all(&mut [&mut a, &mut b], 2, 1_100);
        assert_eq!(log_a.get(0).lock().unwrap().offers_created, 1);
        assert_eq!(log_b.get(0).lock().unwrap().offers_created, 0);

        // BBB's answer made it back: AAA's fake flips to connected.
        assert_eq!(
            log_a.get(0).lock().unwrap().health,
            crate::voice::ConnectionHealth::Connected
        );
    }

    #[test]
    fn test_connection_lost_kills_session() {
        let broker = MemoryBroker::new();
        let mut a = Harness::join(&broker, "RIDER_1000", "Ann");
        a.session.handle_transport_event(
            TransportEvent::Lost {
                reason: "socket closed".to_string(),
            },
            1_000,
        );
        assert!(!a.session.is_alive());
        assert!(
            a.drain_events()
                .iter()
                .any(|e| matches!(e, SessionEvent::ConnectionLost { .. }))
        );
    }

    #[test]
    fn test_leave_is_total_teardown() {
        let broker = MemoryBroker::new();
        let mut a = Harness::join(&broker, "AAA", "Ann");
        let mut b = Harness::join(&broker, "BBB", "Bob");
        pump_all(&mut [&mut a, &mut b], 2, 1_000);
        a.session.enable_voice(Box::new(FakeEngine::default()));

        a.session.leave();
        assert!(!a.session.is_alive());
        assert_eq!(a.session.roster.len(), 1);

        // Unsubscribed: nothing from the room reaches A anymore.
        b.session.heartbeat(3_000);
        let before = a.transport_rx.try_recv().is_err();
        assert!(before);
    }
}
