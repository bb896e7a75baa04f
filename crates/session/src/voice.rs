//! Peer-to-peer voice: negotiation over the signaling path plus speaking
//! detection.
//!
//! The actual media machinery (capture, encode, playback) is an external
//! collaborator behind [`MediaEngine`]; this module owns the per-peer
//! negotiation state and the signaling traffic. Establishment is
//! deterministic-initiator: between two peers, the lexicographically
//! smaller identity creates the offer, which sidesteps offer glare without
//! any role-negotiation message. Signaling is unicast on a per-peer topic,
//! so offer/answer/ICE traffic never touches the shared room topic.
//!
//! A stalled offer/answer exchange is never timed out; the half-open
//! session stays until teardown or an engine-reported failure.

use protocol::messages::RtcSignal;
use protocol::{PeerId, RoomCode, topics};
use std::collections::HashMap;
use thiserror::Error;
use tracing::{debug, warn};

/// Speaking-detection poll cadence.
pub const SPEAKING_POLL_MS: u64 = 150;

/// Average audio energy above which a peer counts as speaking.
pub const SPEAKING_THRESHOLD: f32 = 25.0;

/// Voice failures. None of these are fatal to the rest of the session.
#[derive(Debug, Error)]
pub enum VoiceError {
    /// Microphone permission denied; voice is simply unavailable.
    #[error("Microphone permission denied")]
    PermissionDenied,

    #[error("Media engine error: {0}")]
    Engine(String),
}

/// Health of one peer connection as reported by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionHealth {
    New,
    Connected,
    Disconnected,
    Failed,
}

/// One negotiated media link to a peer. Offer/answer and ICE plumbing are
/// driven from here; media itself never crosses this boundary.
pub trait PeerConnection: Send {
    /// Produce the local offer SDP (initiator side).
    fn create_offer(&mut self) -> Result<String, VoiceError>;
    /// Apply a remote offer and produce the answer SDP (responder side).
    fn accept_offer(&mut self, sdp: &str) -> Result<String, VoiceError>;
    /// Apply the remote answer (initiator side).
    fn accept_answer(&mut self, sdp: &str) -> Result<(), VoiceError>;
    fn add_remote_candidate(&mut self, candidate: &str) -> Result<(), VoiceError>;
    /// Locally-gathered ICE candidates not yet sent to the peer.
    fn drain_local_candidates(&mut self) -> Vec<String>;
    fn health(&self) -> ConnectionHealth;
    /// Average energy of the incoming audio, once media flows.
    fn audio_energy(&self) -> Option<f32>;
    /// Enable/disable the outbound audio track without renegotiating.
    fn set_outbound_enabled(&mut self, enabled: bool);
    fn close(&mut self);
}

/// Media collaborator: microphone capture and connection construction.
pub trait MediaEngine: Send {
    /// Acquire the local audio capture. `PermissionDenied` is non-fatal to
    /// multiplayer; the caller degrades to a voiceless session.
    fn capture_local_audio(&mut self) -> Result<(), VoiceError>;
    fn create_connection(&mut self) -> Result<Box<dyn PeerConnection>, VoiceError>;
}

/// A signaling message bound for one specific peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundSignal {
    pub target: PeerId,
    pub signal: RtcSignal,
}

struct VoicePeerSession {
    connection: Box<dyn PeerConnection>,
    speaking: bool,
}

/// The voice channel for one room.
pub struct VoiceChannel {
    engine: Box<dyn MediaEngine>,
    self_id: PeerId,
    room: RoomCode,
    namespace: String,
    muted: bool,
    peers: HashMap<PeerId, VoicePeerSession>,
}

impl VoiceChannel {
    /// Acquire the microphone and open the channel. The session must also
    /// subscribe the transport to [`VoiceChannel::signal_topic`].
    pub fn open(
        mut engine: Box<dyn MediaEngine>,
        self_id: PeerId,
        room: RoomCode,
        namespace: &str,
    ) -> Result<Self, VoiceError> {
        engine.capture_local_audio()?;
        Ok(Self {
            engine,
            self_id,
            room,
            namespace: namespace.to_string(),
            muted: false,
            peers: HashMap::new(),
        })
    }

    /// The per-peer topic this channel receives signaling on.
    pub fn signal_topic(&self) -> String {
        topics::rtc(&self.namespace, &self.room, &self.self_id)
    }

    /// Topic a signal bound for `target` must be published on.
    pub fn topic_for(&self, target: &PeerId) -> String {
        topics::rtc(&self.namespace, &self.room, target)
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    /// Begin establishing a link to `peer`. Only the lexicographically
    /// smaller identity sends the offer; the other side waits for it.
    pub fn connect_to_peer(&mut self, peer: &PeerId) -> Vec<OutboundSignal> {
        if *peer == self.self_id || self.peers.contains_key(peer) {
            return Vec::new();
        }
        let initiator = self.self_id < *peer;
        let mut connection = match self.engine.create_connection() {
            Ok(c) => c,
            Err(e) => {
                warn!("Voice: cannot create connection to {}: {}", peer, e);
                return Vec::new();
            }
        };
        connection.set_outbound_enabled(!self.muted);

        let mut outbound = Vec::new();
        if initiator {
            match connection.create_offer() {
                Ok(sdp) => outbound.push(OutboundSignal {
                    target: peer.clone(),
                    signal: RtcSignal::RtcOffer {
                        sdp,
                        from: self.self_id.clone(),
                    },
                }),
                Err(e) => {
                    warn!("Voice: offer to {} failed: {}", peer, e);
                    connection.close();
                    return Vec::new();
                }
            }
        }
        self.peers.insert(
            peer.clone(),
            VoicePeerSession {
                connection,
                speaking: false,
            },
        );
        outbound
    }

    /// Handle an inbound signaling message addressed to us.
    pub fn handle_signal(&mut self, signal: RtcSignal) -> Vec<OutboundSignal> {
        let from = signal.from().clone();
        if from == self.self_id {
            return Vec::new();
        }
        match signal {
            RtcSignal::RtcOffer { sdp, .. } => {
                // An offer can arrive before we ever saw the peer's
                // presence; create the responder session on demand.
                let mut outbound = if self.peers.contains_key(&from) {
                    Vec::new()
                } else {
                    self.connect_to_peer(&from)
                };
                let Some(peer) = self.peers.get_mut(&from) else {
                    return outbound;
                };
                match peer.connection.accept_offer(&sdp) {
                    Ok(answer) => outbound.push(OutboundSignal {
                        target: from.clone(),
                        signal: RtcSignal::RtcAnswer {
                            sdp: answer,
                            from: self.self_id.clone(),
                        },
                    }),
                    Err(e) => warn!("Voice: answer for {} failed: {}", from, e),
                }
                outbound
            }
            RtcSignal::RtcAnswer { sdp, .. } => {
                if let Some(peer) = self.peers.get_mut(&from)
                    && let Err(e) = peer.connection.accept_answer(&sdp)
                {
                    warn!("Voice: remote answer from {} rejected: {}", from, e);
                }
                Vec::new()
            }
            RtcSignal::RtcIce { candidate, .. } => {
                if let Some(peer) = self.peers.get_mut(&from)
                    && let Err(e) = peer.connection.add_remote_candidate(&candidate)
                {
                    debug!("Voice: ICE candidate from {} rejected: {}", from, e);
                }
                Vec::new()
            }
        }
    }

    /// Periodic service pass: ship gathered ICE candidates, tear down dead
    /// connections (each emits a final speaking=false, whether or not the
    /// peer was ever speaking), and report speaking flips. Call every
    /// [`SPEAKING_POLL_MS`].
    pub fn poll(&mut self) -> (Vec<OutboundSignal>, Vec<(PeerId, bool)>) {
        let mut outbound = Vec::new();
        let mut speaking_changes = Vec::new();
        let mut dead = Vec::new();

        for (id, peer) in self.peers.iter_mut() {
            match peer.connection.health() {
                ConnectionHealth::Disconnected | ConnectionHealth::Failed => {
                    dead.push(id.clone());
                    continue;
                }
                ConnectionHealth::New | ConnectionHealth::Connected => {}
            }

            for candidate in peer.connection.drain_local_candidates() {
                outbound.push(OutboundSignal {
                    target: id.clone(),
                    signal: RtcSignal::RtcIce {
                        candidate,
                        from: self.self_id.clone(),
                    },
                });
            }

            let speaking = peer
                .connection
                .audio_energy()
                .is_some_and(|avg| avg > SPEAKING_THRESHOLD);
            if speaking != peer.speaking {
                peer.speaking = speaking;
                speaking_changes.push((id.clone(), speaking));
            }
        }

        for id in dead {
            if let Some(mut peer) = self.peers.remove(&id) {
                peer.connection.close();
                speaking_changes.push((id.clone(), false));
                debug!("Voice: peer {} torn down", id);
            }
        }

        (outbound, speaking_changes)
    }

    /// Flip the local mute state at the track level; no renegotiation.
    /// Returns the new state.
    pub fn toggle_mute(&mut self) -> bool {
        self.muted = !self.muted;
        for peer in self.peers.values_mut() {
            peer.connection.set_outbound_enabled(!self.muted);
        }
        self.muted
    }

    /// Close every peer connection. Emits a final speaking=false for each.
    pub fn shutdown(&mut self) -> Vec<(PeerId, bool)> {
        let mut final_events = Vec::new();
        for (id, mut peer) in self.peers.drain() {
            peer.connection.close();
            final_events.push((id, false));
        }
        final_events
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scriptable media-engine fakes shared across the test suite.

    use super::*;
    use std::sync::{Arc, Mutex};

    pub struct FakeConnectionState {
        pub offers_created: usize,
        pub health: ConnectionHealth,
        pub energy: Option<f32>,
        pub pending_candidates: Vec<String>,
        pub outbound_enabled: bool,
        pub closed: bool,
    }

    impl FakeConnectionState {
        fn new() -> Self {
            Self {
                offers_created: 0,
                health: ConnectionHealth::New,
                energy: None,
                pending_candidates: Vec::new(),
                outbound_enabled: true,
                closed: false,
            }
        }
    }

    pub struct FakeConnection(Arc<Mutex<FakeConnectionState>>);

    impl PeerConnection for FakeConnection {
        fn create_offer(&mut self) -> Result<String, VoiceError> {
            self.0.lock().unwrap().offers_created += 1;
            Ok("offer-sdp".to_string())
        }

        fn accept_offer(&mut self, _sdp: &str) -> Result<String, VoiceError> {
            Ok("answer-sdp".to_string())
        }

        fn accept_answer(&mut self, _sdp: &str) -> Result<(), VoiceError> {
            self.0.lock().unwrap().health = ConnectionHealth::Connected;
            Ok(())
        }

        fn add_remote_candidate(&mut self, _candidate: &str) -> Result<(), VoiceError> {
            Ok(())
        }

        fn drain_local_candidates(&mut self) -> Vec<String> {
            std::mem::take(&mut self.0.lock().unwrap().pending_candidates)
        }

        fn health(&self) -> ConnectionHealth {
            self.0.lock().unwrap().health
        }

        fn audio_energy(&self) -> Option<f32> {
            self.0.lock().unwrap().energy
        }

        fn set_outbound_enabled(&mut self, enabled: bool) {
            self.0.lock().unwrap().outbound_enabled = enabled;
        }

        fn close(&mut self) {
            self.0.lock().unwrap().closed = true;
        }
    }

    /// Inspection handle to every connection a [`FakeEngine`] has built.
    #[derive(Clone, Default)]
    pub struct ConnLog(Arc<Mutex<Vec<Arc<Mutex<FakeConnectionState>>>>>);

    impl ConnLog {
        pub fn len(&self) -> usize {
            self.0.lock().unwrap().len()
        }

        pub fn get(&self, index: usize) -> Arc<Mutex<FakeConnectionState>> {
            Arc::clone(&self.0.lock().unwrap()[index])
        }
    }

    #[derive(Default)]
    pub struct FakeEngine {
        pub deny_mic: bool,
        pub log: ConnLog,
    }

    impl MediaEngine for FakeEngine {
        fn capture_local_audio(&mut self) -> Result<(), VoiceError> {
            if self.deny_mic {
                Err(VoiceError::PermissionDenied)
            } else {
                Ok(())
            }
        }

        fn create_connection(&mut self) -> Result<Box<dyn PeerConnection>, VoiceError> {
            let state = Arc::new(Mutex::new(FakeConnectionState::new()));
            self.log.0.lock().unwrap().push(Arc::clone(&state));
            Ok(Box::new(FakeConnection(state)))
        }
    }
}
