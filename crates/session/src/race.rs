//! Race coordination state machine.
//!
//! There is no authority: any roster member may trigger the start. The
//! trigger picks a ms-epoch timestamp three seconds out and broadcasts it;
//! every peer (the trigger included) counts down against its own clock.
//! Countdown skew between peers is therefore their clock offset plus one
//! message latency; no clock synchronization is attempted.

/// Lifetime of one multiplayer session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RaceState {
    #[default]
    Disconnected,
    Lobby,
    Countdown,
    Racing,
}

/// How far ahead of "now" a locally-triggered start is scheduled.
pub const COUNTDOWN_LEAD_MS: u64 = 3_000;

/// Countdown observations produced by [`RaceCoordinator::poll`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RaceSignal {
    /// The user-visible integer second changed (3, 2, 1, ...).
    Countdown(u32),
    /// Countdown hit zero: show "GO" and start the simulation.
    Go,
}

/// Forward-only coordinator: `Disconnected → Lobby → Countdown → Racing`.
///
/// There is no countdown abort, and finishing a race does not leave
/// `Racing` — a retry resets the external simulation in place.
#[derive(Debug, Default)]
pub struct RaceCoordinator {
    state: RaceState,
    start_at_ms: Option<u64>,
    displayed_second: Option<u32>,
}

impl RaceCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> RaceState {
        self.state
    }

    pub fn is_racing(&self) -> bool {
        self.state == RaceState::Racing
    }

    /// Transport connected and room subscribed.
    pub fn enter_lobby(&mut self) {
        if self.state == RaceState::Disconnected {
            self.state = RaceState::Lobby;
        }
    }

    /// Arm the countdown toward `start_at_ms`. Idempotent: once counting
    /// down (or racing), later broadcasts are ignored — the first one wins
    /// and no second timer is created. Returns whether the countdown was
    /// armed by this call.
    pub fn schedule_start(&mut self, start_at_ms: u64) -> bool {
        match self.state {
            RaceState::Lobby => {
                self.state = RaceState::Countdown;
                self.start_at_ms = Some(start_at_ms);
                self.displayed_second = None;
                true
            }
            _ => false,
        }
    }

    /// Advance the countdown against the local clock. Emits one signal per
    /// displayed-second change and `Go` exactly once, transitioning to
    /// `Racing`.
    pub fn poll(&mut self, now_ms: u64) -> Vec<RaceSignal> {
        let mut signals = Vec::new();
        if self.state != RaceState::Countdown {
            return signals;
        }
        let Some(start_at) = self.start_at_ms else {
            return signals;
        };

        if now_ms >= start_at {
            self.state = RaceState::Racing;
            self.start_at_ms = None;
            self.displayed_second = None;
            signals.push(RaceSignal::Go);
            return signals;
        }

        let remaining = start_at - now_ms;
        let second = remaining.div_ceil(1_000) as u32;
        if self.displayed_second != Some(second) {
            self.displayed_second = Some(second);
            signals.push(RaceSignal::Countdown(second));
        }
        signals
    }
}
