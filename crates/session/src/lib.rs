//! Gear-grinder multiplayer coordination core.
//!
//! Everything that makes the arcade cycling game multiplayer lives here:
//! the pub/sub signaling transport, room discovery, presence/roster
//! management, the race-start state machine, remote-rider position
//! replication, and peer-to-peer voice negotiation. Rendering, audio
//! synthesis, and the physics tick are external collaborators reached
//! through the traits in [`visuals`] and [`voice`].

pub mod clock;
pub mod config;
pub mod directory;
pub mod race;
pub mod replication;
pub mod roster;
pub mod session;
pub mod transport;
pub mod visuals;
pub mod voice;

pub use config::Config;
pub use replication::LocalFrame;
pub use session::{MpSession, SessionCommand, SessionEvent, run_session};
