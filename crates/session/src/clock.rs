//! Wall-clock access.
//!
//! All coordination timing (heartbeats, staleness, countdown targets) is
//! expressed as ms-epoch timestamps, because the race-start timestamp is
//! exchanged over the wire and compared against each peer's own clock.
//! Functions that depend on time take `now_ms` as a parameter so tests can
//! drive them without sleeping.

use std::time::{SystemTime, UNIX_EPOCH};

/// Current wall-clock time in milliseconds since the Unix epoch.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
