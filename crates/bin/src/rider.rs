//! Headless rider: joins a room and rides a synthetic bike, logging
//! everything the session reports. Useful for soak-testing the relay and
//! for populating a lobby during development.
//!
//! With `--local`, three riders race each other on an in-process broker
//! instead, with no relay required.

use anyhow::Result;
use protocol::{PeerId, RoomCode};
use session::directory::RoomScanner;
use session::transport::memory::MemoryBroker;
use session::transport::ws::WsTransport;
use session::visuals::{FlatTrack, NullVisuals};
use session::{Config, LocalFrame, MpSession, SessionCommand, SessionEvent, run_session};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Cruising speed of the synthetic bike, meters per second.
const RIDE_SPEED: f64 = 30.0;

/// How long to sit in the lobby before triggering a start.
const AUTO_START_AFTER: Duration = Duration::from_secs(2);

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Gear Grinder rider v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::load()?;
    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.iter().any(|a| a == "--local") {
        return run_local_demo(&config).await;
    }

    let room_arg = args.iter().find(|a| !a.starts_with("--"));
    let room = RoomCode::new(room_arg.map(String::as_str).unwrap_or(&config.player.room))?;

    scan_directory(&config).await;

    let peer_id = PeerId::generate();
    info!("Joining {} as {}", room, peer_id);

    let (transport, transport_events) = WsTransport::connect(&config.broker.url, &peer_id).await?;
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let session = MpSession::join(
        Box::new(transport),
        room,
        peer_id,
        &config.player.name,
        &config.broker.namespace,
        Box::new(FlatTrack),
        Box::new(NullVisuals::default()),
        events_tx,
    )?;

    let (commands_tx, commands_rx) = mpsc::unbounded_channel();
    let mut driver = tokio::spawn(run_session(session, transport_events, commands_rx));
    tokio::spawn(log_events(events_rx, true));
    tokio::spawn(drive_bike(commands_tx.clone(), RIDE_SPEED));

    tokio::select! {
        _ = &mut driver => {}
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down");
            let _ = commands_tx.send(SessionCommand::Leave);
            let _ = driver.await;
        }
    }

    Ok(())
}

/// Three riders on an in-process broker, racing until interrupted.
async fn run_local_demo(config: &Config) -> Result<()> {
    info!("Local demo: three riders on an in-process broker");
    let broker = MemoryBroker::new();
    let room = RoomCode::new(&config.player.room)?;

    for i in 0..3 {
        let (transport, transport_events) = broker.connect();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let session = MpSession::join(
            Box::new(transport),
            room.clone(),
            PeerId::generate(),
            &format!("Bot{}", i + 1),
            &config.broker.namespace,
            Box::new(FlatTrack),
            Box::new(NullVisuals::default()),
            events_tx,
        )?;
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        tokio::spawn(run_session(session, transport_events, commands_rx));
        // One narrator is enough; the others ride quietly.
        tokio::spawn(log_events(events_rx, i == 0));
        tokio::spawn(drive_bike(commands_tx, RIDE_SPEED + (i as f64) * 2.0));
    }

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    Ok(())
}

/// Feed the session one synthetic frame per 16 ms, triggering a race start
/// after the lobby grace period.
async fn drive_bike(commands: mpsc::UnboundedSender<SessionCommand>, speed: f64) {
    let mut frame_interval = tokio::time::interval(Duration::from_millis(16));
    let started_at = tokio::time::Instant::now();
    let mut triggered = false;
    let mut distance = 0.0f64;

    loop {
        frame_interval.tick().await;
        if !triggered && started_at.elapsed() >= AUTO_START_AFTER {
            triggered = true;
            let _ = commands.send(SessionCommand::TriggerStart);
        }
        let dt = 0.016;
        distance += speed * dt;
        let frame = LocalFrame {
            distance,
            lane_x: 0.0,
            world_z: -distance,
            difficulty: 1.0,
            dt,
        };
        if commands.send(SessionCommand::Tick(frame)).is_err() {
            break;
        }
    }
}

/// Watch the directory for a moment on an anonymous connection and report
/// what is out there.
async fn scan_directory(config: &Config) {
    let scan_id = PeerId::generate_scan();
    let (transport, events) = match WsTransport::connect(&config.broker.url, &scan_id).await {
        Ok(c) => c,
        Err(e) => {
            warn!("Directory scan skipped: {}", e);
            return;
        }
    };
    let (rooms_tx, mut rooms_rx) = mpsc::unbounded_channel();
    let scanner = RoomScanner::spawn(
        Box::new(transport),
        events,
        &config.broker.namespace,
        rooms_tx,
    );

    let listing = tokio::time::timeout(Duration::from_secs(3), rooms_rx.recv()).await;
    match listing {
        Ok(Some(rooms)) => {
            for room in rooms {
                info!("Discovered room {} with {} riders", room.room, room.players);
            }
        }
        _ => info!("No active rooms discovered"),
    }
    scanner.stop();
}

async fn log_events(mut events: mpsc::UnboundedReceiver<SessionEvent>, verbose: bool) {
    // Leaderboards arrive every racing frame; log roughly every two seconds.
    let mut boards_seen = 0u64;
    while let Some(event) = events.recv().await {
        if !verbose {
            // Quiet riders still surface fatal conditions.
            if let SessionEvent::ConnectionLost { reason } = event {
                warn!("Connection lost: {}", reason);
            }
            continue;
        }
        match event {
            SessionEvent::RosterChanged(entries) => {
                let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
                info!("Roster: {}", names.join(", "));
            }
            SessionEvent::RoomList(rooms) => {
                for room in rooms {
                    info!(
                        "Room {}: {} riders{}",
                        room.room,
                        room.players,
                        if room.racing { " (racing)" } else { "" }
                    );
                }
            }
            SessionEvent::CountdownTick(second) => info!("{}...", second),
            SessionEvent::RaceStarted => info!("GO!"),
            SessionEvent::Leaderboard(board) => {
                boards_seen += 1;
                if boards_seen % 125 == 0 {
                    let standings: Vec<String> = board
                        .iter()
                        .enumerate()
                        .map(|(i, e)| format!("{}. {} {:.0}m", i + 1, e.name, e.distance))
                        .collect();
                    info!("Standings: {}", standings.join("  "));
                }
            }
            SessionEvent::SpeakingChanged { peer, speaking } => {
                info!("{} {}", peer, if speaking { "speaking" } else { "quiet" });
            }
            SessionEvent::VoiceReady { enabled } => {
                info!("Voice {}", if enabled { "enabled" } else { "unavailable" });
            }
            SessionEvent::Toast(text) => info!("{}", text),
            SessionEvent::ConnectionLost { reason } => {
                warn!("Connection lost: {}", reason);
            }
        }
    }
}
