//! Gear Grinder relay: a topic pub/sub broker over WebSocket.
//!
//! Clients speak the envelope protocol: `hello` to identify, `sub`/`unsub`
//! to manage topic subscriptions, `pub` to publish. Every publish fans out
//! as a `msg` frame to all current subscribers of the topic, the publisher
//! included. The relay never inspects payloads.

use anyhow::Result;
use futures_util::{SinkExt, StreamExt};
use session::transport::Envelope;
use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::RwLock;
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

type ConnId = u64;

#[derive(Default)]
struct RelayState {
    next_id: ConnId,
    /// topic -> subscribed connections.
    subscriptions: HashMap<String, HashSet<ConnId>>,
    /// Connection writer queues.
    senders: HashMap<ConnId, UnboundedSender<Message>>,
    /// Self-reported client identities, for logging only.
    names: HashMap<ConnId, String>,
}

impl RelayState {
    fn add_connection(&mut self, tx: UnboundedSender<Message>) -> ConnId {
        let id = self.next_id;
        self.next_id += 1;
        self.senders.insert(id, tx);
        id
    }

    fn remove_connection(&mut self, id: ConnId) {
        self.senders.remove(&id);
        self.names.remove(&id);
        self.subscriptions.retain(|_, subs| {
            subs.remove(&id);
            !subs.is_empty()
        });
    }

    fn handle_frame(&mut self, id: ConnId, frame: Envelope) {
        match frame {
            Envelope::Hello { id: name } => {
                info!("Connection {} identifies as {}", id, name);
                self.names.insert(id, name);
            }
            Envelope::Sub { topic } => {
                self.subscriptions.entry(topic).or_default().insert(id);
            }
            Envelope::Unsub { topic } => {
                if let Some(subs) = self.subscriptions.get_mut(&topic) {
                    subs.remove(&id);
                    if subs.is_empty() {
                        self.subscriptions.remove(&topic);
                    }
                }
            }
            Envelope::Pub { topic, payload } => {
                let Some(subs) = self.subscriptions.get(&topic) else {
                    return;
                };
                let frame = Message::text(Envelope::Msg { topic, payload }.encode());
                for conn in subs {
                    if let Some(tx) = self.senders.get(conn) {
                        let _ = tx.send(frame.clone());
                    }
                }
            }
            // Only the relay emits msg frames.
            Envelope::Msg { .. } => debug!("Ignoring msg frame from connection {}", id),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Gear Grinder relay v{}", env!("CARGO_PKG_VERSION"));

    let addr = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "0.0.0.0:9001".to_string());
    let listener = TcpListener::bind(&addr).await?;
    info!("Listening on ws://{}", addr);

    let state = Arc::new(RwLock::new(RelayState::default()));

    loop {
        let (stream, addr) = listener.accept().await?;
        let state = Arc::clone(&state);
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, addr, state).await {
                error!("Connection error from {}: {}", addr, e);
            }
        });
    }
}

/// Handle a single client connection until it closes.
async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    state: Arc<RwLock<RelayState>>,
) -> Result<()> {
    let ws_stream = accept_async(stream).await?;
    info!("New connection from {}", addr);

    let (mut write, mut read) = ws_stream.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
    let id = {
        let mut state = state.write().await;
        state.add_connection(tx)
    };

    // Writer task drains this connection's queue so a slow client never
    // blocks the fanout of a publish.
    let writer = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if write.send(msg).await.is_err() {
                break;
            }
        }
        let _ = write.close().await;
    });

    while let Some(msg) = read.next().await {
        match msg {
            Ok(Message::Text(text)) => match Envelope::decode(&text) {
                Ok(frame) => {
                    let mut state = state.write().await;
                    state.handle_frame(id, frame);
                }
                Err(e) => debug!("Dropping malformed frame from {}: {}", addr, e),
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                warn!("WebSocket error from {}: {}", addr, e);
                break;
            }
        }
    }

    {
        let mut state = state.write().await;
        state.remove_connection(id);
    }
    writer.abort();
    info!("Client {} disconnected", addr);
    Ok(())
}
