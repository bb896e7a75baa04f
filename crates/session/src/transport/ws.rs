//! WebSocket transport speaking the relay envelope protocol.

use super::{Envelope, Inbound, Transport, TransportError, TransportEvent};
use futures_util::{SinkExt, StreamExt};
use protocol::PeerId;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

/// A broker connection over WebSocket.
///
/// Two tasks are spawned per connection: a writer draining the outbound
/// queue, and a reader turning relay frames into [`TransportEvent`]s. Both
/// end when the socket closes; the reader emits a final `Lost` event.
pub struct WsTransport {
    outbound: UnboundedSender<Envelope>,
}

impl WsTransport {
    /// Connect to the relay. Failure surfaces once to the caller; there is
    /// no retry.
    pub async fn connect(
        url: &str,
        client_id: &PeerId,
    ) -> Result<(Self, UnboundedReceiver<TransportEvent>), TransportError> {
        let (ws, _) = connect_async(url)
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        info!("Connected to broker at {} as {}", url, client_id);

        let (mut write, mut read) = ws.split();
        let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<Envelope>();
        let (events, events_rx) = mpsc::unbounded_channel::<TransportEvent>();

        let _ = outbound.send(Envelope::Hello {
            id: client_id.as_str().to_string(),
        });

        tokio::spawn(async move {
            while let Some(frame) = outbound_rx.recv().await {
                if write.send(Message::text(frame.encode())).await.is_err() {
                    break;
                }
            }
            let _ = write.close().await;
        });

        tokio::spawn(async move {
            let reason = loop {
                match read.next().await {
                    Some(Ok(Message::Text(text))) => match Envelope::decode(&text) {
                        Ok(Envelope::Msg { topic, payload }) => {
                            let inbound = Inbound {
                                topic,
                                payload: payload.into_bytes(),
                            };
                            if events.send(TransportEvent::Message(inbound)).is_err() {
                                break "receiver dropped".to_string();
                            }
                        }
                        Ok(other) => debug!("Ignoring unexpected relay frame: {:?}", other),
                        // Malformed frames are dropped, not fatal.
                        Err(e) => debug!("Dropping malformed relay frame: {}", e),
                    },
                    Some(Ok(Message::Close(_))) | None => break "connection closed".to_string(),
                    Some(Ok(_)) => {}
                    Some(Err(e)) => break e.to_string(),
                }
            };
            warn!("Broker connection lost: {}", reason);
            let _ = events.send(TransportEvent::Lost { reason });
        });

        Ok((Self { outbound }, events_rx))
    }

    fn send(&self, frame: Envelope) -> Result<(), TransportError> {
        self.outbound.send(frame).map_err(|_| TransportError::Closed)
    }
}

impl Transport for WsTransport {
    fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), TransportError> {
        let payload = String::from_utf8(payload).map_err(|_| TransportError::NonText)?;
        self.send(Envelope::Pub {
            topic: topic.to_string(),
            payload,
        })
    }

    fn subscribe(&self, topic: &str) -> Result<(), TransportError> {
        self.send(Envelope::Sub {
            topic: topic.to_string(),
        })
    }

    fn unsubscribe(&self, topic: &str) -> Result<(), TransportError> {
        self.send(Envelope::Unsub {
            topic: topic.to_string(),
        })
    }
}
