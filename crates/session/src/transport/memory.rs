//! In-process loopback broker.
//!
//! Same delivery semantics as the relay (publishes fan out to every
//! subscriber of the topic, including the publisher itself), without any
//! sockets. Used by the test suite and by `rider --local`.

use super::{Inbound, Transport, TransportError, TransportEvent};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

type ConnId = u64;

#[derive(Default)]
struct BrokerInner {
    next_id: ConnId,
    /// topic -> subscribed connections.
    subscriptions: HashMap<String, Vec<ConnId>>,
    senders: HashMap<ConnId, UnboundedSender<TransportEvent>>,
}

/// Shared in-memory broker. Cheap to clone.
#[derive(Clone, Default)]
pub struct MemoryBroker {
    inner: Arc<Mutex<BrokerInner>>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a new connection to this broker.
    pub fn connect(&self) -> (MemoryTransport, UnboundedReceiver<TransportEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = {
            let mut inner = self.inner.lock().expect("broker lock poisoned");
            let id = inner.next_id;
            inner.next_id += 1;
            inner.senders.insert(id, tx);
            id
        };
        (
            MemoryTransport {
                id,
                inner: Arc::clone(&self.inner),
            },
            rx,
        )
    }

    /// Drop a connection: unsubscribe everywhere and signal loss to its
    /// receiver. Used by tests to simulate a broker-side disconnect.
    pub fn disconnect(&self, transport: &MemoryTransport) {
        let mut inner = self.inner.lock().expect("broker lock poisoned");
        for subs in inner.subscriptions.values_mut() {
            subs.retain(|&c| c != transport.id);
        }
        if let Some(tx) = inner.senders.remove(&transport.id) {
            let _ = tx.send(TransportEvent::Lost {
                reason: "disconnected by broker".to_string(),
            });
        }
    }
}

/// One connection to a [`MemoryBroker`].
pub struct MemoryTransport {
    id: ConnId,
    inner: Arc<Mutex<BrokerInner>>,
}

impl Transport for MemoryTransport {
    fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), TransportError> {
        let inner = self.inner.lock().expect("broker lock poisoned");
        if !inner.senders.contains_key(&self.id) {
            return Err(TransportError::Closed);
        }
        if let Some(subs) = inner.subscriptions.get(topic) {
            for conn in subs {
                if let Some(tx) = inner.senders.get(conn) {
                    let _ = tx.send(TransportEvent::Message(Inbound {
                        topic: topic.to_string(),
                        payload: payload.clone(),
                    }));
                }
            }
        }
        Ok(())
    }

    fn subscribe(&self, topic: &str) -> Result<(), TransportError> {
        let mut inner = self.inner.lock().expect("broker lock poisoned");
        if !inner.senders.contains_key(&self.id) {
            return Err(TransportError::Closed);
        }
        let subs = inner.subscriptions.entry(topic.to_string()).or_default();
        if !subs.contains(&self.id) {
            subs.push(self.id);
        }
        Ok(())
    }

    fn unsubscribe(&self, topic: &str) -> Result<(), TransportError> {
        let mut inner = self.inner.lock().expect("broker lock poisoned");
        if let Some(subs) = inner.subscriptions.get_mut(topic) {
            subs.retain(|&c| c != self.id);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn try_recv_message(rx: &mut UnboundedReceiver<TransportEvent>) -> Option<Inbound> {
        match rx.try_recv().ok()? {
            TransportEvent::Message(m) => Some(m),
            TransportEvent::Lost { .. } => None,
        }
    }

    #[test]
    fn test_fanout_includes_publisher() {
        let broker = MemoryBroker::new();
        let (a, mut a_rx) = broker.connect();
        let (b, mut b_rx) = broker.connect();
        a.subscribe("t").unwrap();
        b.subscribe("t").unwrap();

        a.publish("t", b"hi".to_vec()).unwrap();

        assert_eq!(try_recv_message(&mut a_rx).unwrap().payload, b"hi");
        assert_eq!(try_recv_message(&mut b_rx).unwrap().payload, b"hi");
    }

    #[test]
    fn test_no_delivery_without_subscription() {
        let broker = MemoryBroker::new();
        let (a, _a_rx) = broker.connect();
        let (_b, mut b_rx) = broker.connect();
        a.publish("t", b"hi".to_vec()).unwrap();
        assert!(try_recv_message(&mut b_rx).is_none());
    }

    #[test]
    fn test_disconnect_emits_lost() {
        let broker = MemoryBroker::new();
        let (a, mut a_rx) = broker.connect();
        broker.disconnect(&a);
        match a_rx.try_recv().unwrap() {
            TransportEvent::Lost { .. } => {}
            other => panic!("expected Lost, got {other:?}"),
        }
        assert!(a.publish("t", vec![]).is_err());
    }
}
