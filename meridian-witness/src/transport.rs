//! Transport seam and the in-memory implementation
//!
//! The coordinator never touches sockets directly: it consumes
//! `PeerEvent`s and sends frames through `PeerTransport`. The in-memory
//! hub wires several coordinators together for tests; the TCP
//! implementation lives in `tcp`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::{WitnessError, WitnessResult};
use crate::message::{PeerEvent, PeerMessage, SocketId};

/// Frame transport between witnesses.
#[async_trait]
pub trait PeerTransport: Send + Sync {
    /// Open a socket to `address`; both ends receive a `Connected` event.
    async fn connect(&self, address: &str) -> WitnessResult<SocketId>;

    /// Send one frame on an open socket.
    async fn send(&self, socket: SocketId, message: &PeerMessage) -> WitnessResult<()>;

    /// Close a socket; both ends receive `Disconnected`.
    async fn disconnect(&self, socket: SocketId) -> WitnessResult<()>;

    /// Remote address of an open socket, used for the handshake IP check.
    fn peer_address(&self, socket: SocketId) -> Option<String>;
}

struct Link {
    owner: String,
    peer_socket: SocketId,
    peer_address: String,
}

#[derive(Default)]
struct HubInner {
    next_socket: SocketId,
    endpoints: HashMap<String, mpsc::UnboundedSender<PeerEvent>>,
    links: HashMap<SocketId, Link>,
}

/// In-memory switchboard connecting several node transports. Cloning
/// shares the switchboard.
#[derive(Clone, Default)]
pub struct MemoryHub {
    inner: Arc<Mutex<HubInner>>,
}

impl MemoryHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a node under `address`; returns its transport and the
    /// event stream the coordinator should consume.
    pub fn register(
        &self,
        address: impl Into<String>,
    ) -> (Arc<MemoryPeerTransport>, mpsc::UnboundedReceiver<PeerEvent>) {
        let address = address.into();
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner
            .lock()
            .expect("hub lock poisoned")
            .endpoints
            .insert(address.clone(), tx);
        (
            Arc::new(MemoryPeerTransport {
                hub: self.clone(),
                address,
            }),
            rx,
        )
    }

    fn connect(&self, from: &str, to: &str) -> WitnessResult<SocketId> {
        let mut inner = self.inner.lock().expect("hub lock poisoned");
        if !inner.endpoints.contains_key(to) {
            return Err(WitnessError::Connection(format!("unknown address {to}")));
        }

        inner.next_socket += 1;
        let local = inner.next_socket;
        inner.next_socket += 1;
        let remote = inner.next_socket;

        inner.links.insert(
            local,
            Link {
                owner: from.to_string(),
                peer_socket: remote,
                peer_address: to.to_string(),
            },
        );
        inner.links.insert(
            remote,
            Link {
                owner: to.to_string(),
                peer_socket: local,
                peer_address: from.to_string(),
            },
        );

        deliver(
            &inner,
            to,
            PeerEvent::Connected {
                socket: remote,
                address: from.to_string(),
            },
        );
        deliver(
            &inner,
            from,
            PeerEvent::Connected {
                socket: local,
                address: to.to_string(),
            },
        );
        Ok(local)
    }

    fn send(&self, socket: SocketId, message: PeerMessage) -> WitnessResult<()> {
        let inner = self.inner.lock().expect("hub lock poisoned");
        let link = inner
            .links
            .get(&socket)
            .ok_or(WitnessError::NotConnected(socket))?;
        let peer_owner = inner
            .links
            .get(&link.peer_socket)
            .map(|l| l.owner.clone())
            .ok_or(WitnessError::NotConnected(socket))?;
        deliver(
            &inner,
            &peer_owner,
            PeerEvent::Message {
                socket: link.peer_socket,
                message,
            },
        );
        Ok(())
    }

    fn disconnect(&self, socket: SocketId) -> WitnessResult<()> {
        let mut inner = self.inner.lock().expect("hub lock poisoned");
        let Some(link) = inner.links.remove(&socket) else {
            return Ok(());
        };
        deliver(&inner, &link.owner, PeerEvent::Disconnected { socket });
        if let Some(peer) = inner.links.remove(&link.peer_socket) {
            deliver(
                &inner,
                &peer.owner,
                PeerEvent::Disconnected {
                    socket: link.peer_socket,
                },
            );
        }
        Ok(())
    }

    fn peer_address(&self, socket: SocketId) -> Option<String> {
        let inner = self.inner.lock().expect("hub lock poisoned");
        inner.links.get(&socket).map(|l| l.peer_address.clone())
    }
}

fn deliver(inner: &HubInner, address: &str, event: PeerEvent) {
    if let Some(tx) = inner.endpoints.get(address) {
        // a dropped receiver just means the node is shutting down
        let _ = tx.send(event);
    }
}

/// One node's view of the hub.
pub struct MemoryPeerTransport {
    hub: MemoryHub,
    address: String,
}

impl MemoryPeerTransport {
    pub fn address(&self) -> &str {
        &self.address
    }
}

#[async_trait]
impl PeerTransport for MemoryPeerTransport {
    async fn connect(&self, address: &str) -> WitnessResult<SocketId> {
        self.hub.connect(&self.address, address)
    }

    async fn send(&self, socket: SocketId, message: &PeerMessage) -> WitnessResult<()> {
        self.hub.send(socket, message.clone())
    }

    async fn disconnect(&self, socket: SocketId) -> WitnessResult<()> {
        self.hub.disconnect(socket)
    }

    fn peer_address(&self, socket: SocketId) -> Option<String> {
        self.hub.peer_address(socket)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::HandshakePayload;

    #[tokio::test]
    async fn connect_send_disconnect() {
        let hub = MemoryHub::new();
        let (a, mut a_rx) = hub.register("10.0.0.1:5001");
        let (_b, mut b_rx) = hub.register("10.0.0.2:5001");

        let socket = a.connect("10.0.0.2:5001").await.unwrap();

        // both sides observe the connection
        let PeerEvent::Connected { address, .. } = a_rx.try_recv().unwrap() else {
            panic!("expected Connected");
        };
        assert_eq!(address, "10.0.0.2:5001");
        let PeerEvent::Connected {
            socket: b_socket,
            address,
        } = b_rx.try_recv().unwrap()
        else {
            panic!("expected Connected");
        };
        assert_eq!(address, "10.0.0.1:5001");

        assert_eq!(a.peer_address(socket).as_deref(), Some("10.0.0.2:5001"));

        let frame = PeerMessage::Handshake(HandshakePayload {
            auth_token: "t".repeat(32),
            signature: "00".repeat(65),
            account: "node_a".to_string(),
        });
        a.send(socket, &frame).await.unwrap();

        let PeerEvent::Message { socket, .. } = b_rx.try_recv().unwrap() else {
            panic!("expected Message");
        };
        assert_eq!(socket, b_socket);

        a.disconnect(socket).await.unwrap();
        assert!(matches!(
            b_rx.try_recv().unwrap(),
            PeerEvent::Disconnected { .. }
        ));
        assert!(a.send(socket, &frame).await.is_err());
    }

    #[tokio::test]
    async fn connect_to_unknown_address_fails() {
        let hub = MemoryHub::new();
        let (a, _rx) = hub.register("10.0.0.1:5001");
        assert!(a.connect("10.9.9.9:1").await.is_err());
    }
}
