//! TCP frame transport
//!
//! Length-prefixed JSON frames over one TCP connection per peer: a
//! 4-byte big-endian length followed by the serialized `PeerMessage`.
//! Incoming connections and frames surface as `PeerEvent`s on the same
//! stream the in-memory transport uses, so the coordinator cannot tell
//! them apart.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex, RwLock};
use tracing::{debug, warn};

use crate::error::{WitnessError, WitnessResult};
use crate::message::{PeerEvent, PeerMessage, SocketId};
use crate::transport::PeerTransport;

/// Maximum accepted frame size.
const MAX_FRAME_BYTES: usize = 1024 * 1024;

struct Connection {
    writer: Arc<Mutex<OwnedWriteHalf>>,
    address: String,
}

type Connections = Arc<StdMutex<HashMap<SocketId, Connection>>>;

/// TCP implementation of the peer transport.
pub struct TcpPeerTransport {
    connections: Connections,
    events_tx: mpsc::UnboundedSender<PeerEvent>,
    events_rx: StdMutex<Option<mpsc::UnboundedReceiver<PeerEvent>>>,
    next_socket: Arc<AtomicU64>,
    shutdown: Arc<RwLock<bool>>,
}

impl TcpPeerTransport {
    pub fn new() -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            connections: Arc::new(StdMutex::new(HashMap::new())),
            events_tx,
            events_rx: StdMutex::new(Some(events_rx)),
            next_socket: Arc::new(AtomicU64::new(1)),
            shutdown: Arc::new(RwLock::new(false)),
        }
    }

    /// Take the event receiver; can only be done once.
    pub fn take_event_receiver(&self) -> Option<mpsc::UnboundedReceiver<PeerEvent>> {
        self.events_rx.lock().expect("receiver lock poisoned").take()
    }

    /// Bind the listener and start accepting peers. Returns the bound
    /// address (useful when binding port 0).
    pub async fn start(&self, bind_address: &str) -> WitnessResult<String> {
        let listener = TcpListener::bind(bind_address)
            .await
            .map_err(|e| WitnessError::Connection(format!("failed to bind {bind_address}: {e}")))?;
        let local_address = listener
            .local_addr()
            .map_err(|e| WitnessError::Connection(e.to_string()))?
            .to_string();
        debug!(address = %local_address, "peer listener started");

        let connections = self.connections.clone();
        let events_tx = self.events_tx.clone();
        let next_socket = self.next_socket.clone();
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            loop {
                if *shutdown.read().await {
                    break;
                }
                match listener.accept().await {
                    Ok((stream, addr)) => {
                        register_connection(
                            &connections,
                            &events_tx,
                            &next_socket,
                            stream,
                            addr.to_string(),
                        );
                    }
                    Err(e) => {
                        warn!(error = %e, "accept failed");
                    }
                }
            }
        });
        Ok(local_address)
    }

    /// Stop accepting and drop every connection.
    pub async fn stop(&self) {
        *self.shutdown.write().await = true;
        self.connections
            .lock()
            .expect("connection lock poisoned")
            .clear();
    }
}

impl Default for TcpPeerTransport {
    fn default() -> Self {
        Self::new()
    }
}

/// Store the connection, announce it and spawn its read loop.
fn register_connection(
    connections: &Connections,
    events_tx: &mpsc::UnboundedSender<PeerEvent>,
    next_socket: &AtomicU64,
    stream: TcpStream,
    address: String,
) -> SocketId {
    let socket = next_socket.fetch_add(1, Ordering::SeqCst);
    let (reader, writer) = stream.into_split();

    connections.lock().expect("connection lock poisoned").insert(
        socket,
        Connection {
            writer: Arc::new(Mutex::new(writer)),
            address: address.clone(),
        },
    );
    let _ = events_tx.send(PeerEvent::Connected {
        socket,
        address: address.clone(),
    });

    tokio::spawn(read_loop(
        connections.clone(),
        events_tx.clone(),
        socket,
        reader,
        address,
    ));
    socket
}

async fn read_loop(
    connections: Connections,
    events_tx: mpsc::UnboundedSender<PeerEvent>,
    socket: SocketId,
    mut reader: OwnedReadHalf,
    address: String,
) {
    loop {
        match read_frame(&mut reader).await {
            Ok(message) => {
                let _ = events_tx.send(PeerEvent::Message { socket, message });
            }
            Err(e) => {
                debug!(socket, address = %address, error = %e, "peer connection closed");
                break;
            }
        }
    }
    let removed = connections
        .lock()
        .expect("connection lock poisoned")
        .remove(&socket);
    if removed.is_some() {
        let _ = events_tx.send(PeerEvent::Disconnected { socket });
    }
}

async fn read_frame(reader: &mut OwnedReadHalf) -> WitnessResult<PeerMessage> {
    let mut len_buf = [0u8; 4];
    reader
        .read_exact(&mut len_buf)
        .await
        .map_err(|e| WitnessError::Connection(e.to_string()))?;
    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_FRAME_BYTES {
        return Err(WitnessError::InvalidMessage(format!(
            "frame too large: {len} bytes"
        )));
    }

    let mut frame = vec![0u8; len];
    reader
        .read_exact(&mut frame)
        .await
        .map_err(|e| WitnessError::Connection(e.to_string()))?;
    serde_json::from_slice(&frame).map_err(|e| WitnessError::InvalidMessage(e.to_string()))
}

async fn write_frame(writer: &Mutex<OwnedWriteHalf>, message: &PeerMessage) -> WitnessResult<()> {
    let frame = serde_json::to_vec(message)?;
    if frame.len() > MAX_FRAME_BYTES {
        return Err(WitnessError::InvalidMessage(format!(
            "frame too large: {} bytes",
            frame.len()
        )));
    }
    let mut writer = writer.lock().await;
    writer
        .write_all(&(frame.len() as u32).to_be_bytes())
        .await
        .map_err(|e| WitnessError::Connection(e.to_string()))?;
    writer
        .write_all(&frame)
        .await
        .map_err(|e| WitnessError::Connection(e.to_string()))?;
    Ok(())
}

#[async_trait]
impl PeerTransport for TcpPeerTransport {
    async fn connect(&self, address: &str) -> WitnessResult<SocketId> {
        let stream = TcpStream::connect(address)
            .await
            .map_err(|e| WitnessError::Connection(format!("connect {address}: {e}")))?;
        Ok(register_connection(
            &self.connections,
            &self.events_tx,
            &self.next_socket,
            stream,
            address.to_string(),
        ))
    }

    async fn send(&self, socket: SocketId, message: &PeerMessage) -> WitnessResult<()> {
        let writer = {
            let connections = self.connections.lock().expect("connection lock poisoned");
            connections
                .get(&socket)
                .map(|c| c.writer.clone())
                .ok_or(WitnessError::NotConnected(socket))?
        };
        write_frame(&writer, message).await
    }

    async fn disconnect(&self, socket: SocketId) -> WitnessResult<()> {
        let removed = self
            .connections
            .lock()
            .expect("connection lock poisoned")
            .remove(&socket);
        if let Some(connection) = removed {
            let mut writer = connection.writer.lock().await;
            let _ = writer.shutdown().await;
            let _ = self.events_tx.send(PeerEvent::Disconnected { socket });
        }
        Ok(())
    }

    fn peer_address(&self, socket: SocketId) -> Option<String> {
        self.connections
            .lock()
            .expect("connection lock poisoned")
            .get(&socket)
            .map(|c| c.address.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::HandshakePayload;

    #[tokio::test]
    async fn frames_cross_a_real_socket() {
        let server = Arc::new(TcpPeerTransport::new());
        let mut server_events = server.take_event_receiver().unwrap();
        let address = server.start("127.0.0.1:0").await.unwrap();

        let client = Arc::new(TcpPeerTransport::new());
        let mut client_events = client.take_event_receiver().unwrap();
        let socket = client.connect(&address).await.unwrap();

        // client observes its own outbound connection
        assert!(matches!(
            client_events.recv().await.unwrap(),
            PeerEvent::Connected { .. }
        ));
        // server observes the inbound connection
        let PeerEvent::Connected { socket: inbound, .. } = server_events.recv().await.unwrap()
        else {
            panic!("expected Connected");
        };

        let frame = PeerMessage::Handshake(HandshakePayload {
            auth_token: "t".repeat(32),
            signature: "00".repeat(65),
            account: "node_a".to_string(),
        });
        client.send(socket, &frame).await.unwrap();

        let PeerEvent::Message { message, .. } = server_events.recv().await.unwrap() else {
            panic!("expected Message");
        };
        assert!(matches!(message, PeerMessage::Handshake(_)));

        // replies flow the other way on the inbound socket
        server.send(inbound, &frame).await.unwrap();
        let PeerEvent::Message { .. } = client_events.recv().await.unwrap() else {
            panic!("expected Message");
        };

        client.disconnect(socket).await.unwrap();
        server.stop().await;
    }
}
