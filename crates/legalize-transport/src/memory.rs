//! In-process transport.
//!
//! [`channel`] returns a connector and the server end that controls it. The
//! server decides whether handshakes succeed, sees what each client sends and
//! can push frames, close with any code, or drop a peer without a close
//! frame. Useful for exercising reconnect behavior without sockets.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;
use url::Url;

use crate::traits::{Connection, ConnectionId, Connector, TransportError, TransportEvent};

/// Handshake bookkeeping shared by both ends.
#[derive(Debug)]
struct HandshakeState {
    accepting: bool,
    refuse_next: usize,
    handshakes: usize,
}

/// Create a connected connector/server pair.
///
/// The server starts out accepting handshakes.
#[must_use]
pub fn channel() -> (MemoryConnector, MemoryServer) {
    let state = Arc::new(Mutex::new(HandshakeState {
        accepting: true,
        refuse_next: 0,
        handshakes: 0,
    }));
    let (peers_tx, peers_rx) = mpsc::unbounded_channel();

    (
        MemoryConnector {
            state: Arc::clone(&state),
            peers_tx,
        },
        MemoryServer { state, peers_rx },
    )
}

/// Client side of the in-memory transport.
#[derive(Debug, Clone)]
pub struct MemoryConnector {
    state: Arc<Mutex<HandshakeState>>,
    peers_tx: mpsc::UnboundedSender<MemoryPeer>,
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self, url: &Url) -> Result<Box<dyn Connection>, TransportError> {
        {
            let mut state = self.state.lock();
            state.handshakes += 1;

            if state.refuse_next > 0 {
                state.refuse_next -= 1;
                return Err(TransportError::ConnectFailed("connection refused".into()));
            }
            if !state.accepting {
                return Err(TransportError::ConnectFailed("connection refused".into()));
            }
        }

        let (to_client, from_server) = mpsc::unbounded_channel();
        let (to_server, from_client) = mpsc::unbounded_channel();

        let peer = MemoryPeer {
            url: url.clone(),
            to_client: Some(to_client),
            from_client,
        };
        self.peers_tx
            .send(peer)
            .map_err(|_| TransportError::ConnectFailed("server is gone".into()))?;

        let conn = MemoryConnection {
            id: ConnectionId::generate(),
            to_server,
            from_server,
            is_open: true,
        };
        debug!(connection = %conn.id, "Memory handshake completed");

        Ok(Box::new(conn))
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

/// Server side of the in-memory transport.
#[derive(Debug)]
pub struct MemoryServer {
    state: Arc<Mutex<HandshakeState>>,
    peers_rx: mpsc::UnboundedReceiver<MemoryPeer>,
}

impl MemoryServer {
    /// Accept or refuse all following handshakes.
    pub fn set_accepting(&self, accepting: bool) {
        self.state.lock().accepting = accepting;
    }

    /// Refuse the next `count` handshakes, then fall back to `set_accepting`.
    pub fn refuse_next(&self, count: usize) {
        self.state.lock().refuse_next = count;
    }

    /// Number of handshakes attempted so far, refused ones included.
    #[must_use]
    pub fn handshake_count(&self) -> usize {
        self.state.lock().handshakes
    }

    /// Wait for the next accepted client.
    pub async fn accept(&mut self) -> Option<MemoryPeer> {
        self.peers_rx.recv().await
    }
}

/// Something a client sent to the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerEvent {
    /// A text frame.
    Text(String),
    /// The client closed the connection.
    Closed {
        /// Close code.
        code: u16,
        /// Close reason.
        reason: String,
    },
}

/// Server view of one accepted client.
#[derive(Debug)]
pub struct MemoryPeer {
    url: Url,
    to_client: Option<mpsc::UnboundedSender<TransportEvent>>,
    from_client: mpsc::UnboundedReceiver<PeerEvent>,
}

impl MemoryPeer {
    /// URL the client connected with.
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Push a text frame to the client.
    ///
    /// Returns `false` if the client is gone or the peer was closed.
    pub fn send_text(&self, text: &str) -> bool {
        self.send_raw(text.as_bytes().to_vec())
    }

    /// Push an arbitrary data frame to the client.
    pub fn send_raw(&self, data: Vec<u8>) -> bool {
        self.to_client
            .as_ref()
            .is_some_and(|tx| tx.send(TransportEvent::Message(data)).is_ok())
    }

    /// Send a close frame with `code`. Nothing can be pushed afterwards.
    pub fn close(&mut self, code: u16, reason: &str) -> bool {
        match self.to_client.take() {
            Some(tx) => tx
                .send(TransportEvent::Closed {
                    code,
                    reason: reason.to_string(),
                })
                .is_ok(),
            None => false,
        }
    }

    /// Drop the connection without a close frame.
    pub fn drop_abruptly(self) {}

    /// Wait for the next thing the client sends.
    ///
    /// Returns `None` once the client side is gone.
    pub async fn recv(&mut self) -> Option<PeerEvent> {
        self.from_client.recv().await
    }
}

/// Client end of an in-memory connection.
#[derive(Debug)]
pub struct MemoryConnection {
    id: ConnectionId,
    to_server: mpsc::UnboundedSender<PeerEvent>,
    from_server: mpsc::UnboundedReceiver<TransportEvent>,
    is_open: bool,
}

#[async_trait]
impl Connection for MemoryConnection {
    fn id(&self) -> &ConnectionId {
        &self.id
    }

    async fn recv(&mut self) -> Result<Option<TransportEvent>, TransportError> {
        match self.from_server.recv().await {
            Some(event) => {
                if matches!(event, TransportEvent::Closed { .. }) {
                    self.is_open = false;
                }
                Ok(Some(event))
            }
            None => {
                self.is_open = false;
                Ok(None)
            }
        }
    }

    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        if !self.is_open {
            return Err(TransportError::ConnectionClosed);
        }
        self.to_server
            .send(PeerEvent::Text(text))
            .map_err(|_| TransportError::SendFailed("peer is gone".into()))
    }

    async fn close(&mut self, code: u16, reason: &str) -> Result<(), TransportError> {
        if !self.is_open {
            return Ok(());
        }
        self.is_open = false;
        // The peer may already be gone; the close is still complete locally.
        let _ = self.to_server.send(PeerEvent::Closed {
            code,
            reason: reason.to_string(),
        });
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.is_open
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url() -> Url {
        Url::parse("ws://memory/ws?token=t").unwrap()
    }

    #[tokio::test]
    async fn test_accepted_roundtrip() {
        let (connector, mut server) = channel();

        let mut conn = connector.connect(&url()).await.unwrap();
        let mut peer = server.accept().await.unwrap();
        assert_eq!(peer.url().query(), Some("token=t"));

        conn.send_text("hello".into()).await.unwrap();
        assert_eq!(peer.recv().await, Some(PeerEvent::Text("hello".into())));

        assert!(peer.send_text("world"));
        assert_eq!(
            conn.recv().await.unwrap(),
            Some(TransportEvent::Message(b"world".to_vec()))
        );
    }

    #[tokio::test]
    async fn test_refuse_next_then_accept() {
        let (connector, server) = channel();
        server.refuse_next(2);

        assert!(connector.connect(&url()).await.is_err());
        assert!(connector.connect(&url()).await.is_err());
        assert!(connector.connect(&url()).await.is_ok());
        assert_eq!(server.handshake_count(), 3);
    }

    #[tokio::test]
    async fn test_abrupt_drop_ends_stream() {
        let (connector, mut server) = channel();
        let mut conn = connector.connect(&url()).await.unwrap();

        server.accept().await.unwrap().drop_abruptly();
        assert_eq!(conn.recv().await.unwrap(), None);
        assert!(!conn.is_open());
    }

    #[tokio::test]
    async fn test_close_with_code() {
        let (connector, mut server) = channel();
        let mut conn = connector.connect(&url()).await.unwrap();
        let mut peer = server.accept().await.unwrap();

        assert!(peer.close(4001, "kicked"));
        assert!(!peer.send_text("late"));
        assert_eq!(
            conn.recv().await.unwrap(),
            Some(TransportEvent::Closed {
                code: 4001,
                reason: "kicked".into()
            })
        );
    }
}
