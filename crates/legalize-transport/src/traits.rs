//! Transport abstraction traits for the Legalize client.
//!
//! These traits define what the channel manager needs from a transport,
//! allowing it to run over WebSocket or an in-memory pair in tests.

use async_trait::async_trait;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use url::Url;

/// Monotonic counter so ids stay unique within a process.
static ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Unique identifier for a connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub String);

impl ConnectionId {
    /// Generate a fresh connection ID.
    #[must_use]
    pub fn generate() -> Self {
        let seq = ID_COUNTER.fetch_add(1, Ordering::Relaxed);
        Self(format!("conn_{:x}", seq))
    }

    /// Get the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The handshake could not be completed.
    #[error("Connect failed: {0}")]
    ConnectFailed(String),

    /// Connection was closed.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Failed to send data.
    #[error("Send failed: {0}")]
    SendFailed(String),

    /// Failed to receive data.
    #[error("Receive failed: {0}")]
    ReceiveFailed(String),
}

/// Something received from the remote end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A data frame (text or binary).
    Message(Vec<u8>),
    /// The peer sent a close frame.
    Closed {
        /// Close code.
        code: u16,
        /// Close reason.
        reason: String,
    },
}

/// Opens connections to a realtime endpoint.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Perform the handshake with `url`.
    async fn connect(&self, url: &Url) -> Result<Box<dyn Connection>, TransportError>;

    /// Get the transport name (e.g., "websocket", "memory").
    fn name(&self) -> &'static str;
}

/// An open client connection.
#[async_trait]
pub trait Connection: Send {
    /// Get the connection's unique identifier.
    fn id(&self) -> &ConnectionId;

    /// Receive the next event.
    ///
    /// Returns `None` if the stream ended without a close frame.
    async fn recv(&mut self) -> Result<Option<TransportEvent>, TransportError>;

    /// Send a text frame.
    async fn send_text(&mut self, text: String) -> Result<(), TransportError>;

    /// Close the connection with the given code.
    async fn close(&mut self, code: u16, reason: &str) -> Result<(), TransportError>;

    /// Check if the connection is still open.
    fn is_open(&self) -> bool;
}
