//! WebSocket transport implementation.
//!
//! This module provides a WebSocket client connector using tokio-tungstenite.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use legalize_protocol::codec::MAX_MESSAGE_SIZE;
use tokio::net::TcpStream;
use tokio_tungstenite::{
    connect_async_with_config,
    tungstenite::{
        protocol::{frame::coding::CloseCode, CloseFrame, WebSocketConfig as TungsteniteConfig},
        Error as WsError, Message,
    },
    MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, error, info, warn};
use url::Url;

use crate::traits::{Connection, ConnectionId, Connector, TransportError, TransportEvent};

/// Close code reported when the peer sent a close frame without a status.
pub const NO_STATUS_RECEIVED: u16 = 1005;

/// WebSocket connector configuration.
#[derive(Debug, Clone)]
pub struct WebSocketConfig {
    /// Hard cap on an inbound message in bytes. A larger message aborts the
    /// connection. Messages between the codec limit and this cap are handed
    /// up and rejected by the decoder without dropping the connection.
    pub max_message_size: usize,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            max_message_size: 16 * MAX_MESSAGE_SIZE,
        }
    }
}

impl WebSocketConfig {
    fn to_tungstenite(&self) -> TungsteniteConfig {
        let mut config = TungsteniteConfig::default();
        config.max_message_size = Some(self.max_message_size);
        config.max_frame_size = Some(self.max_message_size);
        config
    }
}

/// Opens WebSocket connections.
#[derive(Debug, Clone, Default)]
pub struct WebSocketConnector {
    config: WebSocketConfig,
}

impl WebSocketConnector {
    /// Create a new WebSocket connector.
    #[must_use]
    pub fn new(config: WebSocketConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self, url: &Url) -> Result<Box<dyn Connection>, TransportError> {
        // The URL carries the session token, so only the origin is logged.
        debug!(host = ?url.host_str(), path = url.path(), "Opening WebSocket");

        let (stream, response) =
            connect_async_with_config(url.as_str(), Some(self.config.to_tungstenite()), false)
                .await
                .map_err(|e| {
                    warn!("WebSocket handshake failed: {}", e);
                    TransportError::ConnectFailed(e.to_string())
                })?;

        let conn = WebSocketConnection::new(stream);
        info!(
            connection = %conn.id,
            status = response.status().as_u16(),
            "WebSocket handshake completed"
        );

        Ok(Box::new(conn))
    }

    fn name(&self) -> &'static str {
        "websocket"
    }
}

/// A client WebSocket connection.
pub struct WebSocketConnection {
    id: ConnectionId,
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    is_open: bool,
}

impl WebSocketConnection {
    fn new(stream: WebSocketStream<MaybeTlsStream<TcpStream>>) -> Self {
        Self {
            id: ConnectionId::generate(),
            stream,
            is_open: true,
        }
    }
}

#[async_trait]
impl Connection for WebSocketConnection {
    fn id(&self) -> &ConnectionId {
        &self.id
    }

    async fn recv(&mut self) -> Result<Option<TransportEvent>, TransportError> {
        loop {
            match self.stream.next().await {
                // Size limits of the wire format are the decoder's concern.
                Some(Ok(Message::Text(text))) => {
                    return Ok(Some(TransportEvent::Message(text.into_bytes())));
                }
                Some(Ok(Message::Binary(data))) => {
                    return Ok(Some(TransportEvent::Message(data)));
                }
                Some(Ok(Message::Ping(data))) => {
                    if let Err(e) = self.stream.send(Message::Pong(data)).await {
                        warn!("Failed to send pong: {}", e);
                    }
                }
                Some(Ok(Message::Pong(_))) => {
                    // Ignore pong messages
                }
                Some(Ok(Message::Close(frame))) => {
                    debug!(connection = %self.id, "Received close frame");
                    self.is_open = false;
                    let (code, reason) = match frame {
                        Some(frame) => (u16::from(frame.code), frame.reason.into_owned()),
                        None => (NO_STATUS_RECEIVED, String::new()),
                    };
                    return Ok(Some(TransportEvent::Closed { code, reason }));
                }
                Some(Ok(Message::Frame(_))) => {
                    // Raw frame, ignore
                }
                Some(Err(WsError::ConnectionClosed)) | None => {
                    debug!(connection = %self.id, "WebSocket stream ended");
                    self.is_open = false;
                    return Ok(None);
                }
                Some(Err(e)) => {
                    error!(connection = %self.id, "WebSocket error: {}", e);
                    self.is_open = false;
                    return Err(TransportError::ReceiveFailed(e.to_string()));
                }
            }
        }
    }

    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        if !self.is_open {
            return Err(TransportError::ConnectionClosed);
        }

        self.stream
            .send(Message::Text(text))
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    async fn close(&mut self, code: u16, reason: &str) -> Result<(), TransportError> {
        if !self.is_open {
            return Ok(()); // Already closed
        }
        self.is_open = false;

        let frame = CloseFrame {
            code: CloseCode::from(code),
            reason: reason.into(),
        };
        match self.stream.close(Some(frame)).await {
            Ok(()) | Err(WsError::ConnectionClosed) => Ok(()),
            Err(e) => Err(TransportError::SendFailed(format!("Failed to close: {}", e))),
        }
    }

    fn is_open(&self) -> bool {
        self.is_open
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_websocket_config_default() {
        let config = WebSocketConfig::default();
        assert!(config.max_message_size > MAX_MESSAGE_SIZE);

        let tungstenite = config.to_tungstenite();
        assert_eq!(tungstenite.max_message_size, Some(config.max_message_size));
        assert_eq!(tungstenite.max_frame_size, Some(config.max_message_size));
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let connector = WebSocketConnector::default();
        let url = Url::parse(&format!("ws://{}/ws", addr)).unwrap();
        let result = connector.connect(&url).await;
        assert!(matches!(result, Err(TransportError::ConnectFailed(_))));
    }
}
