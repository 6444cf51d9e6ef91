//! # legalize-transport
//!
//! Client transport abstraction layer for the Legalize realtime channel.
//!
//! This crate provides a unified interface over the transports the channel
//! manager can run on:
//!
//! - **WebSocket** - The production transport
//! - **Memory** - An in-process pair driven by a scripted server
//!
//! ## Transport Abstraction
//!
//! All transports implement the `Connector` and `Connection` traits,
//! allowing the channel manager to be transport-agnostic.
//!
//! ```rust,ignore
//! use legalize_transport::{Connector, TransportEvent};
//!
//! async fn listen(connector: &dyn Connector, url: &url::Url) {
//!     let mut conn = connector.connect(url).await.unwrap();
//!     while let Ok(Some(TransportEvent::Message(data))) = conn.recv().await {
//!         // Decode and dispatch
//!     }
//! }
//! ```

pub mod memory;
pub mod traits;

#[cfg(feature = "websocket")]
pub mod websocket;

pub use traits::{Connection, ConnectionId, Connector, TransportError, TransportEvent};

#[cfg(feature = "websocket")]
pub use websocket::{WebSocketConfig, WebSocketConnector};
