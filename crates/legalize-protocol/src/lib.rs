//! # legalize-protocol
//!
//! Wire protocol definitions for the Legalize realtime channel.
//!
//! This crate defines the JSON envelope exchanged between the Legalize
//! backend and its clients, the known message kinds and the codec.
//!
//! ## Message Types
//!
//! - Inbound - `{ "kind": ..., "payload": ... }` pushed by the server
//! - `Subscribe` / `Unsubscribe` - Logical channel membership
//! - `Custom` - Free-form application messages
//!
//! ## Example
//!
//! ```rust
//! use legalize_protocol::{codec, MessageKind, OutboundMessage};
//!
//! let text = codec::encode(&OutboundMessage::subscribe("case:42")).unwrap();
//! assert!(text.contains("\"subscribe\""));
//!
//! let msg = codec::decode(br#"{"kind":"notification","payload":{"id":1}}"#).unwrap();
//! assert_eq!(msg.kind, MessageKind::Notification);
//! ```

pub mod codec;
pub mod frames;

pub use codec::{decode, encode, ProtocolError};
pub use frames::{InboundMessage, MessageKind, OutboundMessage, ABNORMAL_CLOSURE, NORMAL_CLOSURE};
