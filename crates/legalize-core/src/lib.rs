//! # legalize-core
//!
//! Realtime channel for the Legalize client.
//!
//! This crate provides:
//!
//! - **ChannelManager** - Owns one authenticated connection and reconnects with backoff
//! - **ListenerRegistry** - Fans inbound messages out by kind
//! - **ReconnectPolicy** - Exponential backoff with an attempt ceiling
//! - **ChannelStatus** - Observable connection status
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────────┐     ┌──────────────────┐
//! │  Connector  │────▶│ ChannelManager  │────▶│ ListenerRegistry │
//! └─────────────┘     └─────────────────┘     └──────────────────┘
//!                         │         │
//!                         ▼         ▼
//!               ┌───────────────┐ ┌───────────────┐
//!               │ ReconnectState│ │ ChannelStatus │
//!               └───────────────┘ └───────────────┘
//! ```

pub mod config;
pub mod error;
pub mod listener;
pub mod manager;
pub mod metrics;
pub mod reconnect;
pub mod state;

pub use config::ManagerConfig;
pub use error::ChannelError;
pub use listener::{Listener, ListenerId, ListenerRegistry};
pub use manager::{ChannelManager, WeakChannelManager};
pub use reconnect::{ReconnectPolicy, ReconnectState};
pub use state::{ChannelEvent, ChannelStatus, ConnectionState};

pub use legalize_protocol::{InboundMessage, MessageKind, OutboundMessage};
