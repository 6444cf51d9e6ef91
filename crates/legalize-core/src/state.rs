//! Connection lifecycle state and the observable status snapshot.

use serde::Serialize;
use std::fmt;
use std::time::Duration;

/// Lifecycle state of the managed connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// No connection attempted yet.
    #[default]
    Idle,
    /// Handshake in progress.
    Connecting,
    /// Handshake completed; frames flow both ways.
    Open,
    /// A requested close is in progress.
    Closing,
    /// The last connection is gone.
    Closed,
}

impl ConnectionState {
    /// Only an open connection counts as connected.
    #[must_use]
    pub fn is_connected(self) -> bool {
        self == ConnectionState::Open
    }

    /// Check whether a connection is live or being established.
    #[must_use]
    pub fn is_active(self) -> bool {
        matches!(self, ConnectionState::Connecting | ConnectionState::Open)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Idle => "idle",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Open => "open",
            ConnectionState::Closing => "closing",
            ConnectionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Snapshot of a channel manager, published on every state change.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChannelStatus {
    /// Current lifecycle state.
    pub state: ConnectionState,
    /// `true` exactly when `state` is `Open`.
    pub connected: bool,
    /// Last connection-level error, cleared on a successful open.
    pub last_error: Option<String>,
    /// Reconnection attempts since the last successful open.
    pub attempts: u32,
    /// Automatic reconnection gave up.
    pub exhausted: bool,
}

/// Lifecycle events broadcast by a channel manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// A handshake started. `attempt` is 0 for the first try.
    Connecting {
        /// Reconnection attempt number.
        attempt: u32,
    },
    /// The connection is open.
    Connected,
    /// The connection closed.
    Disconnected {
        /// Close code.
        code: u16,
        /// Close reason or error text.
        reason: String,
    },
    /// A reconnection timer was armed.
    ReconnectScheduled {
        /// Attempt number the timer will start.
        attempt: u32,
        /// Time until it fires.
        delay: Duration,
    },
    /// Automatic reconnection gave up.
    ReconnectExhausted {
        /// Attempts made.
        attempts: u32,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_open_is_connected() {
        assert!(ConnectionState::Open.is_connected());
        for state in [
            ConnectionState::Idle,
            ConnectionState::Connecting,
            ConnectionState::Closing,
            ConnectionState::Closed,
        ] {
            assert!(!state.is_connected());
        }
    }

    #[test]
    fn test_state_display() {
        assert_eq!(ConnectionState::Connecting.to_string(), "connecting");
        assert_eq!(ChannelStatus::default().state, ConnectionState::Idle);
    }
}
