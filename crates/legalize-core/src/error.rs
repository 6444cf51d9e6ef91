//! Channel manager errors.
//!
//! Network failures never surface here; they become status changes. These
//! errors report misuse of [`crate::ChannelManager::connect`].

use thiserror::Error;

/// Channel manager errors.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// No session token has been set.
    #[error("No session token available")]
    MissingToken,

    /// The configured endpoint is not a usable WebSocket URL.
    #[error("Invalid endpoint URL: {0}")]
    InvalidUrl(String),
}

impl From<url::ParseError> for ChannelError {
    fn from(e: url::ParseError) -> Self {
        ChannelError::InvalidUrl(e.to_string())
    }
}
