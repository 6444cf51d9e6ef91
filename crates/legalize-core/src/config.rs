//! Channel manager configuration.
//!
//! The endpoint defaults to the `LEGALIZE_WS_URL` environment variable,
//! falling back to a local development server.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::ChannelError;
use crate::reconnect::ReconnectPolicy;

/// Environment variable supplying the base endpoint URL.
pub const URL_ENV_VAR: &str = "LEGALIZE_WS_URL";

/// Endpoint used when nothing is configured.
pub const DEFAULT_URL: &str = "ws://localhost:8000";

/// Channel manager configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagerConfig {
    /// Base endpoint URL (`ws://` or `wss://`).
    #[serde(default = "default_url")]
    pub url: String,

    /// Path appended to the base URL.
    #[serde(default = "default_path")]
    pub path: String,

    /// Query parameter carrying the session token.
    #[serde(default = "default_token_param")]
    pub token_param: String,

    /// Reconnection policy.
    #[serde(default)]
    pub reconnect: ReconnectPolicy,

    /// Capacity of the lifecycle event broadcast.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

// Default value functions
fn default_url() -> String {
    std::env::var(URL_ENV_VAR).unwrap_or_else(|_| DEFAULT_URL.to_string())
}

fn default_path() -> String {
    "/ws".to_string()
}

fn default_token_param() -> String {
    "token".to_string()
}

fn default_event_capacity() -> usize {
    64
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            path: default_path(),
            token_param: default_token_param(),
            reconnect: ReconnectPolicy::default(),
            event_capacity: default_event_capacity(),
        }
    }
}

impl ManagerConfig {
    /// Create a configuration for a specific base URL.
    #[must_use]
    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Set the reconnection policy.
    #[must_use]
    pub fn reconnect(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = policy;
        self
    }

    /// Build the handshake URL: `{url}{path}?{token_param}={token}`.
    ///
    /// # Errors
    ///
    /// Returns an error if the result does not parse or is not `ws`/`wss`.
    pub fn endpoint_url(&self, token: &str) -> Result<Url, ChannelError> {
        let base = self.url.trim_end_matches('/');
        let mut url = Url::parse(&format!("{}{}", base, self.path))?;

        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(ChannelError::InvalidUrl(format!(
                "unsupported scheme `{}`",
                url.scheme()
            )));
        }

        url.query_pairs_mut().append_pair(&self.token_param, token);
        Ok(url)
    }
}
