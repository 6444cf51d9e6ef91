//! Listener configuration.
//!
//! Configuration can be loaded from:
//! - Environment variables (LEGALIZE_*)
//! - TOML configuration file

use anyhow::{Context, Result};
use legalize_core::ManagerConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Environment variable supplying the session token.
pub const TOKEN_ENV_VAR: &str = "LEGALIZE_TOKEN";

/// Listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Channel manager settings.
    #[serde(default)]
    pub realtime: ManagerConfig,

    /// Session token.
    #[serde(default = "default_token")]
    pub token: Option<String>,

    /// Channels to subscribe to after every (re)connect.
    #[serde(default)]
    pub channels: Vec<String>,

    /// Metrics configuration.
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Enable the Prometheus exporter.
    #[serde(default)]
    pub enabled: bool,

    /// Metrics port.
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

// Default value functions
fn default_token() -> Option<String> {
    std::env::var(TOKEN_ENV_VAR).ok().filter(|t| !t.is_empty())
}

fn default_metrics_port() -> u16 {
    9091
}

impl Default for Config {
    fn default() -> Self {
        Self {
            realtime: ManagerConfig::default(),
            token: default_token(),
            channels: Vec::new(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: default_metrics_port(),
        }
    }
}

impl Config {
    /// Load configuration from file or defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed.
    pub fn load() -> Result<Self> {
        let config_paths = [
            "legalize.toml",
            "/etc/legalize/legalize.toml",
            "~/.config/legalize/legalize.toml",
        ];

        for path in &config_paths {
            let expanded = shellexpand::tilde(path);
            if Path::new(expanded.as_ref()).exists() {
                return Self::from_file(expanded.as_ref());
            }
        }

        // Fall back to defaults with environment overrides
        Ok(Self::default())
    }

    /// Load configuration from a specific file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let mut config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        // The environment wins over a token written to disk.
        if let Some(token) = default_token() {
            config.token = Some(token);
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.realtime.path, "/ws");
        assert_eq!(config.realtime.reconnect.max_attempts, 5);
        assert!(config.channels.is_empty());
        assert!(!config.metrics.enabled);
    }

    #[test]
    fn test_config_from_toml() {
        let toml_str = r#"
            token = "abc"
            channels = ["case:1", "user:7"]

            [realtime]
            url = "wss://rt.legalize.example"

            [realtime.reconnect]
            max_attempts = 3

            [metrics]
            enabled = true
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.token.as_deref(), Some("abc"));
        assert_eq!(config.channels, vec!["case:1", "user:7"]);
        assert_eq!(config.realtime.url, "wss://rt.legalize.example");
        assert_eq!(config.realtime.reconnect.max_attempts, 3);
        assert_eq!(config.realtime.reconnect.base_delay_ms, 1000);
        assert!(config.metrics.enabled);
        assert_eq!(config.metrics.port, 9091);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let err = Config::from_file("/nonexistent/legalize.toml").unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
