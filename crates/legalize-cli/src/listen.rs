//! Listen loop: connect, subscribe, and log until told to stop.

use anyhow::{bail, Context, Result};
use legalize_core::{ChannelEvent, ChannelManager, MessageKind};
use legalize_protocol::NORMAL_CLOSURE;
use legalize_transport::WebSocketConnector;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use crate::config::{Config, TOKEN_ENV_VAR};

/// Time allowed for the close handshake on shutdown.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Run until Ctrl-C, a normal close by the server, or reconnect exhaustion.
///
/// # Errors
///
/// Returns an error if no token is configured or reconnection gives up.
pub async fn run(config: Config) -> Result<()> {
    let token = config
        .token
        .clone()
        .with_context(|| format!("No session token; set {} or `token`", TOKEN_ENV_VAR))?;

    let manager = ChannelManager::new(config.realtime.clone(), WebSocketConnector::default())
        .with_token(token);

    for kind in MessageKind::KNOWN {
        manager.on(kind, |message| {
            info!(
                kind = %message.kind,
                payload = %message.payload,
                "Received message"
            );
        });
    }

    let mut events = manager.events();
    manager.connect().context("Failed to start connection")?;

    loop {
        let event = tokio::select! {
            event = events.recv() => event,
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, disconnecting");
                manager.disconnect();
                drain_close(&mut events).await;
                return Ok(());
            }
        };

        match event {
            Ok(ChannelEvent::Connected) => {
                for channel in &config.channels {
                    if manager.subscribe(channel) {
                        info!(channel = %channel, "Subscribed");
                    } else {
                        warn!(channel = %channel, "Subscribe not sent");
                    }
                }
            }
            Ok(ChannelEvent::Disconnected { code, reason }) if code == NORMAL_CLOSURE => {
                info!(reason = %reason, "Server closed the channel");
                return Ok(());
            }
            Ok(ChannelEvent::ReconnectExhausted { attempts }) => {
                bail!(
                    "Giving up after {} reconnection attempts: {}",
                    attempts,
                    manager.last_error().unwrap_or_default()
                );
            }
            Ok(event) => debug!(?event, "Channel event"),
            Err(RecvError::Lagged(skipped)) => warn!(skipped, "Dropped channel events"),
            Err(RecvError::Closed) => return Ok(()),
        }
    }
}

/// Wait briefly for the close handshake to finish.
async fn drain_close(events: &mut tokio::sync::broadcast::Receiver<ChannelEvent>) {
    let closed = tokio::time::timeout(SHUTDOWN_GRACE, async {
        loop {
            match events.recv().await {
                Ok(ChannelEvent::Disconnected { .. }) | Err(RecvError::Closed) => return,
                _ => {}
            }
        }
    })
    .await;

    if closed.is_err() {
        warn!("Close handshake timed out");
    }
}
