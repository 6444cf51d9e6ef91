//! Realtime channel manager.
//!
//! The manager owns at most one live connection to the realtime endpoint,
//! reconnects after unexpected drops using the configured
//! [`ReconnectPolicy`](crate::ReconnectPolicy), and fans inbound messages out
//! to listeners registered by kind.
//!
//! ## Lifecycle
//!
//! ```text
//!  Idle ──connect()──▶ Connecting ──handshake──▶ Open ──disconnect()──▶ Closing ──▶ Closed
//!                          ▲                       │
//!                          │                       │ drop / error / close != 1000
//!                          └──── backoff timer ◀───┘
//! ```
//!
//! Each connection attempt gets a new epoch. The connection task reports
//! back with its epoch and reports from superseded attempts are ignored, so
//! at most one connection is ever considered live.

use legalize_protocol::{codec, OutboundMessage, ABNORMAL_CLOSURE, NORMAL_CLOSURE};
use legalize_protocol::{InboundMessage, MessageKind};
use legalize_transport::{Connection, Connector, TransportEvent};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::fmt;
use std::sync::{Arc, Weak};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::config::ManagerConfig;
use crate::error::ChannelError;
use crate::listener::{ListenerId, ListenerRegistry};
use crate::metrics;
use crate::reconnect::ReconnectState;
use crate::state::{ChannelEvent, ChannelStatus, ConnectionState};

/// Close reason sent by [`ChannelManager::disconnect`].
pub const USER_CLOSE_REASON: &str = "User disconnected";

/// Instructions for the connection task.
#[derive(Debug)]
enum Command {
    Send(String),
    Close { code: u16, reason: String },
}

/// How a connection ended.
#[derive(Debug)]
struct Closure {
    code: u16,
    reason: String,
    error: Option<String>,
}

impl Closure {
    fn peer(code: u16, reason: String) -> Self {
        Self {
            code,
            reason,
            error: None,
        }
    }

    fn failed(error: String) -> Self {
        Self {
            code: ABNORMAL_CLOSURE,
            reason: error.clone(),
            error: Some(error),
        }
    }

    fn ended() -> Self {
        Self::peer(ABNORMAL_CLOSURE, "stream ended without close frame".into())
    }

    fn is_normal(&self) -> bool {
        self.code == NORMAL_CLOSURE && self.error.is_none()
    }
}

/// Mutable manager state. Guarded by one lock, never held across `.await`.
struct Inner {
    state: ConnectionState,
    epoch: u64,
    outbound: Option<mpsc::UnboundedSender<Command>>,
    reconnect: ReconnectState,
    timer: Option<JoinHandle<()>>,
    last_error: Option<String>,
    exhausted: bool,
}

struct Shared {
    config: ManagerConfig,
    connector: Arc<dyn Connector>,
    token: RwLock<Option<String>>,
    inner: Mutex<Inner>,
    listeners: ListenerRegistry,
    status_tx: watch::Sender<ChannelStatus>,
    events_tx: broadcast::Sender<ChannelEvent>,
}

/// Handle to a realtime channel.
///
/// Cloning yields another handle to the same channel. When the last handle
/// is dropped the pending reconnect timer is cancelled and the connection is
/// closed normally.
#[derive(Clone)]
pub struct ChannelManager {
    shared: Arc<Shared>,
}

impl ChannelManager {
    /// Create a manager that connects through `connector`.
    #[must_use]
    pub fn new(config: ManagerConfig, connector: impl Connector + 'static) -> Self {
        Self::with_connector(config, Arc::new(connector))
    }

    /// Create a manager sharing an existing connector.
    #[must_use]
    pub fn with_connector(config: ManagerConfig, connector: Arc<dyn Connector>) -> Self {
        info!(
            transport = connector.name(),
            max_attempts = config.reconnect.max_attempts,
            base_delay_ms = config.reconnect.base_delay_ms,
            "Creating channel manager"
        );

        let (status_tx, _) = watch::channel(ChannelStatus::default());
        let (events_tx, _) = broadcast::channel(config.event_capacity.max(1));

        Self {
            shared: Arc::new(Shared {
                config,
                connector,
                token: RwLock::new(None),
                inner: Mutex::new(Inner {
                    state: ConnectionState::Idle,
                    epoch: 0,
                    outbound: None,
                    reconnect: ReconnectState::new(),
                    timer: None,
                    last_error: None,
                    exhausted: false,
                }),
                listeners: ListenerRegistry::new(),
                status_tx,
                events_tx,
            }),
        }
    }

    /// Set the session token, builder style.
    #[must_use]
    pub fn with_token(self, token: impl Into<String>) -> Self {
        self.set_token(Some(token.into()));
        self
    }

    /// Replace the session token.
    ///
    /// The token is read on every connection attempt, so the next reconnect
    /// uses the new value.
    pub fn set_token(&self, token: Option<String>) {
        *self.shared.token.write() = token;
    }

    /// Get a handle that does not keep the channel alive.
    #[must_use]
    pub fn downgrade(&self) -> WeakChannelManager {
        WeakChannelManager {
            shared: Arc::downgrade(&self.shared),
        }
    }

    /// Get the configuration.
    #[must_use]
    pub fn config(&self) -> &ManagerConfig {
        &self.shared.config
    }

    /// Start connecting.
    ///
    /// Returns immediately; the outcome is reported through
    /// [`status`](Self::status) and [`events`](Self::events). Does nothing
    /// while a connection is open or being established. Otherwise cancels a
    /// pending reconnect and restarts the backoff sequence from zero.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if no token is set or the endpoint URL is invalid.
    pub fn connect(&self) -> Result<(), ChannelError> {
        let mut inner = self.shared.inner.lock();

        if inner.state.is_active() {
            debug!(state = %inner.state, "Connect ignored, connection already active");
            return Ok(());
        }

        if let Some(timer) = inner.timer.take() {
            timer.abort();
        }
        inner.reconnect.reset();
        inner.exhausted = false;

        self.shared.start_connection(&mut inner)
    }

    /// Close the connection and cancel any pending reconnect.
    ///
    /// Never triggers a reconnection. Safe to call in any state.
    pub fn disconnect(&self) {
        let mut inner = self.shared.inner.lock();

        if let Some(timer) = inner.timer.take() {
            timer.abort();
            // A timer that already woke up must not reconnect.
            inner.epoch += 1;
            debug!("Cancelled pending reconnect");
        }

        if let Some(outbound) = inner.outbound.take() {
            if inner.state.is_active() {
                info!("Disconnecting");
                let _ = outbound.send(Command::Close {
                    code: NORMAL_CLOSURE,
                    reason: USER_CLOSE_REASON.to_string(),
                });
                if inner.state == ConnectionState::Open {
                    metrics::record_closed();
                }
                inner.state = ConnectionState::Closing;
            }
        }

        self.shared.publish_status(&inner);
    }

    /// Send an application message `{"type": message_type, ...fields}`.
    ///
    /// `fields` must serialize to a JSON object (or unit/`None`). Returns
    /// `false` without transmitting unless the connection is open.
    pub fn send_message<T: Serialize>(&self, message_type: &str, fields: T) -> bool {
        match serde_json::to_value(fields) {
            Ok(fields) => self.send(OutboundMessage::custom(message_type, fields)),
            Err(e) => {
                warn!(message_type, error = %e, "Failed to serialize message fields");
                metrics::record_send(false);
                false
            }
        }
    }

    /// Send an outbound message.
    ///
    /// Delivery is at most once: returns `false` if the connection is not
    /// open or the message cannot be encoded. Nothing is queued.
    pub fn send(&self, message: OutboundMessage) -> bool {
        let sent = match codec::encode(&message) {
            Ok(text) => self.shared.transmit(text),
            Err(e) => {
                warn!(message_type = message.message_type(), error = %e, "Failed to encode message");
                false
            }
        };

        if !sent {
            debug!(
                message_type = message.message_type(),
                "Message not sent, channel not open"
            );
        }
        metrics::record_send(sent);
        sent
    }

    /// Ask the server to subscribe this client to `channel`.
    ///
    /// The name is sent as given; the server decides what it accepts.
    pub fn subscribe(&self, channel: &str) -> bool {
        self.send(OutboundMessage::subscribe(channel))
    }

    /// Ask the server to unsubscribe this client from `channel`.
    pub fn unsubscribe(&self, channel: &str) -> bool {
        self.send(OutboundMessage::unsubscribe(channel))
    }

    /// Register a listener for inbound messages of `kind`.
    ///
    /// The registry lives as long as the channel, so a listener that captures
    /// a `ChannelManager` keeps the channel alive and dropping every other
    /// handle no longer closes the connection. Listeners that need to send
    /// should capture a [`WeakChannelManager`] from
    /// [`downgrade`](Self::downgrade) instead.
    pub fn on<F>(&self, kind: impl Into<MessageKind>, listener: F) -> ListenerId
    where
        F: Fn(&InboundMessage) + Send + Sync + 'static,
    {
        self.shared.listeners.on(kind, listener)
    }

    /// Deregister a listener.
    pub fn off(&self, kind: &MessageKind, id: ListenerId) -> bool {
        self.shared.listeners.off(kind, id)
    }

    /// Get a snapshot of the current status.
    #[must_use]
    pub fn status(&self) -> ChannelStatus {
        self.shared.status_tx.borrow().clone()
    }

    /// Watch status changes.
    #[must_use]
    pub fn watch_status(&self) -> watch::Receiver<ChannelStatus> {
        self.shared.status_tx.subscribe()
    }

    /// Subscribe to lifecycle events.
    #[must_use]
    pub fn events(&self) -> broadcast::Receiver<ChannelEvent> {
        self.shared.events_tx.subscribe()
    }

    /// Get the current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.shared.inner.lock().state
    }

    /// Check if the connection is open.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    /// Get the last connection-level error.
    #[must_use]
    pub fn last_error(&self) -> Option<String> {
        self.shared.inner.lock().last_error.clone()
    }
}

/// Non-owning handle to a channel, for listeners that send.
#[derive(Clone)]
pub struct WeakChannelManager {
    shared: Weak<Shared>,
}

impl WeakChannelManager {
    /// Get a full handle, or `None` once every `ChannelManager` is gone.
    #[must_use]
    pub fn upgrade(&self) -> Option<ChannelManager> {
        self.shared.upgrade().map(|shared| ChannelManager { shared })
    }
}

impl fmt::Debug for WeakChannelManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakChannelManager")
            .field("alive", &(self.shared.strong_count() > 0))
            .finish()
    }
}

impl fmt::Debug for ChannelManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelManager")
            .field("transport", &self.shared.connector.name())
            .field("status", &self.status())
            .finish()
    }
}

impl Shared {
    /// Spawn a connection task for a new epoch.
    fn start_connection(self: &Arc<Self>, inner: &mut Inner) -> Result<(), ChannelError> {
        let token = self.token.read().clone().ok_or(ChannelError::MissingToken)?;
        let url = self.config.endpoint_url(&token)?;

        inner.epoch += 1;
        let epoch = inner.epoch;
        let (outbound, commands) = mpsc::unbounded_channel();
        inner.outbound = Some(outbound);
        inner.state = ConnectionState::Connecting;

        let attempt = inner.reconnect.attempts();
        info!(
            attempt,
            epoch,
            transport = self.connector.name(),
            host = ?url.host_str(),
            "Connecting"
        );
        self.emit(ChannelEvent::Connecting { attempt });
        self.publish_status(inner);

        tokio::spawn(run_connection(
            Arc::downgrade(self),
            Arc::clone(&self.connector),
            url,
            epoch,
            commands,
        ));
        Ok(())
    }

    /// Mark the handshake of `epoch` complete.
    ///
    /// Returns `false` if the attempt was superseded or a disconnect was
    /// requested meanwhile; the caller must then close the connection.
    fn handle_open(&self, epoch: u64) -> bool {
        let mut inner = self.inner.lock();
        if inner.epoch != epoch || inner.state != ConnectionState::Connecting {
            return false;
        }

        inner.state = ConnectionState::Open;
        inner.reconnect.reset();
        inner.last_error = None;
        inner.exhausted = false;

        info!(epoch, "Connected");
        metrics::record_open();
        self.emit(ChannelEvent::Connected);
        self.publish_status(&inner);
        true
    }

    /// Record the end of the connection of `epoch` and apply the reconnect policy.
    fn handle_closed(self: &Arc<Self>, epoch: u64, closure: Closure) {
        let mut inner = self.inner.lock();
        if inner.epoch != epoch {
            debug!(epoch, "Ignoring close of superseded connection");
            return;
        }

        if inner.state == ConnectionState::Open {
            metrics::record_closed();
        }
        let requested = inner.state == ConnectionState::Closing;
        inner.outbound = None;
        inner.state = ConnectionState::Closed;

        self.emit(ChannelEvent::Disconnected {
            code: closure.code,
            reason: closure.reason.clone(),
        });

        if requested || closure.is_normal() {
            info!(code = closure.code, reason = %closure.reason, "Disconnected");
            self.publish_status(&inner);
            return;
        }

        warn!(code = closure.code, reason = %closure.reason, "Connection lost");
        inner.last_error = Some(closure.error.unwrap_or_else(|| {
            format!("Connection lost ({}): {}", closure.code, closure.reason)
        }));

        self.schedule_reconnect(&mut inner);
        self.publish_status(&inner);
    }

    /// Arm the reconnect timer, or give up once the ceiling is reached.
    fn schedule_reconnect(self: &Arc<Self>, inner: &mut Inner) {
        let policy = &self.config.reconnect;

        let Some(delay) = inner.reconnect.next_delay(policy) else {
            let attempts = inner.reconnect.attempts();
            inner.exhausted = true;
            inner.last_error = Some(format!(
                "Reconnection failed after {} attempts",
                attempts
            ));
            error!(attempts, "Giving up reconnecting");
            metrics::record_exhausted();
            self.emit(ChannelEvent::ReconnectExhausted { attempts });
            return;
        };

        let attempt = inner.reconnect.attempts() + 1;
        info!(
            attempt,
            delay_ms = delay.as_millis() as u64,
            "Attempting to reconnect in {}ms",
            delay.as_millis()
        );
        metrics::record_reconnect_scheduled();
        self.emit(ChannelEvent::ReconnectScheduled { attempt, delay });

        let shared = Arc::downgrade(self);
        let epoch = inner.epoch;
        let timer = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(shared) = shared.upgrade() {
                shared.fire_reconnect(epoch);
            }
        });

        if let Some(previous) = inner.timer.replace(timer) {
            previous.abort();
        }
    }

    /// Reconnect timer callback.
    fn fire_reconnect(self: &Arc<Self>, epoch: u64) {
        let mut inner = self.inner.lock();
        if inner.epoch != epoch || inner.state.is_active() {
            return;
        }
        inner.timer = None;
        inner.reconnect.advance();

        if let Err(e) = self.start_connection(&mut inner) {
            warn!(error = %e, "Reconnect aborted");
            inner.last_error = Some(e.to_string());
            self.publish_status(&inner);
        }
    }

    /// Decode a frame from the connection of `epoch` and fan it out.
    fn handle_frame(&self, epoch: u64, data: &[u8]) {
        {
            let inner = self.inner.lock();
            if inner.epoch != epoch || inner.state != ConnectionState::Open {
                return;
            }
        }

        match codec::decode(data) {
            Ok(message) => {
                metrics::record_message(message.kind.as_str());
                self.listeners.dispatch(&message);
            }
            Err(e) => {
                warn!(error = %e, bytes = data.len(), "Failed to parse message, dropping");
                metrics::record_decode_error();
            }
        }
    }

    /// Queue an encoded frame on the open connection.
    fn transmit(&self, text: String) -> bool {
        let inner = self.inner.lock();
        if inner.state != ConnectionState::Open {
            return false;
        }
        inner
            .outbound
            .as_ref()
            .is_some_and(|outbound| outbound.send(Command::Send(text)).is_ok())
    }

    fn emit(&self, event: ChannelEvent) {
        // No receivers is fine.
        let _ = self.events_tx.send(event);
    }

    fn publish_status(&self, inner: &Inner) {
        self.status_tx.send_replace(ChannelStatus {
            state: inner.state,
            connected: inner.state.is_connected(),
            last_error: inner.last_error.clone(),
            attempts: inner.reconnect.attempts(),
            exhausted: inner.exhausted,
        });
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        let inner = self.inner.get_mut();
        if let Some(timer) = inner.timer.take() {
            timer.abort();
        }
        if let Some(outbound) = inner.outbound.take() {
            let _ = outbound.send(Command::Close {
                code: NORMAL_CLOSURE,
                reason: "Client dropped".to_string(),
            });
        }
    }
}

/// Drive one connection attempt from handshake to close.
///
/// Holds only a weak reference to the manager so dropping every handle
/// ends the task.
async fn run_connection(
    shared: Weak<Shared>,
    connector: Arc<dyn Connector>,
    url: Url,
    epoch: u64,
    mut commands: mpsc::UnboundedReceiver<Command>,
) {
    let mut conn = match connector.connect(&url).await {
        Ok(conn) => conn,
        Err(e) => {
            warn!(epoch, error = %e, "Failed to connect");
            if let Some(shared) = shared.upgrade() {
                shared.handle_closed(epoch, Closure::failed(e.to_string()));
            }
            return;
        }
    };

    let live = shared
        .upgrade()
        .is_some_and(|shared| shared.handle_open(epoch));
    if !live {
        debug!(epoch, connection = %conn.id(), "Connection no longer wanted, closing");
        close_quietly(conn.as_mut(), NORMAL_CLOSURE, USER_CLOSE_REASON).await;
        if let Some(shared) = shared.upgrade() {
            shared.handle_closed(epoch, Closure::peer(NORMAL_CLOSURE, USER_CLOSE_REASON.into()));
        }
        return;
    }

    let closure = loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(Command::Send(text)) => {
                    if let Err(e) = conn.send_text(text).await {
                        break Closure::failed(e.to_string());
                    }
                }
                Some(Command::Close { code, reason }) => {
                    close_quietly(conn.as_mut(), code, &reason).await;
                    break Closure::peer(code, reason);
                }
                None => {
                    close_quietly(conn.as_mut(), NORMAL_CLOSURE, "Client dropped").await;
                    return;
                }
            },
            event = conn.recv() => match event {
                Ok(Some(TransportEvent::Message(data))) => {
                    let Some(shared) = shared.upgrade() else {
                        close_quietly(conn.as_mut(), NORMAL_CLOSURE, "Client dropped").await;
                        return;
                    };
                    shared.handle_frame(epoch, &data);
                }
                Ok(Some(TransportEvent::Closed { code, reason })) => {
                    break Closure::peer(code, reason);
                }
                Ok(None) => break Closure::ended(),
                Err(e) => break Closure::failed(e.to_string()),
            },
        }
    };

    debug!(epoch, connection = %conn.id(), code = closure.code, "Connection task finished");
    if let Some(shared) = shared.upgrade() {
        shared.handle_closed(epoch, closure);
    }
}

async fn close_quietly(conn: &mut dyn Connection, code: u16, reason: &str) {
    if let Err(e) = conn.close(code, reason).await {
        debug!(connection = %conn.id(), error = %e, "Close failed");
    }
}
