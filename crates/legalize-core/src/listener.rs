//! Listener registry for inbound message fan-out.
//!
//! Listeners are registered against a [`MessageKind`] and invoked
//! synchronously, in registration order, for every message of that kind.

use dashmap::DashMap;
use legalize_protocol::{InboundMessage, MessageKind};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, trace};

/// A registered callback.
pub type Listener = Arc<dyn Fn(&InboundMessage) + Send + Sync>;

/// Handle returned by [`ListenerRegistry::on`], used to deregister.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener_{}", self.0)
    }
}

/// Mapping from message kind to registered listeners.
pub struct ListenerRegistry {
    listeners: DashMap<MessageKind, Vec<(ListenerId, Listener)>>,
    next_id: AtomicU64,
}

impl ListenerRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            listeners: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register `listener` for messages of `kind`.
    pub fn on<F>(&self, kind: impl Into<MessageKind>, listener: F) -> ListenerId
    where
        F: Fn(&InboundMessage) + Send + Sync + 'static,
    {
        let kind = kind.into();
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        debug!(kind = %kind, listener = %id, "Listener registered");

        self.listeners
            .entry(kind)
            .or_default()
            .push((id, Arc::new(listener)));
        id
    }

    /// Deregister a listener.
    ///
    /// Returns `true` if it was registered for `kind`.
    pub fn off(&self, kind: &MessageKind, id: ListenerId) -> bool {
        let Some(mut entry) = self.listeners.get_mut(kind) else {
            return false;
        };

        let before = entry.len();
        entry.retain(|(listener_id, _)| *listener_id != id);
        let removed = entry.len() != before;

        if entry.is_empty() {
            drop(entry); // Release the lock
            self.listeners.remove_if(kind, |_, list| list.is_empty());
        }
        if removed {
            debug!(kind = %kind, listener = %id, "Listener removed");
        }
        removed
    }

    /// Invoke every listener registered for the message's kind.
    ///
    /// The listener list is copied before invocation, so callbacks may call
    /// `on`/`off`; such changes apply from the next message.
    ///
    /// Returns the number of listeners invoked.
    pub fn dispatch(&self, message: &InboundMessage) -> usize {
        let listeners: Vec<Listener> = match self.listeners.get(&message.kind) {
            Some(entry) => entry.iter().map(|(_, l)| Arc::clone(l)).collect(),
            None => Vec::new(),
        };

        if listeners.is_empty() {
            if message.kind.is_known() {
                debug!(kind = %message.kind, "No listeners for message, dropping");
            } else {
                info!(kind = %message.kind, "Unknown message kind, dropping");
            }
            return 0;
        }

        for listener in &listeners {
            listener(message);
        }

        trace!(kind = %message.kind, listeners = listeners.len(), "Dispatched message");
        listeners.len()
    }

    /// Number of listeners registered for `kind`.
    #[must_use]
    pub fn listener_count(&self, kind: &MessageKind) -> usize {
        self.listeners.get(kind).map(|e| e.len()).unwrap_or(0)
    }
}

impl Default for ListenerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("kinds", &self.listeners.len())
            .finish()
    }
}
