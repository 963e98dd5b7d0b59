//! Client registry and event fan-out
//!
//! Tracks the send capability of every connected client and broadcasts
//! events to all of them. Registration and removal happen from per-client
//! threads while the link supervisor broadcasts concurrently, so the set
//! lives behind a mutex.

use crate::events::ClientEvent;
use crossbeam_channel::{Sender, TrySendError};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Send capability for one client's outbound event queue
pub type ClientSender = Sender<ClientEvent>;

/// Opaque client identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientId(u64);

/// Shared registry of connected clients
#[derive(Clone, Default)]
pub struct ClientRegistry {
    clients: Arc<Mutex<HashMap<u64, ClientSender>>>,
    next_id: Arc<AtomicU64>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a client, returning its id for later removal
    pub fn register(&self, sender: ClientSender) -> ClientId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.clients.lock().insert(id, sender);
        log::debug!("Client {} registered ({} connected)", id, self.len());
        ClientId(id)
    }

    /// Remove a client; removing an already-removed client is a no-op
    pub fn unregister(&self, id: ClientId) {
        let removed = self.clients.lock().remove(&id.0).is_some();
        if removed {
            log::debug!("Client {} unregistered ({} connected)", id.0, self.len());
        }
    }

    /// Number of connected clients
    pub fn len(&self) -> usize {
        self.clients.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.lock().is_empty()
    }

    /// Deliver an event to every registered client
    ///
    /// Delivery is per-recipient best-effort: a client with a closed or
    /// full queue never blocks delivery to the others, and no failure
    /// escapes this call. Clients whose queue is closed are dropped from
    /// the registry.
    pub fn broadcast(&self, event: &ClientEvent) {
        let mut clients = self.clients.lock();
        if clients.is_empty() {
            return;
        }
        clients.retain(|id, sender| match sender.try_send(event.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                // Slow client: drop this event for them, keep the handle
                log::debug!("Client {} queue full, dropping event", id);
                true
            }
            Err(TrySendError::Disconnected(_)) => {
                log::debug!("Client {} send channel closed, removing", id);
                false
            }
        });
    }
}
