//! Per-connection client state (§3 "Client", §4.2, §4.9).

use std::collections::HashSet;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::model::{ClientId, ServiceKey};

/// `Open -> Draining -> Closed`, per §4.9. `Draining` is entered once and
/// never left; it exists so late callers (a router dispatch racing a
/// disconnect) can tell a client is on its way out without synchronizing on
/// the disconnect protocol itself.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Open = 0,
    Draining = 1,
    Closed = 2,
}

/// The mutable sets a client's disconnect protocol must walk. Guarded by a
/// single mutex (§5 "Each client's services / spying / subscribes: the
/// client's own mutex; held across disconnect cleanup") so that concurrent
/// inbound messages cannot observe a half-cleaned client.
#[derive(Debug, Default)]
pub(crate) struct ClientSets {
    pub services: HashSet<ServiceKey>,
    pub spying: HashSet<ServiceKey>,
    pub subscribes: HashSet<String>,
}

/// Shared, cloneable handle to a connected client. Registries hold
/// `Arc<Client>`; equality and hashing are by [`ClientId`] so a client can
/// live as a `HashSet` member keyed by identity.
#[derive(Debug)]
pub struct Client {
    id: ClientId,
    name: Mutex<Option<String>>,
    state: AtomicU8,
    pub(crate) sets: Mutex<ClientSets>,
    outbound: mpsc::UnboundedSender<Bytes>,
}

impl Client {
    pub fn new(id: ClientId, outbound: mpsc::UnboundedSender<Bytes>) -> Arc<Self> {
        Arc::new(Self {
            id,
            name: Mutex::new(None),
            state: AtomicU8::new(ClientState::Open as u8),
            sets: Mutex::new(ClientSets::default()),
            outbound,
        })
    }

    pub fn id(&self) -> &ClientId {
        &self.id
    }

    pub fn name(&self) -> Option<String> {
        self.name.lock().clone()
    }

    pub fn set_name(&self, name: String) {
        *self.name.lock() = Some(name);
    }

    /// A human-readable label for logs: the cosmetic name if set, else the
    /// connection id.
    pub fn describe(&self) -> String {
        self.name().unwrap_or_else(|| self.id.as_str().to_owned())
    }

    pub fn state(&self) -> ClientState {
        match self.state.load(Ordering::Acquire) {
            0 => ClientState::Open,
            1 => ClientState::Draining,
            _ => ClientState::Closed,
        }
    }

    pub fn mark_draining(&self) {
        self.state.store(ClientState::Draining as u8, Ordering::Release);
    }

    pub fn mark_closed(&self) {
        self.state.store(ClientState::Closed as u8, Ordering::Release);
    }

    /// Enqueues a fully framed message for this client's writer task.
    /// Forwarding never blocks on socket I/O here; a gone writer task (the
    /// client is mid-disconnect) silently drops the frame.
    pub fn send_frame(&self, frame: Bytes) {
        if self.outbound.send(frame).is_err() {
            tracing::debug!(client = %self.id, "dropped outbound frame: writer task gone");
        }
    }
}

impl PartialEq for Client {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Client {}

impl Hash for Client {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}
