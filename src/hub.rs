use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot};

use crate::sync::SyncEvent;

pub type ClientId = u64;

/// Something the sync engine wants a connected front-end to handle.
#[derive(Debug)]
pub enum Outbound {
    Event(SyncEvent),
    /// Ask the front-end for its access token. Exactly one reply is expected on the channel.
    TokenRequest(oneshot::Sender<Option<String>>),
}

/// Registry of currently connected front-ends.
pub struct ClientHub {
    next_id: AtomicU64,
    clients: DashMap<ClientId, mpsc::UnboundedSender<Outbound>>,
}

impl ClientHub {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            clients: DashMap::new(),
        }
    }

    /// Register a front-end. The receiver yields everything addressed to it.
    pub fn connect(&self) -> (ClientId, mpsc::UnboundedReceiver<Outbound>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        self.clients.insert(id, tx);
        tracing::debug!("Front-end {id} connected ({} total)", self.clients.len());
        (id, rx)
    }

    pub fn disconnect(&self, id: ClientId) {
        if self.clients.remove(&id).is_some() {
            tracing::debug!("Front-end {id} disconnected ({} left)", self.clients.len());
        }
    }

    /// Connected front-ends, oldest connection first.
    pub fn clients(&self) -> Vec<(ClientId, mpsc::UnboundedSender<Outbound>)> {
        let mut clients: Vec<_> = self
            .clients
            .iter()
            .filter(|entry| !entry.value().is_closed())
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();
        clients.sort_by_key(|(id, _)| *id);
        clients
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

impl Default for ClientHub {
    fn default() -> Self {
        Self::new()
    }
}
