use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tokio::sync::mpsc;
use tracing::trace;

use hearth_crypto::SessionKey;
use hearth_types::events::{Frame, ServerEvent};

use crate::registry::{ConnectionId, Session};

/// Which key a delivery is sealed with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Seal {
    /// The process-wide pre-shared key (replies to login/register).
    Handshake,
    Session(SessionKey),
}

/// One event bound for one connection, not yet encrypted.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub connection_id: ConnectionId,
    pub seal: Seal,
    pub event: ServerEvent,
}

impl Delivery {
    pub fn handshake(connection_id: ConnectionId, event: ServerEvent) -> Self {
        Self {
            connection_id,
            seal: Seal::Handshake,
            event,
        }
    }

    pub fn to_session(session: &Session, event: ServerEvent) -> Self {
        Self {
            connection_id: session.connection_id,
            seal: Seal::Session(session.key),
            event,
        }
    }
}

/// Per-connection outbound queues. Cloning shares the same set of links.
#[derive(Clone, Default)]
pub struct Outbox {
    links: Arc<RwLock<HashMap<ConnectionId, mpsc::UnboundedSender<Frame>>>>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new connection. Returns (conn_id, receiver).
    pub fn register(&self) -> (ConnectionId, mpsc::UnboundedReceiver<Frame>) {
        let connection_id = ConnectionId::new();
        let (tx, rx) = mpsc::unbounded_channel();
        self.links
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(connection_id, tx);
        (connection_id, rx)
    }

    pub fn unregister(&self, connection_id: ConnectionId) {
        self.links
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&connection_id);
    }

    /// Queue a frame. Returns false if the connection is already gone.
    pub fn send(&self, connection_id: ConnectionId, frame: Frame) -> bool {
        let links = self.links.read().unwrap_or_else(|e| e.into_inner());
        match links.get(&connection_id) {
            Some(tx) => tx.send(frame).is_ok(),
            None => {
                trace!("dropping {} frame for departed connection {}", frame.event, connection_id);
                false
            }
        }
    }

    pub fn contains(&self, connection_id: ConnectionId) -> bool {
        self.links
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(&connection_id)
    }

    pub fn len(&self) -> usize {
        self.links.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
