//! In-memory map from identity to its single live connection.

use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::{RelayError, RelayResult};
use crate::presence::ContactEntry;
use crate::store::ChatMessage;

/// Typed server-to-client event, serialized as `{"type": ..., "data": ...}`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data")]
pub enum Push {
    #[serde(rename = "message")]
    Message(ChatMessage),
    #[serde(rename = "userlist")]
    Contacts(Vec<ContactEntry>),
}

/// Sending side of one connection's outbound queue. The WebSocket task
/// owns the socket and the receiving half; dropping every clone of the
/// handle closes the queue and ends that task.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    pub conn_id: Uuid,
    tx: mpsc::Sender<Push>,
}

impl ConnectionHandle {
    pub fn new(conn_id: Uuid, tx: mpsc::Sender<Push>) -> Self {
        Self { conn_id, tx }
    }

    /// Queues an event without blocking. A full queue means the client
    /// stopped draining and is treated the same as a closed one.
    pub fn push(&self, event: Push) -> RelayResult<()> {
        self.tx
            .try_send(event)
            .map_err(|e| RelayError::Transport(e.to_string()))
    }
}

/// Concurrency-safe identity -> handle map. At most one live handle per
/// identity; registering over an existing entry retires the old handle.
#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    inner: Arc<DashMap<String, ConnectionHandle>>,
}

impl ConnectionRegistry {
    pub fn register(&self, identity: &str, handle: ConnectionHandle) {
        if let Some(old) = self.inner.insert(identity.to_owned(), handle) {
            tracing::info!(%identity, conn_id = %old.conn_id, "retiring replaced connection");
        }
    }

    pub fn unregister(&self, identity: &str) {
        self.inner.remove(identity);
    }

    /// Removes the entry only if it still belongs to `conn_id`, so a
    /// replaced connection's teardown cannot evict its successor.
    pub fn unregister_conn(&self, identity: &str, conn_id: Uuid) -> bool {
        self.inner
            .remove_if(identity, |_, handle| handle.conn_id == conn_id)
            .is_some()
    }

    pub fn lookup(&self, identity: &str) -> Option<ConnectionHandle> {
        self.inner.get(identity).map(|entry| entry.value().clone())
    }

    pub fn is_online(&self, identity: &str) -> bool {
        self.inner.contains_key(identity)
    }

    /// Point-in-time view of every registered connection.
    pub fn snapshot(&self) -> Vec<(String, ConnectionHandle)> {
        self.inner
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }
}
