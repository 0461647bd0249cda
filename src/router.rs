//! Serial delivery worker. One task drains the ingestion queue, so
//! persistence order, first-attempt delivery order, and queue arrival
//! order are the same total order across all senders.

use sqlx::SqlitePool;
use tokio::sync::mpsc;

use crate::presence;
use crate::registry::{ConnectionRegistry, Push};
use crate::store::{self, ChatMessage};

pub const QUEUE_CAPACITY: usize = 256;

#[derive(Debug)]
pub enum RouterTask {
    /// Persist, deliver live if the recipient is connected, refresh
    /// presence.
    Deliver(ChatMessage),
    /// Push every stored-but-undelivered message for a freshly
    /// connected identity, then refresh presence.
    Replay(String),
    /// Presence sweep only; queued on disconnect.
    RefreshPresence,
}

/// Spawns the single worker and returns the ingestion side of its queue.
pub fn spawn(pool: SqlitePool, registry: ConnectionRegistry) -> mpsc::Sender<RouterTask> {
    let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
    tokio::spawn(run(pool, registry, rx));
    tx
}

async fn run(pool: SqlitePool, registry: ConnectionRegistry, mut rx: mpsc::Receiver<RouterTask>) {
    while let Some(task) = rx.recv().await {
        process(&pool, &registry, task).await;
    }
    tracing::info!("router queue closed, worker exiting");
}

/// Handles one task to completion. Failures are contained: a broken
/// recipient handle retires that one connection and never aborts the
/// message or the queue.
pub async fn process(pool: &SqlitePool, registry: &ConnectionRegistry, task: RouterTask) {
    match task {
        RouterTask::Deliver(msg) => deliver(pool, registry, msg).await,
        RouterTask::Replay(identity) => replay(pool, registry, &identity).await,
        RouterTask::RefreshPresence => {}
    }
    presence::broadcast_contacts(pool, registry).await;
}

async fn deliver(pool: &SqlitePool, registry: &ConnectionRegistry, msg: ChatMessage) {
    // durability first; an append failure is logged but never blocks the
    // delivery attempt
    let row_id = match store::append(pool, &msg).await {
        Ok(id) => Some(id),
        Err(e) => {
            tracing::error!(from = %msg.from_user, to = %msg.to_user, error = %e,
                "failed to persist message");
            None
        }
    };

    let Some(handle) = registry.lookup(&msg.to_user) else {
        tracing::debug!(to = %msg.to_user, "recipient offline, message stored for replay");
        return;
    };

    let recipient = msg.to_user.clone();
    match handle.push(Push::Message(msg)) {
        Ok(()) => {
            if let Some(id) = row_id {
                if let Err(e) = store::mark_delivered(pool, id).await {
                    tracing::warn!(id, error = %e, "failed to flag message delivered");
                }
            }
        }
        Err(e) => {
            tracing::warn!(to = %recipient, error = %e, "push failed, retiring connection");
            registry.unregister_conn(&recipient, handle.conn_id);
        }
    }
}

async fn replay(pool: &SqlitePool, registry: &ConnectionRegistry, identity: &str) {
    let Some(handle) = registry.lookup(identity) else {
        return;
    };

    let pending = match store::undelivered_for(pool, identity).await {
        Ok(pending) => pending,
        Err(e) => {
            tracing::error!(%identity, error = %e, "failed to load undelivered messages");
            return;
        }
    };

    for (id, msg) in pending {
        if let Err(e) = handle.push(Push::Message(msg)) {
            // the rest stays undelivered for the next connect
            tracing::warn!(%identity, error = %e, "replay push failed, retiring connection");
            registry.unregister_conn(identity, handle.conn_id);
            return;
        }
        if let Err(e) = store::mark_delivered(pool, id).await {
            tracing::warn!(id, error = %e, "failed to flag replayed message delivered");
        }
    }
}
