//! The live channel. One WebSocket per identity; the socket task owns
//! the receiving half of the outbound queue and a forward task drains
//! it, so a stalled peer only ever stalls itself.

use axum::{
    debug_handler,
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use time::{format_description::well_known::Rfc3339, OffsetDateTime, UtcOffset};
use tokio::sync::mpsc;
use tower_sessions::Session;
use uuid::Uuid;

use crate::{
    registry::{ConnectionHandle, ConnectionRegistry, Push},
    router::RouterTask,
    session,
    store::ChatMessage,
    RelayResult,
};

const OUTBOUND_CAPACITY: usize = 64;

/// Client frame. Sender identity and timestamp are server concerns;
/// a client-supplied timestamp is only a hint.
#[derive(Deserialize)]
struct InboundFrame {
    to: String,
    content: String,
    #[serde(default)]
    timestamp: Option<String>,
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn chat_ws(
    State(registry): State<ConnectionRegistry>,
    State(router_tx): State<mpsc::Sender<RouterTask>>,
    session: Session,
    ws: WebSocketUpgrade,
) -> RelayResult<Response> {
    let identity = session::current_user(&session).await?;
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, identity, registry, router_tx)))
}

async fn handle_socket(
    socket: WebSocket,
    identity: String,
    registry: ConnectionRegistry,
    router_tx: mpsc::Sender<RouterTask>,
) {
    let (mut sender, mut receiver) = socket.split();
    let conn_id = Uuid::now_v7();

    let (tx, mut rx) = mpsc::channel::<Push>(OUTBOUND_CAPACITY);
    registry.register(&identity, ConnectionHandle::new(conn_id, tx));
    tracing::info!(%identity, %conn_id, "client connected");

    let forward_task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let payload = match serde_json::to_string(&event) {
                Ok(payload) => payload,
                Err(e) => {
                    tracing::error!(error = %e, "failed to encode push event");
                    continue;
                }
            };
            if sender.send(Message::Text(payload.into())).await.is_err() {
                break;
            }
        }
        let _ = sender.send(Message::Close(None)).await;
    });

    // catch up on stored messages before this connection's own traffic;
    // the serial queue keeps replay ahead of anything submitted below
    let _ = router_tx.send(RouterTask::Replay(identity.clone())).await;

    while let Some(Ok(frame)) = receiver.next().await {
        match frame {
            Message::Text(text) => {
                let frame: InboundFrame = match serde_json::from_str(&text) {
                    Ok(frame) => frame,
                    Err(e) => {
                        tracing::warn!(%identity, error = %e, "invalid frame, skipping");
                        continue;
                    }
                };
                if frame.to.is_empty() || frame.content.is_empty() {
                    tracing::warn!(%identity, "frame missing recipient or content, skipping");
                    continue;
                }

                let msg = ChatMessage {
                    from_user: identity.clone(),
                    to_user: frame.to,
                    content: frame.content,
                    timestamp: normalize_timestamp(frame.timestamp),
                    read: false,
                };
                if router_tx.send(RouterTask::Deliver(msg)).await.is_err() {
                    break;
                }
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    // guarded removal: a replacement connection may already own the slot
    if registry.unregister_conn(&identity, conn_id) {
        tracing::info!(%identity, %conn_id, "client disconnected");
        let _ = router_tx.send(RouterTask::RefreshPresence).await;
    }
    forward_task.abort();
}

/// Parses a client-supplied RFC3339 timestamp and re-anchors it to UTC;
/// anything unparseable is replaced with server time.
fn normalize_timestamp(raw: Option<String>) -> String {
    raw.and_then(|ts| OffsetDateTime::parse(&ts, &Rfc3339).ok())
        .unwrap_or_else(OffsetDateTime::now_utc)
        .to_offset(UtcOffset::UTC)
        .format(&Rfc3339)
        .unwrap_or_default()
}
