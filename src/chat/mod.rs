mod contacts;
mod history;
mod unread;
mod ws;

use axum::{
    routing::{get, post},
    Router,
};

use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/ws", get(ws::chat_ws))
        .route("/users", get(contacts::user_statuses))
        .route("/conversation", get(history::conversation))
        .route("/unreadCounts", get(unread::unread_counts))
        .route("/markAsRead", post(unread::mark_as_read))
}
