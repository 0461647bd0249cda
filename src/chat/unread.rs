//! Read-state endpoints. No state of their own; they exist on a
//! different trigger path (opening a conversation) than the router.

use std::collections::HashMap;

use axum::{debug_handler, extract::State, Json};
use serde::Deserialize;
use serde_json::{json, Value};
use sqlx::SqlitePool;
use tower_sessions::Session;

use crate::{error::RelayError, session, store, RelayResult};

#[debug_handler(state = crate::AppState)]
pub(crate) async fn unread_counts(
    State(db_pool): State<SqlitePool>,
    session: Session,
) -> RelayResult<Json<HashMap<String, i64>>> {
    let viewer = session::current_user(&session).await?;
    let counts = store::unread_counts(&db_pool, &viewer).await?;
    Ok(Json(counts))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct MarkAsRead {
    from_user: String,
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn mark_as_read(
    State(db_pool): State<SqlitePool>,
    session: Session,
    Json(body): Json<MarkAsRead>,
) -> RelayResult<Json<Value>> {
    let viewer = session::current_user(&session).await?;
    if body.from_user.is_empty() {
        return Err(RelayError::Validation("fromUser required".to_owned()));
    }

    store::mark_read(&db_pool, &body.from_user, &viewer).await?;
    Ok(Json(json!({ "success": true })))
}
