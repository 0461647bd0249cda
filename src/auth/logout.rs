use axum::{debug_handler, Json};
use serde_json::{json, Value};
use tower_sessions::Session;

use crate::RelayResult;

#[debug_handler]
pub(crate) async fn logout(session: Session) -> RelayResult<Json<Value>> {
    session.clear().await;
    Ok(Json(json!({ "success": true })))
}
