use axum::{
    debug_handler,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tower_sessions::Session;

use crate::{session::USER_ID, RelayResult};

/// Tells a polling client whether its cookie still names a logged-in
/// user.
#[debug_handler]
pub(crate) async fn session_probe(session: Session) -> RelayResult<Response> {
    Ok(match session.get::<String>(USER_ID).await? {
        Some(username) => {
            Json(json!({ "loggedIn": true, "username": username })).into_response()
        }
        None => (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "loggedIn": false })),
        )
            .into_response(),
    })
}
