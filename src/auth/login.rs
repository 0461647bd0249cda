use axum::{debug_handler, extract::State, Json};
use serde_json::{json, Value};
use sqlx::SqlitePool;
use tower_sessions::Session;

use crate::{error::RelayError, session::USER_ID, store, RelayResult};

use super::Credentials;

#[debug_handler(state = crate::AppState)]
pub(crate) async fn login(
    State(db_pool): State<SqlitePool>,
    session: Session,
    Json(creds): Json<Credentials>,
) -> RelayResult<Json<Value>> {
    if creds.username.is_empty() || creds.password.is_empty() {
        return Err(RelayError::Validation(
            "username and password required".to_owned(),
        ));
    }

    // unknown user and wrong password are indistinguishable to the caller
    if !store::verify_user(&db_pool, &creds.username, &creds.password).await? {
        return Err(RelayError::Unauthorized);
    }

    session.insert(USER_ID, &creds.username).await?;
    tracing::info!(username = %creds.username, "logged in");

    Ok(Json(json!({
        "success": true,
        "message": "Login successful",
    })))
}
