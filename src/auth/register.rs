use axum::{debug_handler, extract::State, Json};
use serde_json::{json, Value};
use sqlx::SqlitePool;

use crate::{error::RelayError, store, RelayResult};

use super::Credentials;

#[debug_handler(state = crate::AppState)]
pub(crate) async fn register(
    State(db_pool): State<SqlitePool>,
    Json(creds): Json<Credentials>,
) -> RelayResult<Json<Value>> {
    if creds.username.is_empty() || creds.password.is_empty() {
        return Err(RelayError::Validation(
            "username and password required".to_owned(),
        ));
    }

    store::create_user(&db_pool, &creds.username, &creds.password).await?;
    tracing::info!(username = %creds.username, "registered new user");

    Ok(Json(json!({
        "success": true,
        "message": "Registration successful",
    })))
}
