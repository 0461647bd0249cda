use tower_sessions::Session;

use crate::error::{RelayError, RelayResult};

pub const USER_ID: &str = "user_id";

/// Pulls the verified identity out of the session cookie.
pub async fn current_user(session: &Session) -> RelayResult<String> {
    session
        .get::<String>(USER_ID)
        .await?
        .ok_or(RelayError::Unauthorized)
}
