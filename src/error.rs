use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

pub type RelayResult<T> = Result<T, RelayError>;

/// Failure taxonomy for the relay. Transport problems retire a single
/// connection, store problems surface to the caller of the failed operation,
/// validation problems are rejected at the boundary with no side effects.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("store error: {0}")]
    Store(#[from] sqlx::Error),

    #[error("{0}")]
    Validation(String),

    #[error("not authorized")]
    Unauthorized,

    #[error("{0}")]
    Conflict(String),

    #[error("session error: {0}")]
    Session(#[from] tower_sessions::session::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status = match &self {
            RelayError::Validation(_) => StatusCode::BAD_REQUEST,
            RelayError::Unauthorized => StatusCode::UNAUTHORIZED,
            RelayError::Conflict(_) => StatusCode::CONFLICT,
            RelayError::Transport(_)
            | RelayError::Store(_)
            | RelayError::Session(_)
            | RelayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }

        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
