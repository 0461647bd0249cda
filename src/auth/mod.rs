mod login;
mod logout;
mod probe;
mod register;

use axum::{
    routing::{get, post},
    Router,
};
use serde::Deserialize;

use crate::AppState;

#[derive(Deserialize)]
pub(crate) struct Credentials {
    pub(crate) username: String,
    pub(crate) password: String,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/register", post(register::register))
        .route("/login", post(login::login))
        .route("/logout", post(logout::logout))
        .route("/session", get(probe::session_probe))
}
