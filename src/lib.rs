pub mod auth;
pub mod chat;
pub mod error;
pub mod presence;
pub mod registry;
pub mod router;
pub mod session;
pub mod store;

pub use error::{RelayError, RelayResult};

use axum::{extract::FromRef, Router};
use sqlx::SqlitePool;
use tokio::sync::mpsc;
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};
use tower_sessions::{cookie::SameSite, Expiry, MemoryStore, SessionManagerLayer};

use registry::ConnectionRegistry;
use router::RouterTask;

#[derive(Clone, FromRef)]
pub struct AppState {
    pub db_pool: SqlitePool,
    pub registry: ConnectionRegistry,
    pub router_tx: mpsc::Sender<RouterTask>,
}

/// Assembles the full route tree. Kept as a function so integration
/// tests can drive it with `tower::ServiceExt::oneshot`.
pub fn app(state: AppState, static_dir: &str) -> Router {
    let session_store = MemoryStore::default();
    let session_layer = SessionManagerLayer::new(session_store)
        .with_secure(false)
        .with_same_site(SameSite::Lax)
        .with_expiry(Expiry::OnInactivity(time::Duration::minutes(30)));

    Router::new()
        .merge(auth::router())
        .merge(chat::router())
        .fallback_service(ServeDir::new(static_dir))
        .with_state(state)
        .layer(session_layer)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}
