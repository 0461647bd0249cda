use axum::{debug_handler, extract::State, Json};
use sqlx::SqlitePool;
use tower_sessions::Session;

use crate::{presence, registry::ConnectionRegistry, session, RelayResult};

/// Polling variant of the contact-list push: same list, same order.
#[debug_handler(state = crate::AppState)]
pub(crate) async fn user_statuses(
    State(db_pool): State<SqlitePool>,
    State(registry): State<ConnectionRegistry>,
    session: Session,
) -> RelayResult<Json<Vec<presence::ContactEntry>>> {
    let viewer = session::current_user(&session).await?;
    let contacts = presence::contacts_for(&db_pool, &registry, &viewer).await?;
    Ok(Json(contacts))
}
