use axum::{
    debug_handler,
    extract::{Query, State},
    Json,
};
use serde::Deserialize;
use sqlx::SqlitePool;
use tower_sessions::Session;

use crate::{
    error::RelayError,
    session,
    store::{self, ChatMessage},
    RelayResult,
};

#[derive(Deserialize)]
pub(crate) struct HistoryQuery {
    user: Option<String>,
    limit: Option<String>,
    offset: Option<String>,
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn conversation(
    State(db_pool): State<SqlitePool>,
    session: Session,
    Query(query): Query<HistoryQuery>,
) -> RelayResult<Json<Vec<ChatMessage>>> {
    let viewer = session::current_user(&session).await?;
    let peer = query
        .user
        .filter(|user| !user.is_empty())
        .ok_or_else(|| RelayError::Validation("peer user must be specified".to_owned()))?;
    let limit = parse_bound(query.limit, 10, "limit")?;
    let offset = parse_bound(query.offset, 0, "offset")?;

    let messages = store::history(&db_pool, &viewer, &peer, limit, offset).await?;
    Ok(Json(messages))
}

/// Pagination values must be non-negative integers; anything else is
/// rejected before touching the store.
fn parse_bound(raw: Option<String>, default: i64, name: &str) -> RelayResult<i64> {
    match raw {
        None => Ok(default),
        Some(s) => match s.parse::<i64>() {
            Ok(value) if value >= 0 => Ok(value),
            _ => Err(RelayError::Validation(format!("invalid {name} value"))),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounds_default_when_absent() {
        assert_eq!(parse_bound(None, 10, "limit").unwrap(), 10);
        assert_eq!(parse_bound(None, 0, "offset").unwrap(), 0);
    }

    #[test]
    fn negative_and_non_numeric_bounds_are_rejected() {
        assert!(parse_bound(Some("-1".to_owned()), 10, "limit").is_err());
        assert!(parse_bound(Some("ten".to_owned()), 10, "limit").is_err());
        assert_eq!(parse_bound(Some("0".to_owned()), 10, "limit").unwrap(), 0);
    }
}
