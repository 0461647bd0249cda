//! Durable message log plus the user credential table, all raw SQL over
//! a shared [`SqlitePool`].
//!
//! Retrieval order is rowid (insertion) order; the RFC3339 `timestamp`
//! column only feeds conversation last-activity and contact sorting.

use std::collections::HashMap;

use bcrypt::{hash, verify, DEFAULT_COST};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::error::{RelayError, RelayResult};

/// One direct message. Immutable after ingestion except for the `read`
/// flag (mark-as-read) and the `delivered` flag (router bookkeeping),
/// neither of which travels on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct ChatMessage {
    #[serde(rename = "from")]
    pub from_user: String,
    #[serde(rename = "to")]
    pub to_user: String,
    pub content: String,
    pub timestamp: String,
    #[serde(default)]
    pub read: bool,
}

pub async fn init(pool: &SqlitePool) -> RelayResult<()> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS messages (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            from_user TEXT,
            to_user TEXT,
            content TEXT,
            timestamp TEXT,
            read INTEGER DEFAULT 0,
            delivered INTEGER DEFAULT 0
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS users (
            username TEXT PRIMARY KEY NOT NULL UNIQUE,
            password TEXT NOT NULL
        )",
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Persists a message and returns its rowid. Succeeds regardless of
/// whether the recipient is reachable; delivery is a separate concern.
pub async fn append(pool: &SqlitePool, msg: &ChatMessage) -> RelayResult<i64> {
    let result = sqlx::query(
        "INSERT INTO messages (from_user, to_user, content, timestamp, read)
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&msg.from_user)
    .bind(&msg.to_user)
    .bind(&msg.content)
    .bind(&msg.timestamp)
    .bind(msg.read)
    .execute(pool)
    .await?;

    Ok(result.last_insert_rowid())
}

/// Messages between the pair, oldest to newest. The window is taken
/// newest-first (`LIMIT`/`OFFSET` over descending rowid) and reversed,
/// so offset 0 always ends at the most recent message.
pub async fn history(
    pool: &SqlitePool,
    user_a: &str,
    user_b: &str,
    limit: i64,
    offset: i64,
) -> RelayResult<Vec<ChatMessage>> {
    let mut messages: Vec<ChatMessage> = sqlx::query_as(
        "SELECT from_user, to_user, content, timestamp, read
         FROM messages
         WHERE (from_user = ? AND to_user = ?)
            OR (from_user = ? AND to_user = ?)
         ORDER BY id DESC
         LIMIT ? OFFSET ?",
    )
    .bind(user_a)
    .bind(user_b)
    .bind(user_b)
    .bind(user_a)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    messages.reverse();
    Ok(messages)
}

/// Timestamp of the most recent message between the pair, if any.
/// Timestamps are normalized UTC RFC3339 strings, so SQL MAX is
/// chronological.
pub async fn last_activity(
    pool: &SqlitePool,
    user_a: &str,
    user_b: &str,
) -> RelayResult<Option<String>> {
    let (timestamp,): (Option<String>,) = sqlx::query_as(
        "SELECT MAX(timestamp)
         FROM messages
         WHERE (from_user = ? AND to_user = ?)
            OR (from_user = ? AND to_user = ?)",
    )
    .bind(user_a)
    .bind(user_b)
    .bind(user_b)
    .bind(user_a)
    .fetch_one(pool)
    .await?;

    Ok(timestamp)
}

/// Unread counts addressed to `recipient`, grouped by sender. Senders
/// with nothing unread are absent from the map.
pub async fn unread_counts(
    pool: &SqlitePool,
    recipient: &str,
) -> RelayResult<HashMap<String, i64>> {
    let rows: Vec<(String, i64)> = sqlx::query_as(
        "SELECT from_user, COUNT(*)
         FROM messages
         WHERE to_user = ? AND read = 0
         GROUP BY from_user",
    )
    .bind(recipient)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().collect())
}

/// Flags every unread message from `sender` to `recipient` as read.
/// Idempotent.
pub async fn mark_read(pool: &SqlitePool, sender: &str, recipient: &str) -> RelayResult<()> {
    sqlx::query(
        "UPDATE messages
         SET read = 1
         WHERE from_user = ? AND to_user = ? AND read = 0",
    )
    .bind(sender)
    .bind(recipient)
    .execute(pool)
    .await?;

    Ok(())
}

/// Stored messages addressed to `recipient` that were never pushed over
/// a live handle, in insertion order. Replay source.
pub async fn undelivered_for(
    pool: &SqlitePool,
    recipient: &str,
) -> RelayResult<Vec<(i64, ChatMessage)>> {
    let rows: Vec<(i64, String, String, String, String, bool)> = sqlx::query_as(
        "SELECT id, from_user, to_user, content, timestamp, read
         FROM messages
         WHERE to_user = ? AND delivered = 0
         ORDER BY id ASC",
    )
    .bind(recipient)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|(id, from_user, to_user, content, timestamp, read)| {
            (
                id,
                ChatMessage {
                    from_user,
                    to_user,
                    content,
                    timestamp,
                    read,
                },
            )
        })
        .collect())
}

pub async fn mark_delivered(pool: &SqlitePool, id: i64) -> RelayResult<()> {
    sqlx::query("UPDATE messages SET delivered = 1 WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;

    Ok(())
}

/// Inserts a new user with a bcrypt-hashed password. A duplicate
/// username surfaces as [`RelayError::Conflict`].
pub async fn create_user(pool: &SqlitePool, username: &str, password: &str) -> RelayResult<()> {
    let hashed = hash(password, DEFAULT_COST).map_err(|e| RelayError::Internal(e.to_string()))?;

    sqlx::query("INSERT INTO users (username, password) VALUES (?, ?)")
        .bind(username)
        .bind(hashed)
        .execute(pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.message().contains("UNIQUE constraint failed") => {
                RelayError::Conflict("username already exists".to_owned())
            }
            _ => RelayError::Store(e),
        })?;

    Ok(())
}

/// Checks a password against the stored hash. An unknown username is
/// `Ok(false)`, not an error, so login stays a uniform yes/no.
pub async fn verify_user(pool: &SqlitePool, username: &str, password: &str) -> RelayResult<bool> {
    let row: Option<(String,)> = sqlx::query_as("SELECT password FROM users WHERE username = ?")
        .bind(username)
        .fetch_optional(pool)
        .await?;

    let Some((hashed,)) = row else {
        return Ok(false);
    };

    verify(password, &hashed).map_err(|e| RelayError::Internal(e.to_string()))
}

/// The contact universe for a viewer: every known username but theirs,
/// alphabetical.
pub async fn usernames_except(pool: &SqlitePool, viewer: &str) -> RelayResult<Vec<String>> {
    let rows: Vec<(String,)> =
        sqlx::query_as("SELECT username FROM users WHERE username != ? ORDER BY username")
            .bind(viewer)
            .fetch_all(pool)
            .await?;

    Ok(rows.into_iter().map(|(username,)| username).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn test_pool() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        init(&pool).await.unwrap();
        pool
    }

    fn msg(from: &str, to: &str, content: &str, timestamp: &str) -> ChatMessage {
        ChatMessage {
            from_user: from.to_owned(),
            to_user: to.to_owned(),
            content: content.to_owned(),
            timestamp: timestamp.to_owned(),
            read: false,
        }
    }

    #[tokio::test]
    async fn history_orders_oldest_to_newest_both_directions() {
        let pool = test_pool().await;
        append(&pool, &msg("alice", "bob", "one", "2026-01-01T10:00:00Z"))
            .await
            .unwrap();
        append(&pool, &msg("bob", "alice", "two", "2026-01-01T10:01:00Z"))
            .await
            .unwrap();
        append(&pool, &msg("alice", "carol", "other pair", "2026-01-01T10:02:00Z"))
            .await
            .unwrap();

        let messages = history(&pool, "alice", "bob", 10, 0).await.unwrap();
        let contents: Vec<&str> = messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, ["one", "two"]);
    }

    #[tokio::test]
    async fn pagination_pages_concatenate_without_gaps() {
        let pool = test_pool().await;
        for i in 1..=4 {
            append(
                &pool,
                &msg("alice", "bob", &format!("m{i}"), &format!("2026-01-01T10:0{i}:00Z")),
            )
            .await
            .unwrap();
        }

        let newest = history(&pool, "alice", "bob", 2, 0).await.unwrap();
        let older = history(&pool, "alice", "bob", 2, 2).await.unwrap();

        let newest: Vec<&str> = newest.iter().map(|m| m.content.as_str()).collect();
        let older: Vec<&str> = older.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(older, ["m1", "m2"]);
        assert_eq!(newest, ["m3", "m4"]);
    }

    #[tokio::test]
    async fn last_activity_is_most_recent_timestamp_or_none() {
        let pool = test_pool().await;
        assert_eq!(last_activity(&pool, "alice", "bob").await.unwrap(), None);

        append(&pool, &msg("alice", "bob", "hi", "2026-01-01T10:00:00Z"))
            .await
            .unwrap();
        append(&pool, &msg("bob", "alice", "hey", "2026-01-02T09:00:00Z"))
            .await
            .unwrap();

        assert_eq!(
            last_activity(&pool, "alice", "bob").await.unwrap(),
            Some("2026-01-02T09:00:00Z".to_owned())
        );
    }

    #[tokio::test]
    async fn mark_read_is_idempotent_and_scoped_to_the_pair() {
        let pool = test_pool().await;
        append(&pool, &msg("alice", "bob", "a", "2026-01-01T10:00:00Z"))
            .await
            .unwrap();
        append(&pool, &msg("alice", "bob", "b", "2026-01-01T10:01:00Z"))
            .await
            .unwrap();
        append(&pool, &msg("carol", "bob", "c", "2026-01-01T10:02:00Z"))
            .await
            .unwrap();

        let counts = unread_counts(&pool, "bob").await.unwrap();
        assert_eq!(counts.get("alice"), Some(&2));
        assert_eq!(counts.get("carol"), Some(&1));

        mark_read(&pool, "alice", "bob").await.unwrap();
        mark_read(&pool, "alice", "bob").await.unwrap();

        let counts = unread_counts(&pool, "bob").await.unwrap();
        assert_eq!(counts.get("alice"), None);
        assert_eq!(counts.get("carol"), Some(&1));

        // a fresh message starts the count over at exactly one
        append(&pool, &msg("alice", "bob", "d", "2026-01-01T10:03:00Z"))
            .await
            .unwrap();
        let counts = unread_counts(&pool, "bob").await.unwrap();
        assert_eq!(counts.get("alice"), Some(&1));
    }

    #[tokio::test]
    async fn undelivered_excludes_flagged_rows() {
        let pool = test_pool().await;
        let first = append(&pool, &msg("alice", "bob", "a", "2026-01-01T10:00:00Z"))
            .await
            .unwrap();
        append(&pool, &msg("alice", "bob", "b", "2026-01-01T10:01:00Z"))
            .await
            .unwrap();

        mark_delivered(&pool, first).await.unwrap();

        let pending = undelivered_for(&pool, "bob").await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].1.content, "b");
    }

    #[tokio::test]
    async fn duplicate_username_is_a_conflict() {
        let pool = test_pool().await;
        create_user(&pool, "alice", "pw").await.unwrap();

        let err = create_user(&pool, "alice", "other").await.unwrap_err();
        assert!(matches!(err, RelayError::Conflict(_)));
    }

    #[tokio::test]
    async fn verify_user_checks_hash_and_tolerates_unknowns() {
        let pool = test_pool().await;
        create_user(&pool, "alice", "secret").await.unwrap();

        assert!(verify_user(&pool, "alice", "secret").await.unwrap());
        assert!(!verify_user(&pool, "alice", "wrong").await.unwrap());
        assert!(!verify_user(&pool, "nobody", "secret").await.unwrap());
    }
}
