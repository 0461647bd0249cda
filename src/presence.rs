//! Per-viewer contact lists with derived online/offline status.

use std::cmp::Ordering;

use serde::Serialize;
use sqlx::SqlitePool;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

use crate::error::RelayResult;
use crate::registry::{ConnectionRegistry, Push};
use crate::store;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContactEntry {
    pub username: String,
    pub status: String,
}

/// Every known identity except the viewer, ordered by last conversation
/// activity with the viewer (most recent first, no activity last) and
/// alphabetically within ties. Status reflects the registry at call time.
pub async fn contacts_for(
    pool: &SqlitePool,
    registry: &ConnectionRegistry,
    viewer: &str,
) -> RelayResult<Vec<ContactEntry>> {
    let mut contacts: Vec<(String, Option<OffsetDateTime>)> = Vec::new();
    for username in store::usernames_except(pool, viewer).await? {
        let last_active = store::last_activity(pool, viewer, &username)
            .await?
            .and_then(|ts| OffsetDateTime::parse(&ts, &Rfc3339).ok());
        contacts.push((username, last_active));
    }

    contacts.sort_by(|a, b| match (&a.1, &b.1) {
        (Some(x), Some(y)) => y.cmp(x).then_with(|| a.0.cmp(&b.0)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.0.cmp(&b.0),
    });

    Ok(contacts
        .into_iter()
        .map(|(username, _)| {
            let status = if registry.is_online(&username) {
                "online"
            } else {
                "offline"
            };
            ContactEntry {
                username,
                status: status.to_owned(),
            }
        })
        .collect())
}

/// Recomputes and pushes the contact list for every registered viewer.
/// A failed push retires that viewer's connection; the sweep continues.
pub async fn broadcast_contacts(pool: &SqlitePool, registry: &ConnectionRegistry) {
    for (viewer, handle) in registry.snapshot() {
        let contacts = match contacts_for(pool, registry, &viewer).await {
            Ok(contacts) => contacts,
            Err(e) => {
                tracing::error!(%viewer, error = %e, "failed to build contact list");
                continue;
            }
        };

        if let Err(e) = handle.push(Push::Contacts(contacts)) {
            tracing::warn!(%viewer, error = %e, "contact push failed, retiring connection");
            registry.unregister_conn(&viewer, handle.conn_id);
        }
    }
}
