//! Repository for the `notification_inbox` table.

use helfi_core::types::DbId;
use sqlx::PgPool;

use crate::models::inbox::{InboxEntry, NewInboxEntry};

const COLUMNS: &str =
    "id, user_id, title, body, url, kind, source, event_key, metadata, read_at, created_at";

pub struct InboxRepo;

impl InboxRepo {
    /// Insert an entry unless one with the same event key already exists
    /// for the user. Returns `None` for a duplicate.
    pub async fn record(
        pool: &PgPool,
        entry: &NewInboxEntry,
    ) -> Result<Option<InboxEntry>, sqlx::Error> {
        let query = format!(
            "INSERT INTO notification_inbox \
                (user_id, title, body, url, kind, source, event_key, metadata) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             ON CONFLICT (user_id, event_key) DO NOTHING \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, InboxEntry>(&query)
            .bind(entry.user_id)
            .bind(&entry.title)
            .bind(&entry.body)
            .bind(&entry.url)
            .bind(&entry.kind)
            .bind(&entry.source)
            .bind(&entry.event_key)
            .bind(&entry.metadata)
            .fetch_optional(pool)
            .await
    }

    pub async fn list_for_user(
        pool: &PgPool,
        user_id: DbId,
        limit: i64,
    ) -> Result<Vec<InboxEntry>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM notification_inbox \
             WHERE user_id = $1 ORDER BY created_at DESC, id DESC LIMIT $2"
        );
        sqlx::query_as::<_, InboxEntry>(&query)
            .bind(user_id)
            .bind(limit)
            .fetch_all(pool)
            .await
    }
}
