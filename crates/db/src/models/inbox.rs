use helfi_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A row from the `notification_inbox` table.
#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InboxEntry {
    pub id: DbId,
    pub user_id: DbId,
    pub title: String,
    pub body: String,
    pub url: Option<String>,
    pub kind: String,
    pub source: String,
    pub event_key: String,
    pub metadata: serde_json::Value,
    pub read_at: Option<Timestamp>,
    pub created_at: Timestamp,
}

/// DTO for recording an inbox entry.
#[derive(Debug, Clone, Deserialize)]
pub struct NewInboxEntry {
    pub user_id: DbId,
    pub title: String,
    pub body: String,
    pub url: Option<String>,
    pub kind: String,
    pub source: String,
    /// Unique per user; recording the same key twice is a no-op.
    pub event_key: String,
    pub metadata: serde_json::Value,
}
