use helfi_core::types::Timestamp;
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `feature_flags` table.
#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureFlag {
    pub name: String,
    pub is_enabled: bool,
    pub updated_at: Timestamp,
}
