//! Credit wallet model.

use helfi_core::types::{DbId, Timestamp};
use helfi_core::weekly_report::wallet_allows_opt_in;
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `wallets` table.
#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Wallet {
    pub user_id: DbId,
    pub available_cents: i64,
    /// Active subscription plan name, if any.
    pub plan: Option<String>,
    pub updated_at: Timestamp,
}

impl Wallet {
    pub fn allows_opt_in(&self) -> bool {
        wallet_allows_opt_in(self.available_cents, self.plan.as_deref())
    }
}
