//! Repository for the `wallets` table.

use helfi_core::types::DbId;
use sqlx::{PgExecutor, PgPool};

use crate::models::wallet::Wallet;

const COLUMNS: &str = "user_id, available_cents, plan, updated_at";

pub struct WalletRepo;

impl WalletRepo {
    pub async fn find(pool: &PgPool, user_id: DbId) -> Result<Option<Wallet>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM wallets WHERE user_id = $1");
        sqlx::query_as::<_, Wallet>(&query)
            .bind(user_id)
            .fetch_optional(pool)
            .await
    }

    /// Set a user's balance and plan, creating the wallet if needed.
    pub async fn upsert(
        pool: &PgPool,
        user_id: DbId,
        available_cents: i64,
        plan: Option<&str>,
    ) -> Result<Wallet, sqlx::Error> {
        let query = format!(
            "INSERT INTO wallets (user_id, available_cents, plan) \
             VALUES ($1, $2, $3) \
             ON CONFLICT (user_id) DO UPDATE SET \
                available_cents = EXCLUDED.available_cents, \
                plan = EXCLUDED.plan, \
                updated_at = NOW() \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Wallet>(&query)
            .bind(user_id)
            .bind(available_cents)
            .bind(plan)
            .fetch_one(pool)
            .await
    }

    /// Deduct `cents` if the balance covers it. Returns `false` when the
    /// balance is short (or the wallet is missing) and nothing was charged.
    pub async fn try_charge<'e, E>(
        executor: E,
        user_id: DbId,
        cents: i64,
    ) -> Result<bool, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let result = sqlx::query(
            "UPDATE wallets SET available_cents = available_cents - $2, updated_at = NOW() \
             WHERE user_id = $1 AND available_cents >= $2",
        )
        .bind(user_id)
        .bind(cents)
        .execute(executor)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}
