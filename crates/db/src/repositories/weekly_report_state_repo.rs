//! Repository for the `weekly_report_states` table.

use chrono::Duration;
use helfi_core::types::{DbId, Timestamp};
use helfi_core::weekly_report::{LastStatus, REPORT_PERIOD_DAYS};
use sqlx::{PgExecutor, PgPool};

use crate::models::weekly_report::WeeklyReportState;

/// Column list for `weekly_report_states` queries.
const COLUMNS: &str = "user_id, reports_enabled, reports_enabled_at, next_report_due_at, \
    last_status, last_report_at, last_attempt_at, created_at, updated_at";

/// Schedule state reads and transitions, one row per user.
pub struct WeeklyReportStateRepo;

impl WeeklyReportStateRepo {
    pub async fn find(
        pool: &PgPool,
        user_id: DbId,
    ) -> Result<Option<WeeklyReportState>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM weekly_report_states WHERE user_id = $1");
        sqlx::query_as::<_, WeeklyReportState>(&query)
            .bind(user_id)
            .fetch_optional(pool)
            .await
    }

    /// Opt a user in (creating the row if needed).
    ///
    /// A fresh opt-in stamps `reports_enabled_at` and schedules the first
    /// report one period out. Re-enabling an already enabled user keeps the
    /// existing schedule.
    pub async fn enable(
        pool: &PgPool,
        user_id: DbId,
        enabled_at: Timestamp,
        first_due_at: Timestamp,
    ) -> Result<WeeklyReportState, sqlx::Error> {
        let query = format!(
            "INSERT INTO weekly_report_states \
                (user_id, reports_enabled, reports_enabled_at, next_report_due_at) \
             VALUES ($1, true, $2, $3) \
             ON CONFLICT (user_id) DO UPDATE SET \
                reports_enabled = true, \
                reports_enabled_at = CASE WHEN weekly_report_states.reports_enabled \
                    THEN COALESCE(weekly_report_states.reports_enabled_at, EXCLUDED.reports_enabled_at) \
                    ELSE EXCLUDED.reports_enabled_at END, \
                next_report_due_at = CASE WHEN weekly_report_states.reports_enabled \
                    THEN COALESCE(weekly_report_states.next_report_due_at, EXCLUDED.next_report_due_at) \
                    ELSE EXCLUDED.next_report_due_at END, \
                updated_at = NOW() \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, WeeklyReportState>(&query)
            .bind(user_id)
            .bind(enabled_at)
            .bind(first_due_at)
            .fetch_one(pool)
            .await
    }

    /// Opt a user out. The row is kept so history survives a later opt-in.
    pub async fn disable(pool: &PgPool, user_id: DbId) -> Result<WeeklyReportState, sqlx::Error> {
        let query = format!(
            "INSERT INTO weekly_report_states (user_id, reports_enabled) \
             VALUES ($1, false) \
             ON CONFLICT (user_id) DO UPDATE SET \
                reports_enabled = false, \
                updated_at = NOW() \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, WeeklyReportState>(&query)
            .bind(user_id)
            .fetch_one(pool)
            .await
    }

    /// Enabled users whose report is due at `now`, oldest due first.
    ///
    /// Users with an attempt newer than `retry_cooldown` are left out so a
    /// generation still in flight is not dispatched twice.
    pub async fn list_due(
        pool: &PgPool,
        now: Timestamp,
        limit: i64,
        retry_cooldown: Duration,
    ) -> Result<Vec<WeeklyReportState>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM weekly_report_states \
             WHERE reports_enabled = true \
               AND next_report_due_at IS NOT NULL \
               AND next_report_due_at <= $1 \
               AND (last_attempt_at IS NULL OR last_attempt_at < $2) \
             ORDER BY next_report_due_at ASC, user_id ASC \
             LIMIT $3"
        );
        sqlx::query_as::<_, WeeklyReportState>(&query)
            .bind(now)
            .bind(now - retry_cooldown)
            .bind(limit)
            .fetch_all(pool)
            .await
    }

    /// Repair enabled rows with a missing or impossible due date.
    ///
    /// Returns the number of rows updated. A repaired row no longer matches
    /// the selection, so repeated calls converge.
    pub async fn backfill(pool: &PgPool, now: Timestamp, limit: i64) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE weekly_report_states s SET \
                reports_enabled_at = COALESCE(s.reports_enabled_at, $1), \
                next_report_due_at = COALESCE(s.reports_enabled_at, $1) \
                    + make_interval(days => $3), \
                updated_at = NOW() \
             WHERE s.user_id IN ( \
                SELECT user_id FROM weekly_report_states \
                WHERE reports_enabled = true \
                  AND (next_report_due_at IS NULL \
                       OR next_report_due_at < reports_enabled_at) \
                ORDER BY user_id \
                LIMIT $2 \
                FOR UPDATE SKIP LOCKED)",
        )
        .bind(now)
        .bind(limit)
        .bind(REPORT_PERIOD_DAYS as i32)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Record that a generation attempt started.
    pub async fn mark_attempt(
        pool: &PgPool,
        user_id: DbId,
        now: Timestamp,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE weekly_report_states SET \
                last_attempt_at = $2, last_status = $3, updated_at = NOW() \
             WHERE user_id = $1",
        )
        .bind(user_id)
        .bind(now)
        .bind(LastStatus::Pending.as_str())
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Record a successful run and move the schedule forward. Returns the
    /// number of rows updated.
    pub async fn mark_generated<'e, E>(
        executor: E,
        user_id: DbId,
        now: Timestamp,
        next_due_at: Timestamp,
    ) -> Result<u64, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let result = sqlx::query(
            "UPDATE weekly_report_states SET \
                last_status = $2, last_report_at = $3, next_report_due_at = $4, \
                updated_at = NOW() \
             WHERE user_id = $1",
        )
        .bind(user_id)
        .bind(LastStatus::Generated.as_str())
        .bind(now)
        .bind(next_due_at)
        .execute(executor)
        .await?;
        Ok(result.rows_affected())
    }

    /// Record an explicitly skipped run (e.g. locked for credits) and move
    /// the schedule forward. Returns the number of rows updated.
    pub async fn mark_skipped<'e, E>(
        executor: E,
        user_id: DbId,
        next_due_at: Timestamp,
    ) -> Result<u64, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let result = sqlx::query(
            "UPDATE weekly_report_states SET \
                last_status = $2, next_report_due_at = $3, updated_at = NOW() \
             WHERE user_id = $1",
        )
        .bind(user_id)
        .bind(LastStatus::Skipped.as_str())
        .bind(next_due_at)
        .execute(executor)
        .await?;
        Ok(result.rows_affected())
    }

    /// Record a failed run. The due date is left alone so the next
    /// scheduler pass retries.
    pub async fn mark_failed(pool: &PgPool, user_id: DbId) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE weekly_report_states SET last_status = $2, updated_at = NOW() \
             WHERE user_id = $1",
        )
        .bind(user_id)
        .bind(LastStatus::Failed.as_str())
        .execute(pool)
        .await?;
        Ok(())
    }
}
