//! Repository for the `weekly_reports` table.

use chrono::NaiveDate;
use helfi_core::types::{DbId, Timestamp};
use helfi_core::weekly_report::{AckEffect, NotifyChannel, ReportStatus};
use sqlx::{PgExecutor, PgPool};

use crate::models::weekly_report::{
    CompleteWeeklyReport, SettleOutcome, Settlement, WeeklyReport,
};
use crate::repositories::{WalletRepo, WeeklyReportStateRepo};

/// Column list for `weekly_reports` queries.
const COLUMNS: &str = "id, user_id, period_start, period_end, status, summary, data_summary, \
    report, credits_charged, error, ready_at, notified_at, push_sent_at, email_sent_at, \
    last_shown_at, viewed_at, dismissed, dismissed_at, created_at, updated_at";

/// Partial unique index guarding one running report per user and period.
pub const RUNNING_PERIOD_CONSTRAINT: &str = "uq_weekly_reports_running_period";

pub struct WeeklyReportRepo;

impl WeeklyReportRepo {
    /// Insert a `running` report for the given period.
    ///
    /// Fails with a unique violation on [`RUNNING_PERIOD_CONSTRAINT`] when
    /// another generation for the same period is still running.
    pub async fn create_running(
        pool: &PgPool,
        user_id: DbId,
        period_start: NaiveDate,
        period_end: NaiveDate,
    ) -> Result<WeeklyReport, sqlx::Error> {
        let query = format!(
            "INSERT INTO weekly_reports (user_id, period_start, period_end, status) \
             VALUES ($1, $2, $3, $4) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, WeeklyReport>(&query)
            .bind(user_id)
            .bind(period_start)
            .bind(period_end)
            .bind(ReportStatus::Running.as_str())
            .fetch_one(pool)
            .await
    }

    /// Settle a running report as `ready` or `locked`.
    ///
    /// Returns `None` if the report is no longer running.
    pub async fn complete<'e, E>(
        executor: E,
        id: DbId,
        status: ReportStatus,
        content: &CompleteWeeklyReport,
        ready_at: Timestamp,
    ) -> Result<Option<WeeklyReport>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let query = format!(
            "UPDATE weekly_reports SET \
                status = $2, summary = $3, data_summary = $4, report = $5, \
                credits_charged = $6, ready_at = $7, updated_at = NOW() \
             WHERE id = $1 AND status = 'running' \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, WeeklyReport>(&query)
            .bind(id)
            .bind(status.as_str())
            .bind(&content.summary)
            .bind(&content.data_summary)
            .bind(&content.report)
            .bind(content.credits_charged)
            .bind(ready_at)
            .fetch_optional(executor)
            .await
    }

    /// Charge the wallet, settle the report and advance the schedule in one
    /// transaction. Unless the outcome is `Settled`, nothing is written and
    /// the report stays `running` for the caller to mark failed.
    pub async fn settle(
        pool: &PgPool,
        settlement: &Settlement<'_>,
    ) -> Result<SettleOutcome, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let cents = settlement.content.credits_charged;
        if cents > 0 && !WalletRepo::try_charge(&mut *tx, settlement.user_id, cents).await? {
            tx.rollback().await?;
            return Ok(SettleOutcome::InsufficientCredits);
        }

        let Some(report) = Self::complete(
            &mut *tx,
            settlement.report_id,
            settlement.status,
            settlement.content,
            settlement.settled_at,
        )
        .await?
        else {
            tx.rollback().await?;
            return Ok(SettleOutcome::NotRunning);
        };

        let advanced = match settlement.status {
            ReportStatus::Locked => {
                WeeklyReportStateRepo::mark_skipped(
                    &mut *tx,
                    settlement.user_id,
                    settlement.next_due_at,
                )
                .await?
            }
            _ => {
                WeeklyReportStateRepo::mark_generated(
                    &mut *tx,
                    settlement.user_id,
                    settlement.settled_at,
                    settlement.next_due_at,
                )
                .await?
            }
        };
        if advanced == 0 {
            tx.rollback().await?;
            return Ok(SettleOutcome::ScheduleMissing);
        }

        tx.commit().await?;
        Ok(SettleOutcome::Settled(report))
    }

    /// Stamp the first successful delivery on `channel`. Later calls keep
    /// the original time.
    pub async fn mark_channel_sent(
        pool: &PgPool,
        id: DbId,
        channel: NotifyChannel,
        now: Timestamp,
    ) -> Result<(), sqlx::Error> {
        let column = match channel {
            NotifyChannel::Push => "push_sent_at",
            NotifyChannel::Email => "email_sent_at",
        };
        let query = format!(
            "UPDATE weekly_reports SET {column} = COALESCE({column}, $2), updated_at = NOW() \
             WHERE id = $1"
        );
        sqlx::query(&query).bind(id).bind(now).execute(pool).await?;
        Ok(())
    }

    /// Find a report by id regardless of owner.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<WeeklyReport>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM weekly_reports WHERE id = $1");
        sqlx::query_as::<_, WeeklyReport>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Settle a running report as `failed` with an error message.
    pub async fn mark_failed(pool: &PgPool, id: DbId, error: &str) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE weekly_reports SET status = $2, error = $3, updated_at = NOW() \
             WHERE id = $1 AND status = 'running'",
        )
        .bind(id)
        .bind(ReportStatus::Failed.as_str())
        .bind(error)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Find a report owned by `user_id`. Reports belonging to someone else
    /// are indistinguishable from missing ones.
    pub async fn find_for_user(
        pool: &PgPool,
        id: DbId,
        user_id: DbId,
    ) -> Result<Option<WeeklyReport>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM weekly_reports WHERE id = $1 AND user_id = $2");
        sqlx::query_as::<_, WeeklyReport>(&query)
            .bind(id)
            .bind(user_id)
            .fetch_optional(pool)
            .await
    }

    /// Most recent reports first.
    pub async fn list_for_user(
        pool: &PgPool,
        user_id: DbId,
        limit: i64,
    ) -> Result<Vec<WeeklyReport>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM weekly_reports \
             WHERE user_id = $1 \
             ORDER BY created_at DESC, id DESC \
             LIMIT $2"
        );
        sqlx::query_as::<_, WeeklyReport>(&query)
            .bind(user_id)
            .bind(limit)
            .fetch_all(pool)
            .await
    }

    pub async fn latest_for_user(
        pool: &PgPool,
        user_id: DbId,
    ) -> Result<Option<WeeklyReport>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM weekly_reports \
             WHERE user_id = $1 \
             ORDER BY created_at DESC, id DESC \
             LIMIT 1"
        );
        sqlx::query_as::<_, WeeklyReport>(&query)
            .bind(user_id)
            .fetch_optional(pool)
            .await
    }

    /// Summary of the latest `ready` report, used to seed the next one.
    pub async fn latest_ready_summary(
        pool: &PgPool,
        user_id: DbId,
    ) -> Result<Option<String>, sqlx::Error> {
        let row: Option<(Option<String>,)> = sqlx::query_as(
            "SELECT summary FROM weekly_reports \
             WHERE user_id = $1 AND status = 'ready' \
             ORDER BY created_at DESC, id DESC \
             LIMIT 1",
        )
        .bind(user_id)
        .fetch_optional(pool)
        .await?;
        Ok(row.and_then(|(summary,)| summary))
    }

    /// Apply a notification acknowledgement.
    ///
    /// Every write is guarded by `dismissed = false`, so a concurrent
    /// dismissal wins. Returns `None` when nothing was written (no-op effect
    /// or lost race).
    pub async fn apply_ack(
        pool: &PgPool,
        id: DbId,
        user_id: DbId,
        effect: AckEffect,
        now: Timestamp,
    ) -> Result<Option<WeeklyReport>, sqlx::Error> {
        let set_clause = match effect {
            AckEffect::NoOp => return Ok(None),
            AckEffect::MarkShown { first: true } => "notified_at = $3, last_shown_at = $3",
            AckEffect::MarkShown { first: false } => "last_shown_at = $3",
            AckEffect::MarkViewed => "viewed_at = $3",
            AckEffect::Dismiss => "dismissed = true, dismissed_at = $3",
        };
        let query = format!(
            "UPDATE weekly_reports SET {set_clause}, updated_at = NOW() \
             WHERE id = $1 AND user_id = $2 AND dismissed = false \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, WeeklyReport>(&query)
            .bind(id)
            .bind(user_id)
            .bind(now)
            .fetch_optional(pool)
            .await
    }
}
