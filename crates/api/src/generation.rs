//! Weekly report generation for one user.
//!
//! Called by the generation endpoint. Steps, in order:
//! 1. skip unless the user is enabled and due;
//! 2. record the attempt;
//! 3. open a `running` report for the trailing period;
//! 4. lock it if the wallet cannot cover the cost;
//! 5. compose, then charge, settle as `ready` and advance the schedule in a
//!    single transaction.
//!
//! Any error after the attempt is recorded marks both the report and the
//! schedule `failed` and leaves the due date and the wallet alone.

use helfi_core::error::CoreError;
use helfi_core::report_composer::{locked_data_summary, ComposeInput, ReportComposer, LOCKED_SUMMARY};
use helfi_core::types::{DbId, Timestamp};
use helfi_core::weekly_report::{
    advance_due_at, is_due, period_bounds, ReportStatus, SKIP_ALREADY_RUNNING, SKIP_NOT_DUE,
    SKIP_NO_SCHEDULE,
};
use helfi_db::models::weekly_report::{
    CompleteWeeklyReport, SettleOutcome, Settlement, WeeklyReport, WeeklyReportState,
};
use helfi_db::repositories::weekly_report_repo::RUNNING_PERIOD_CONSTRAINT;
use helfi_db::repositories::{WalletRepo, WeeklyReportRepo, WeeklyReportStateRepo};
use helfi_db::DbPool;
use serde::Serialize;

use crate::error::{AppError, AppResult};

/// Result of one generation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunOutcome {
    Skipped { reason: &'static str },
    #[serde(rename_all = "camelCase")]
    Locked { report_id: DbId },
    #[serde(rename_all = "camelCase")]
    Ready { report_id: DbId },
}

pub struct Generator<'a> {
    pub pool: &'a DbPool,
    pub composer: &'a dyn ReportComposer,
    pub cost_cents: i64,
}

impl Generator<'_> {
    pub async fn run(&self, user_id: DbId, now: Timestamp) -> AppResult<RunOutcome> {
        let state = match WeeklyReportStateRepo::find(self.pool, user_id).await? {
            Some(s) if s.reports_enabled && s.next_report_due_at.is_some() => s,
            _ => return Ok(RunOutcome::Skipped { reason: SKIP_NO_SCHEDULE }),
        };
        if !is_due(state.next_report_due_at, now) {
            return Ok(RunOutcome::Skipped { reason: SKIP_NOT_DUE });
        }

        WeeklyReportStateRepo::mark_attempt(self.pool, user_id, now).await?;

        let (period_start, period_end) = period_bounds(now);
        let report =
            match WeeklyReportRepo::create_running(self.pool, user_id, period_start, period_end)
                .await
            {
                Ok(report) => report,
                Err(sqlx::Error::Database(db))
                    if db.constraint() == Some(RUNNING_PERIOD_CONSTRAINT) =>
                {
                    tracing::info!(user_id, "Weekly report already running for period");
                    return Ok(RunOutcome::Skipped { reason: SKIP_ALREADY_RUNNING });
                }
                Err(e) => {
                    self.record_state_failure(user_id).await;
                    return Err(e.into());
                }
            };

        match self.settle(&state, &report, now).await {
            Ok(outcome) => {
                tracing::info!(user_id, report_id = report.id, ?outcome, "Weekly report settled");
                Ok(outcome)
            }
            Err(e) => {
                tracing::error!(user_id, report_id = report.id, error = %e, "Weekly report generation failed");
                if let Err(mark_err) =
                    WeeklyReportRepo::mark_failed(self.pool, report.id, &e.to_string()).await
                {
                    tracing::error!(report_id = report.id, error = %mark_err, "Failed to mark report failed");
                }
                self.record_state_failure(user_id).await;
                Err(e)
            }
        }
    }

    async fn settle(
        &self,
        state: &WeeklyReportState,
        report: &WeeklyReport,
        now: Timestamp,
    ) -> AppResult<RunOutcome> {
        let user_id = state.user_id;

        if self.cost_cents > 0 {
            let covered = WalletRepo::find(self.pool, user_id)
                .await?
                .is_some_and(|w| w.available_cents >= self.cost_cents);
            if !covered {
                return self.lock(state, report, now).await;
            }
        }

        let input = ComposeInput {
            user_id,
            period_start: report.period_start,
            period_end: report.period_end,
            previous_summary: WeeklyReportRepo::latest_ready_summary(self.pool, user_id).await?,
        };
        let composed = self.composer.compose(&input)?;

        let content = CompleteWeeklyReport {
            summary: Some(composed.summary),
            data_summary: Some(composed.data_summary),
            report: Some(composed.report),
            credits_charged: self.cost_cents.max(0),
        };
        let settlement = Settlement {
            report_id: report.id,
            user_id,
            status: ReportStatus::Ready,
            content: &content,
            settled_at: now,
            next_due_at: advance_due_at(state.next_report_due_at, now),
        };
        match WeeklyReportRepo::settle(self.pool, &settlement).await? {
            SettleOutcome::Settled(settled) => Ok(RunOutcome::Ready {
                report_id: settled.id,
            }),
            // Balance changed between the check and the charge.
            SettleOutcome::InsufficientCredits => self.lock(state, report, now).await,
            SettleOutcome::NotRunning => Err(not_running(report.id)),
            SettleOutcome::ScheduleMissing => Err(schedule_missing(user_id)),
        }
    }

    /// Settle as `locked` and skip this period.
    async fn lock(
        &self,
        state: &WeeklyReportState,
        report: &WeeklyReport,
        now: Timestamp,
    ) -> AppResult<RunOutcome> {
        let content = CompleteWeeklyReport {
            summary: Some(LOCKED_SUMMARY.to_string()),
            data_summary: Some(locked_data_summary()),
            report: None,
            credits_charged: 0,
        };
        let settlement = Settlement {
            report_id: report.id,
            user_id: state.user_id,
            status: ReportStatus::Locked,
            content: &content,
            settled_at: now,
            next_due_at: advance_due_at(state.next_report_due_at, now),
        };
        match WeeklyReportRepo::settle(self.pool, &settlement).await? {
            SettleOutcome::Settled(settled) => Ok(RunOutcome::Locked {
                report_id: settled.id,
            }),
            SettleOutcome::ScheduleMissing => Err(schedule_missing(state.user_id)),
            SettleOutcome::InsufficientCredits | SettleOutcome::NotRunning => {
                Err(not_running(report.id))
            }
        }
    }

    async fn record_state_failure(&self, user_id: DbId) {
        if let Err(e) = WeeklyReportStateRepo::mark_failed(self.pool, user_id).await {
            tracing::error!(user_id, error = %e, "Failed to mark schedule failed");
        }
    }
}

fn not_running(report_id: DbId) -> AppError {
    AppError::Core(CoreError::Internal(format!(
        "weekly report {report_id} is no longer running"
    )))
}

fn schedule_missing(user_id: DbId) -> AppError {
    AppError::Core(CoreError::Internal(format!(
        "weekly report schedule for user {user_id} disappeared"
    )))
}
