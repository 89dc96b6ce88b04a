//! Weekly report schedule state and report models.

use chrono::NaiveDate;
use helfi_core::error::CoreError;
use helfi_core::types::{DbId, Timestamp};
use helfi_core::weekly_report::{AckState, LastStatus, NotifyChannel, ReportStatus};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A row from the `weekly_report_states` table.
#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeeklyReportState {
    pub user_id: DbId,
    pub reports_enabled: bool,
    pub reports_enabled_at: Option<Timestamp>,
    pub next_report_due_at: Option<Timestamp>,
    pub last_status: String,
    pub last_report_at: Option<Timestamp>,
    pub last_attempt_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl WeeklyReportState {
    pub fn status(&self) -> Result<LastStatus, CoreError> {
        self.last_status.parse()
    }
}

/// A row from the `weekly_reports` table.
#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeeklyReport {
    pub id: DbId,
    pub user_id: DbId,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub status: String,
    pub summary: Option<String>,
    pub data_summary: Option<serde_json::Value>,
    pub report: Option<serde_json::Value>,
    pub credits_charged: i64,
    pub error: Option<String>,
    pub ready_at: Option<Timestamp>,
    pub notified_at: Option<Timestamp>,
    pub push_sent_at: Option<Timestamp>,
    pub email_sent_at: Option<Timestamp>,
    pub last_shown_at: Option<Timestamp>,
    pub viewed_at: Option<Timestamp>,
    pub dismissed: bool,
    pub dismissed_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl WeeklyReport {
    pub fn report_status(&self) -> Result<ReportStatus, CoreError> {
        self.status.parse()
    }

    /// Acknowledgement state derived from the notification columns.
    pub fn ack_state(&self) -> AckState {
        AckState::from_flags(
            self.last_shown_at.is_some() || self.notified_at.is_some(),
            self.viewed_at.is_some(),
            self.dismissed,
        )
    }

    /// When the report-ready notice went out on `channel`, if it has.
    pub fn sent_at(&self, channel: NotifyChannel) -> Option<Timestamp> {
        match channel {
            NotifyChannel::Push => self.push_sent_at,
            NotifyChannel::Email => self.email_sent_at,
        }
    }
}

/// Terminal content written when a running report settles.
#[derive(Debug, Clone, Deserialize)]
pub struct CompleteWeeklyReport {
    pub summary: Option<String>,
    pub data_summary: Option<serde_json::Value>,
    pub report: Option<serde_json::Value>,
    pub credits_charged: i64,
}

/// Everything written when a running report settles, applied in one
/// transaction by [`WeeklyReportRepo::settle`].
///
/// [`WeeklyReportRepo::settle`]: crate::repositories::WeeklyReportRepo::settle
#[derive(Debug, Clone)]
pub struct Settlement<'a> {
    pub report_id: DbId,
    pub user_id: DbId,
    /// `Ready` records a generated run, `Locked` a skipped one.
    pub status: ReportStatus,
    /// `credits_charged` is debited from the wallet when positive.
    pub content: &'a CompleteWeeklyReport,
    pub settled_at: Timestamp,
    pub next_due_at: Timestamp,
}

#[derive(Debug)]
pub enum SettleOutcome {
    Settled(WeeklyReport),
    /// The wallet no longer covers the charge. Nothing was written.
    InsufficientCredits,
    /// The report was settled elsewhere. Nothing was written.
    NotRunning,
    /// The user's schedule row is gone, so it cannot advance. Nothing was
    /// written.
    ScheduleMissing,
}
