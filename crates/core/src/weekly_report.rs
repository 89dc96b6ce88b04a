//! Weekly health report scheduling rules, report-ready notice content and
//! the notification acknowledgement state machine.
//!
//! Statuses are persisted as lowercase TEXT columns; the enums here own the
//! canonical spellings so the db and api crates never hard-code them.

use std::fmt;
use std::str::FromStr;

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::{DbId, Timestamp};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Length of one reporting period.
pub const REPORT_PERIOD_DAYS: i64 = 7;

/// Due users fetched per scheduler run.
pub const DEFAULT_DUE_BATCH_SIZE: i64 = 20;

/// States repaired per backfill pass.
pub const DEFAULT_BACKFILL_LIMIT: i64 = 50;

/// A user whose generation was attempted within this window is not re-dispatched.
pub const DEFAULT_RETRY_COOLDOWN_HOURS: i64 = 20;

/// Wallet charge for one generated report.
pub const DEFAULT_REPORT_COST_CENTS: i64 = 50;

/// Maximum number of reports returned by the list endpoint.
pub const LIST_LIMIT: i64 = 8;

/// Feature flag gating the list endpoint.
pub const FLAG_WEEKLY_REPORTS_LIST: &str = "weekly_reports_list";

/// Skip reasons reported by the generation endpoint.
pub const SKIP_NO_SCHEDULE: &str = "no_schedule";
pub const SKIP_NOT_DUE: &str = "not_due";
pub const SKIP_ALREADY_RUNNING: &str = "already_running";
pub const SKIP_INSUFFICIENT_CREDITS: &str = "insufficient_credits";

// ---------------------------------------------------------------------------
// Statuses
// ---------------------------------------------------------------------------

macro_rules! define_text_status {
    (
        $(#[$meta:meta])*
        $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident => $text:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $( $(#[$vmeta])* $variant ),+
        }

        impl $name {
            /// The value stored in the database.
            pub fn as_str(self) -> &'static str {
                match self {
                    $( $name::$variant => $text ),+
                }
            }
        }

        impl FromStr for $name {
            type Err = CoreError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $( $text => Ok($name::$variant), )+
                    other => Err(CoreError::Validation(format!(
                        "Unknown {}: '{other}'",
                        stringify!($name)
                    ))),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

define_text_status! {
    /// Outcome of the most recent scheduled run for a user.
    LastStatus {
        Pending => "pending",
        Generated => "generated",
        Failed => "failed",
        Skipped => "skipped",
    }
}

define_text_status! {
    /// Lifecycle of a single weekly report row.
    ReportStatus {
        Running => "running",
        Ready => "ready",
        /// Generated without credits to unlock it.
        Locked => "locked",
        Failed => "failed",
    }
}

impl ReportStatus {
    /// Only `running` reports may still change status.
    pub fn is_terminal(self) -> bool {
        !matches!(self, ReportStatus::Running)
    }

    /// Whether a report-ready notice may go out for this status.
    pub fn is_deliverable(self) -> bool {
        matches!(self, ReportStatus::Ready | ReportStatus::Locked)
    }
}

define_text_status! {
    /// Delivery channel for report-ready notices.
    NotifyChannel {
        Push => "push",
        Email => "email",
    }
}

// ---------------------------------------------------------------------------
// Schedule arithmetic
// ---------------------------------------------------------------------------

pub fn report_period() -> Duration {
    Duration::days(REPORT_PERIOD_DAYS)
}

/// First due date for a user who opted in at `enabled_at`.
pub fn initial_due_at(enabled_at: Timestamp) -> Timestamp {
    enabled_at + report_period()
}

/// Next due date after a generated or explicitly skipped run.
///
/// Advances by one period from the previous due date to keep a stable
/// weekly cadence. When the user is so far behind that the result would
/// still be due, the cadence restarts from `now` instead of firing again
/// on the next scheduler tick.
pub fn advance_due_at(previous: Option<Timestamp>, now: Timestamp) -> Timestamp {
    let next = previous.unwrap_or(now) + report_period();
    if next <= now {
        now + report_period()
    } else {
        next
    }
}

pub fn is_due(next_due_at: Option<Timestamp>, now: Timestamp) -> bool {
    next_due_at.is_some_and(|due| due <= now)
}

/// Inclusive date range covered by a report generated at `now`.
pub fn period_bounds(now: Timestamp) -> (NaiveDate, NaiveDate) {
    ((now - report_period()).date_naive(), now.date_naive())
}

/// Whether a wallet may opt in to weekly reports.
pub fn wallet_allows_opt_in(available_cents: i64, plan: Option<&str>) -> bool {
    available_cents > 0 || plan.is_some_and(|p| !p.trim().is_empty())
}

// ---------------------------------------------------------------------------
// Report-ready notices
// ---------------------------------------------------------------------------

/// Skip reasons reported by the dispatch endpoint.
pub const DISPATCH_SKIP_NOT_READY: &str = "report_not_ready";
pub const DISPATCH_SKIP_ALREADY_NOTIFIED: &str = "already_notified";

/// Subject line of the report-ready email.
pub const REPORT_EMAIL_SUBJECT: &str = "View your seven day health report";

/// Inbox entry kind and source for report-ready notices.
pub const INBOX_KIND_WEEKLY_REPORT: &str = "weekly_report";
pub const INBOX_SOURCE_SYSTEM: &str = "system";

/// Content of a report-ready notice, shared by every channel and the inbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportNotice {
    pub report_id: DbId,
    pub status: ReportStatus,
    pub title: String,
    pub body: String,
    /// App-relative link to the report.
    pub url: String,
}

impl ReportNotice {
    pub fn for_report(report_id: DbId, status: ReportStatus) -> Self {
        let (title, body) = if status == ReportStatus::Locked {
            (
                "Your 7-day health report is ready to unlock",
                "Unlock your report to see what is working, what to focus on next, and what to avoid.",
            )
        } else {
            (
                "Your 7-day health report is ready",
                "Open your report to see what is working, what to focus on next, and what to avoid.",
            )
        };
        Self {
            report_id,
            status,
            title: title.to_string(),
            body: body.to_string(),
            url: format!("/insights/weekly-report?id={report_id}"),
        }
    }

    /// Idempotency key for the inbox entry.
    pub fn event_key(&self) -> String {
        format!("{INBOX_KIND_WEEKLY_REPORT}:{}", self.report_id)
    }
}

// ---------------------------------------------------------------------------
// Notification acknowledgement
// ---------------------------------------------------------------------------

/// Client action posted to the notify endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotifyAction {
    Shown,
    Viewed,
    DontShow,
}

impl FromStr for NotifyAction {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "shown" => Ok(NotifyAction::Shown),
            "viewed" => Ok(NotifyAction::Viewed),
            "dont_show" => Ok(NotifyAction::DontShow),
            other => Err(CoreError::Validation(format!(
                "action must be one of shown, viewed, dont_show (got '{other}')"
            ))),
        }
    }
}

/// Acknowledgement state derived from a report's flag columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckState {
    Created,
    Shown,
    Viewed,
    Dismissed,
}

impl AckState {
    /// `dismissed` dominates, then `viewed`, then `shown`.
    pub fn from_flags(shown: bool, viewed: bool, dismissed: bool) -> Self {
        if dismissed {
            AckState::Dismissed
        } else if viewed {
            AckState::Viewed
        } else if shown {
            AckState::Shown
        } else {
            AckState::Created
        }
    }
}

/// Write to perform for an accepted action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckEffect {
    /// Stamp `last_shown_at`; `first` also stamps `notified_at`.
    MarkShown { first: bool },
    MarkViewed,
    Dismiss,
    /// The report is already at or past the requested state.
    NoOp,
}

/// Transition table for the notify endpoint.
///
/// Dismissal is terminal and `viewed` never moves back to `shown`.
pub fn ack_transition(state: AckState, action: NotifyAction) -> AckEffect {
    use AckState as S;
    use NotifyAction as A;

    match (state, action) {
        (S::Dismissed, _) => AckEffect::NoOp,
        (_, A::DontShow) => AckEffect::Dismiss,
        (S::Created, A::Shown) => AckEffect::MarkShown { first: true },
        (S::Shown, A::Shown) => AckEffect::MarkShown { first: false },
        (S::Created | S::Shown, A::Viewed) => AckEffect::MarkViewed,
        (S::Viewed, A::Shown | A::Viewed) => AckEffect::NoOp,
    }
}
