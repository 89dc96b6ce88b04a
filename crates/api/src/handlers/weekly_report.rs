//! Handlers for weekly health reports.
//!
//! Session-authenticated endpoints manage the opt-in and the notification
//! lifecycle; the generation and dispatch endpoints are called by the
//! scheduler.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;
use helfi_core::error::CoreError;
use helfi_core::types::{DbId, Timestamp};
use helfi_core::weekly_report::{
    ack_transition, initial_due_at, AckEffect, NotifyAction, FLAG_WEEKLY_REPORTS_LIST, LIST_LIMIT,
};
use helfi_db::models::weekly_report::{WeeklyReport, WeeklyReportState};
use helfi_db::repositories::{WalletRepo, WeeklyReportRepo, WeeklyReportStateRepo};
use helfi_events::DeliveryOutcome;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::generation::{Generator, RunOutcome};
use crate::middleware::auth::AuthUser;
use crate::middleware::scheduler::{SchedulerJson, INVALID_PAYLOAD};
use crate::state::AppState;

fn invalid_payload(rejection: JsonRejection) -> AppError {
    tracing::debug!(error = %rejection, "Rejected weekly report payload");
    AppError::BadRequest(INVALID_PAYLOAD.to_string())
}

// ---------------------------------------------------------------------------
// Preferences
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreferencesResponse {
    pub reports_enabled: bool,
    pub reports_enabled_at: Option<Timestamp>,
    pub next_report_due_at: Option<Timestamp>,
    pub last_status: Option<String>,
}

impl From<Option<WeeklyReportState>> for PreferencesResponse {
    fn from(state: Option<WeeklyReportState>) -> Self {
        match state {
            Some(s) => Self {
                reports_enabled: s.reports_enabled,
                reports_enabled_at: s.reports_enabled_at,
                next_report_due_at: s.next_report_due_at,
                last_status: Some(s.last_status),
            },
            None => Self {
                reports_enabled: false,
                reports_enabled_at: None,
                next_report_due_at: None,
                last_status: None,
            },
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdatePreferences {
    pub enabled: bool,
}

/// GET /api/reports/weekly/preferences
pub async fn get_preferences(
    user: AuthUser,
    State(state): State<AppState>,
) -> AppResult<Json<PreferencesResponse>> {
    let current = WeeklyReportStateRepo::find(&state.pool, user.user_id).await?;
    Ok(Json(current.into()))
}

/// POST /api/reports/weekly/preferences
///
/// Enabling requires a positive balance or an active plan; otherwise 402
/// and the stored state is left untouched.
pub async fn update_preferences(
    user: AuthUser,
    State(state): State<AppState>,
    body: Result<Json<UpdatePreferences>, JsonRejection>,
) -> AppResult<Json<PreferencesResponse>> {
    let Json(input) = body.map_err(invalid_payload)?;

    let updated = if input.enabled {
        let wallet = WalletRepo::find(&state.pool, user.user_id).await?;
        if !wallet.is_some_and(|w| w.allows_opt_in()) {
            return Err(AppError::Core(CoreError::InsufficientCredits(
                "insufficient_credits".to_string(),
            )));
        }
        let now = Utc::now();
        WeeklyReportStateRepo::enable(&state.pool, user.user_id, now, initial_due_at(now)).await?
    } else {
        WeeklyReportStateRepo::disable(&state.pool, user.user_id).await?
    };

    tracing::info!(
        user_id = user.user_id,
        enabled = updated.reports_enabled,
        next_due = ?updated.next_report_due_at,
        "Weekly report preference updated",
    );

    Ok(Json(Some(updated).into()))
}

// ---------------------------------------------------------------------------
// Notification acknowledgement
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotifyRequest {
    pub report_id: DbId,
    pub action: String,
}

#[derive(Debug, Serialize)]
pub struct NotifyResponse {
    pub report: WeeklyReport,
    pub changed: bool,
}

/// POST /api/reports/weekly/notify
///
/// Ownership is checked before any write; a foreign report reads as missing.
pub async fn notify(
    user: AuthUser,
    State(state): State<AppState>,
    body: Result<Json<NotifyRequest>, JsonRejection>,
) -> AppResult<Json<NotifyResponse>> {
    let Json(input) = body.map_err(invalid_payload)?;
    let action: NotifyAction = input.action.parse()?;

    let report = WeeklyReportRepo::find_for_user(&state.pool, input.report_id, user.user_id)
        .await?
        .ok_or(CoreError::NotFound {
            entity: "WeeklyReport",
            id: input.report_id,
        })?;

    let effect = ack_transition(report.ack_state(), action);
    if effect == AckEffect::NoOp {
        return Ok(Json(NotifyResponse {
            report,
            changed: false,
        }));
    }

    let updated =
        WeeklyReportRepo::apply_ack(&state.pool, report.id, user.user_id, effect, Utc::now())
            .await?;

    Ok(Json(match updated {
        Some(report) => {
            tracing::debug!(user_id = user.user_id, report_id = report.id, ?effect, "Report acknowledged");
            NotifyResponse {
                report,
                changed: true,
            }
        }
        // Dismissed concurrently.
        None => NotifyResponse {
            report,
            changed: false,
        },
    }))
}

// ---------------------------------------------------------------------------
// Listing
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub preview: Option<String>,
}

impl ListParams {
    fn is_preview(&self) -> bool {
        matches!(self.preview.as_deref(), Some("1") | Some("true"))
    }
}

#[derive(Debug, Serialize)]
pub struct ReportList {
    pub reports: Vec<WeeklyReport>,
}

#[derive(Debug, Serialize)]
pub struct LatestReport {
    pub report: Option<WeeklyReport>,
}

/// GET /api/reports/weekly/list[?preview=1]
///
/// Hidden behind the `weekly_reports_list` flag unless previewing.
pub async fn list_reports(
    user: AuthUser,
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> AppResult<Json<ReportList>> {
    if !params.is_preview() && !state.flag_enabled(FLAG_WEEKLY_REPORTS_LIST).await? {
        return Err(AppError::FeatureDisabled(FLAG_WEEKLY_REPORTS_LIST));
    }
    let reports = WeeklyReportRepo::list_for_user(&state.pool, user.user_id, LIST_LIMIT).await?;
    Ok(Json(ReportList { reports }))
}

/// GET /api/reports/weekly/latest
pub async fn latest_report(
    user: AuthUser,
    State(state): State<AppState>,
) -> AppResult<Json<LatestReport>> {
    let report = WeeklyReportRepo::latest_for_user(&state.pool, user.user_id).await?;
    Ok(Json(LatestReport { report }))
}

// ---------------------------------------------------------------------------
// Generation
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRequest {
    #[serde(default)]
    pub user_id: Option<DbId>,
}

/// POST /api/reports/weekly/run
///
/// Generates the due report for one user. See [`crate::generation`].
pub async fn run(
    State(state): State<AppState>,
    request: SchedulerJson<RunRequest>,
) -> AppResult<impl IntoResponse> {
    let SchedulerJson {
        caller,
        body: input,
    } = request;
    let user_id = input
        .user_id
        .ok_or_else(|| AppError::BadRequest("Missing userId".to_string()))?;

    tracing::debug!(user_id, ?caller, "Weekly report generation requested");

    let generator = Generator {
        pool: &state.pool,
        composer: state.composer.as_ref(),
        cost_cents: state.config.weekly_reports.cost_cents,
    };
    let outcome = generator.run(user_id, Utc::now()).await?;

    if let RunOutcome::Ready { report_id } | RunOutcome::Locked { report_id } = outcome {
        // A failed notice is retried through the dispatch endpoint.
        match state.delivery.deliver(user_id, report_id).await {
            Ok(delivery) => tracing::info!(user_id, report_id, ?delivery, "Report-ready notice dispatched"),
            Err(e) => tracing::warn!(user_id, report_id, error = %e, "Report-ready notice failed"),
        }
    }

    Ok(Json(outcome))
}

// ---------------------------------------------------------------------------
// Report-ready notices
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchRequest {
    #[serde(default)]
    pub user_id: Option<DbId>,
    #[serde(default)]
    pub report_id: Option<DbId>,
}

/// POST /api/reports/weekly/dispatch
///
/// Sends the report-ready notice on every channel that has not delivered
/// yet. Safe to repeat: delivered channels are never resent and the inbox
/// entry is keyed by report.
pub async fn dispatch(
    State(state): State<AppState>,
    request: SchedulerJson<DispatchRequest>,
) -> AppResult<Json<DeliveryOutcome>> {
    let SchedulerJson {
        caller,
        body: input,
    } = request;
    let (Some(user_id), Some(report_id)) = (input.user_id, input.report_id) else {
        return Err(AppError::BadRequest(INVALID_PAYLOAD.to_string()));
    };

    let outcome = state.delivery.deliver(user_id, report_id).await?;
    tracing::info!(user_id, report_id, ?caller, ?outcome, "Report-ready dispatch handled");
    Ok(Json(outcome))
}
