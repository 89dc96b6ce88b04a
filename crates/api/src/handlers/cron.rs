//! Scheduler trigger.

use axum::extract::State;
use axum::Json;
use chrono::Utc;
use helfi_events::RunSummary;

use crate::error::AppResult;
use crate::middleware::scheduler::SchedulerAuth;
use crate::state::AppState;

/// POST /api/cron/weekly-health-report
///
/// Runs one scheduler pass. Per-user dispatch failures are reported in
/// `results` with a 200; only a database failure yields 500.
pub async fn weekly_health_report(
    auth: SchedulerAuth,
    State(state): State<AppState>,
) -> AppResult<Json<RunSummary>> {
    tracing::info!(caller = ?auth.caller, "Weekly report cron triggered");
    let summary = state.scheduler.run_once(Utc::now()).await?;
    Ok(Json(summary))
}
