use axum::routing::post;
use axum::Router;

use crate::handlers::cron;
use crate::state::AppState;

/// Scheduler triggers mounted at `/cron`.
///
/// ```text
/// POST /weekly-health-report  -> weekly_health_report
/// ```
pub fn router() -> Router<AppState> {
    Router::new().route("/weekly-health-report", post(cron::weekly_health_report))
}
