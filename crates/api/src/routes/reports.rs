//! Weekly report routes mounted at `/reports/weekly`.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::weekly_report;
use crate::state::AppState;

/// ```text
/// GET  /preferences  -> get_preferences
/// POST /preferences  -> update_preferences
/// POST /notify       -> notify
/// GET  /list         -> list_reports
/// GET  /latest       -> latest_report
/// POST /run          -> run (scheduler only)
/// POST /dispatch     -> dispatch (scheduler only)
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/preferences",
            get(weekly_report::get_preferences).post(weekly_report::update_preferences),
        )
        .route("/notify", post(weekly_report::notify))
        .route("/list", get(weekly_report::list_reports))
        .route("/latest", get(weekly_report::latest_report))
        .route("/run", post(weekly_report::run))
        .route("/dispatch", post(weekly_report::dispatch))
}
