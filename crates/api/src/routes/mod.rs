pub mod cron;
pub mod health;
pub mod reports;

use axum::Router;

use crate::state::AppState;

/// Build the `/api` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /reports/weekly/preferences                       get, update (session)
/// /reports/weekly/notify                            acknowledge (session)
/// /reports/weekly/list                              8 most recent (session, flagged)
/// /reports/weekly/latest                            most recent (session)
/// /reports/weekly/run                               generate one (scheduler, queue)
///
/// /cron/weekly-health-report                        scheduler pass (cron, secret)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/reports/weekly", reports::router())
        .nest("/cron", cron::router())
}
