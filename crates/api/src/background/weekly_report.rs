//! Scheduler wiring: transport selection and the optional in-process loop.

use std::sync::Arc;
use std::time::Duration;

use helfi_db::DbPool;
use helfi_events::{
    DirectDispatch, GenerationDispatch, QueueDispatch, SchedulerSettings, WeeklyReportScheduler,
};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::{scheduler_interval, ServerConfig};

/// Queue transport when a queue token is configured, otherwise direct calls
/// to this service's generation endpoint.
pub fn build_dispatcher(
    config: &ServerConfig,
) -> Result<Arc<dyn GenerationDispatch>, reqwest::Error> {
    let reports = &config.weekly_reports;
    let run_url = reports.run_url();
    let secret = config.scheduler.secret.clone();

    let dispatcher: Arc<dyn GenerationDispatch> = match &reports.queue_token {
        Some(token) => Arc::new(QueueDispatch::new(
            &reports.queue_url,
            token.clone(),
            &run_url,
            secret,
        )?),
        None => {
            if secret.is_none() {
                tracing::warn!("SCHEDULER_SECRET unset; direct dispatch will be rejected");
            }
            Arc::new(DirectDispatch::new(run_url, secret.unwrap_or_default())?)
        }
    };
    tracing::info!(transport = dispatcher.name(), "Weekly report dispatcher configured");
    Ok(dispatcher)
}

pub fn build_scheduler(
    pool: DbPool,
    config: &ServerConfig,
) -> Result<WeeklyReportScheduler, reqwest::Error> {
    let reports = &config.weekly_reports;
    let settings = SchedulerSettings {
        batch_size: reports.batch_size,
        backfill_limit: reports.backfill_limit,
        retry_cooldown: chrono::Duration::hours(reports.retry_cooldown_hours),
    };
    Ok(WeeklyReportScheduler::new(
        pool,
        build_dispatcher(config)?,
        settings,
    ))
}

/// Spawn the in-process loop if a non-zero interval is configured.
pub fn spawn_scheduler(
    scheduler: Arc<WeeklyReportScheduler>,
    config: &ServerConfig,
    cancel: CancellationToken,
) -> Option<JoinHandle<()>> {
    let secs = config
        .weekly_reports
        .scheduler_interval_secs
        .and_then(scheduler_interval)?;
    tracing::info!(interval_secs = secs, "Starting in-process weekly report scheduler");
    Some(tokio::spawn(async move {
        scheduler.run(Duration::from_secs(secs), cancel).await;
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::jwt::JwtConfig;
    use crate::config::{SchedulerAuthConfig, WeeklyReportConfig};

    fn config(queue_token: Option<&str>) -> ServerConfig {
        ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            cors_origins: vec![],
            request_timeout_secs: 30,
            shutdown_timeout_secs: 5,
            jwt: JwtConfig {
                secret: "test".to_string(),
                session_expiry_hours: 1,
            },
            scheduler: SchedulerAuthConfig {
                secret: Some("s3cret".to_string()),
                signing_keys: vec![],
                trust_cron_header: false,
            },
            weekly_reports: WeeklyReportConfig {
                queue_token: queue_token.map(str::to_string),
                ..Default::default()
            },
        }
    }

    #[test]
    fn queue_token_selects_queue_transport() {
        assert_eq!(build_dispatcher(&config(Some("t"))).unwrap().name(), "queue");
        assert_eq!(build_dispatcher(&config(None)).unwrap().name(), "direct");
    }

    #[tokio::test]
    async fn zero_interval_spawns_nothing() {
        let mut config = config(None);
        config.weekly_reports.scheduler_interval_secs = Some(0);
        let pool = sqlx::postgres::PgPoolOptions::new()
            .connect_lazy("postgres://localhost/helfi_unused")
            .unwrap();
        let scheduler = Arc::new(build_scheduler(pool, &config).unwrap());

        assert!(spawn_scheduler(scheduler, &config, CancellationToken::new()).is_none());
    }
}
