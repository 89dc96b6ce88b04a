//! Weekly report scheduler.
//!
//! [`WeeklyReportScheduler::run_once`] is one pass: repair broken schedules,
//! scan for due users, dispatch each one. The cron endpoint calls it on
//! demand; [`WeeklyReportScheduler::run`] drives it on a fixed interval.

use std::sync::Arc;
use std::time::Duration;

use helfi_core::types::Timestamp;
use helfi_core::weekly_report::{
    DEFAULT_BACKFILL_LIMIT, DEFAULT_DUE_BATCH_SIZE, DEFAULT_RETRY_COOLDOWN_HOURS,
};
use helfi_db::repositories::WeeklyReportStateRepo;
use helfi_db::DbPool;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::delivery::{dispatch_outcome, DispatchOutcome, GenerationDispatch, GenerationJob};

/// Batch sizes and retry window for one pass.
#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    pub batch_size: i64,
    pub backfill_limit: i64,
    pub retry_cooldown: chrono::Duration,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_DUE_BATCH_SIZE,
            backfill_limit: DEFAULT_BACKFILL_LIMIT,
            retry_cooldown: chrono::Duration::hours(DEFAULT_RETRY_COOLDOWN_HOURS),
        }
    }
}

/// Result of one scheduler pass.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    /// Due users found by the scan.
    pub processed: usize,
    /// Dispatches that succeeded.
    pub scheduled: usize,
    /// Schedules repaired by the backfill.
    pub backfilled: u64,
    pub results: Vec<DispatchOutcome>,
}

pub struct WeeklyReportScheduler {
    pool: DbPool,
    dispatcher: Arc<dyn GenerationDispatch>,
    settings: SchedulerSettings,
}

impl WeeklyReportScheduler {
    pub fn new(
        pool: DbPool,
        dispatcher: Arc<dyn GenerationDispatch>,
        settings: SchedulerSettings,
    ) -> Self {
        Self {
            pool,
            dispatcher,
            settings,
        }
    }

    /// Run one pass at `now`.
    ///
    /// Only database errors fail the pass. Dispatch failures are recorded in
    /// the results and the user's due date is left untouched, so the next
    /// pass selects them again.
    pub async fn run_once(&self, now: Timestamp) -> Result<RunSummary, sqlx::Error> {
        let backfilled =
            WeeklyReportStateRepo::backfill(&self.pool, now, self.settings.backfill_limit).await?;

        let due = WeeklyReportStateRepo::list_due(
            &self.pool,
            now,
            self.settings.batch_size,
            self.settings.retry_cooldown,
        )
        .await?;

        let mut results = Vec::with_capacity(due.len());
        for state in &due {
            let job = GenerationJob {
                user_id: state.user_id,
                due_at: state.next_report_due_at,
            };
            results.push(dispatch_outcome(self.dispatcher.as_ref(), &job).await);
        }

        let scheduled = results.iter().filter(|r| r.ok).count();
        tracing::info!(
            transport = self.dispatcher.name(),
            processed = due.len(),
            scheduled,
            backfilled,
            "Weekly report scheduler pass complete"
        );

        Ok(RunSummary {
            processed: due.len(),
            scheduled,
            backfilled,
            results,
        })
    }

    /// Run passes every `period` until cancelled.
    pub async fn run(&self, period: Duration, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Weekly report scheduler cancelled");
                    break;
                }
                _ = interval.tick() => {
                    if let Err(e) = self.run_once(chrono::Utc::now()).await {
                        tracing::error!(error = %e, "Weekly report scheduler pass failed");
                    }
                }
            }
        }
    }
}
