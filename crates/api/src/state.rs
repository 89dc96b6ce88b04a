use std::sync::Arc;
use std::time::Duration;

use helfi_core::cache::TtlCache;
use helfi_core::report_composer::ReportComposer;
use helfi_db::repositories::FeatureFlagRepo;
use helfi_events::{ReportDelivery, WeeklyReportScheduler};

use crate::config::ServerConfig;

/// Upper bound on cached feature flags.
const FLAG_CACHE_CAPACITY: usize = 256;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheaply cloneable: everything is behind `Arc` or is already `Clone`.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub pool: helfi_db::DbPool,
    pub config: Arc<ServerConfig>,
    /// Backfill, due scan and dispatch; shared by the cron endpoint and the
    /// in-process loop.
    pub scheduler: Arc<WeeklyReportScheduler>,
    /// Builds report bodies for the generation endpoint.
    pub composer: Arc<dyn ReportComposer>,
    /// Report-ready notices; used after generation and by the dispatch endpoint.
    pub delivery: Arc<ReportDelivery>,
    /// Feature flag lookups, keyed by flag name.
    pub flag_cache: Arc<TtlCache<String, bool>>,
}

impl AppState {
    pub fn new(
        pool: helfi_db::DbPool,
        config: Arc<ServerConfig>,
        scheduler: Arc<WeeklyReportScheduler>,
        composer: Arc<dyn ReportComposer>,
        delivery: Arc<ReportDelivery>,
    ) -> Self {
        let flag_cache = Arc::new(TtlCache::new(
            Duration::from_secs(config.weekly_reports.flag_cache_ttl_secs),
            FLAG_CACHE_CAPACITY,
        ));
        Self {
            pool,
            config,
            scheduler,
            composer,
            delivery,
            flag_cache,
        }
    }

    /// Read a feature flag through the cache.
    pub async fn flag_enabled(&self, name: &str) -> Result<bool, sqlx::Error> {
        let key = name.to_string();
        if let Some(enabled) = self.flag_cache.get(&key) {
            return Ok(enabled);
        }
        let enabled = FeatureFlagRepo::is_enabled(&self.pool, name).await?;
        self.flag_cache.insert(key, enabled);
        Ok(enabled)
    }
}
