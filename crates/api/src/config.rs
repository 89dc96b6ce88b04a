use std::str::FromStr;

use helfi_core::weekly_report::{
    DEFAULT_BACKFILL_LIMIT, DEFAULT_DUE_BATCH_SIZE, DEFAULT_REPORT_COST_CENTS,
    DEFAULT_RETRY_COOLDOWN_HOURS,
};
use helfi_events::delivery::queue::DEFAULT_QUEUE_URL;

use crate::auth::jwt::JwtConfig;

/// Default feature-flag cache lifetime in seconds.
const DEFAULT_FLAG_CACHE_TTL_SECS: u64 = 60;

/// Server configuration loaded from environment variables.
///
/// All fields except `JWT_SECRET` have defaults suitable for local
/// development. In production, override via environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// How long background tasks get to stop after the server drains (default: `30`).
    pub shutdown_timeout_secs: u64,
    /// Session token configuration.
    pub jwt: JwtConfig,
    /// Machine-caller credentials for the cron and generation endpoints.
    pub scheduler: SchedulerAuthConfig,
    /// Weekly report pipeline tuning.
    pub weekly_reports: WeeklyReportConfig,
}

#[derive(Debug, Clone, Default)]
pub struct SchedulerAuthConfig {
    /// Shared bearer secret (`SCHEDULER_SECRET`).
    pub secret: Option<String>,
    /// Queue signing keys; current first, then next (rotation).
    pub signing_keys: Vec<String>,
    /// Accept the platform cron header as proof of origin. Only safe where
    /// the platform strips that header from external traffic.
    pub trust_cron_header: bool,
}

#[derive(Debug, Clone)]
pub struct WeeklyReportConfig {
    /// Public origin of this service, used to build the generation URL.
    pub public_base_url: String,
    pub queue_url: String,
    /// When set, generation is dispatched through the queue.
    pub queue_token: Option<String>,
    pub batch_size: i64,
    pub backfill_limit: i64,
    pub retry_cooldown_hours: i64,
    pub cost_cents: i64,
    /// In-process scheduler period. `None` leaves scheduling to the cron endpoint.
    pub scheduler_interval_secs: Option<u64>,
    pub flag_cache_ttl_secs: u64,
}

impl WeeklyReportConfig {
    /// Absolute URL of the generation endpoint.
    pub fn run_url(&self) -> String {
        format!("{}/api/reports/weekly/run", self.public_base_url)
    }
}

impl Default for WeeklyReportConfig {
    fn default() -> Self {
        Self {
            public_base_url: "http://localhost:3000".to_string(),
            queue_url: DEFAULT_QUEUE_URL.to_string(),
            queue_token: None,
            batch_size: DEFAULT_DUE_BATCH_SIZE,
            backfill_limit: DEFAULT_BACKFILL_LIMIT,
            retry_cooldown_hours: DEFAULT_RETRY_COOLDOWN_HOURS,
            cost_cents: DEFAULT_REPORT_COST_CENTS,
            scheduler_interval_secs: None,
            flag_cache_ttl_secs: DEFAULT_FLAG_CACHE_TTL_SECS,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                                 | Default                     |
    /// |-----------------------------------------|-----------------------------|
    /// | `HOST`                                  | `0.0.0.0`                   |
    /// | `PORT`                                  | `3000`                      |
    /// | `CORS_ORIGINS`                          | `http://localhost:5173`     |
    /// | `REQUEST_TIMEOUT_SECS`                  | `30`                        |
    /// | `SHUTDOWN_TIMEOUT_SECS`                 | `30`                        |
    /// | `SCHEDULER_SECRET`                      | unset                       |
    /// | `QSTASH_TOKEN`                          | unset (direct dispatch)     |
    /// | `QSTASH_URL`                            | `https://qstash.upstash.io` |
    /// | `QSTASH_CURRENT_SIGNING_KEY`            | unset                       |
    /// | `QSTASH_NEXT_SIGNING_KEY`               | unset                       |
    /// | `SCHEDULER_TRUST_CRON_HEADER`           | `true` if `VERCEL` is set   |
    /// | `PUBLIC_BASE_URL`                       | `http://localhost:3000`     |
    /// | `WEEKLY_REPORT_BATCH_SIZE`              | `20`                        |
    /// | `WEEKLY_REPORT_BACKFILL_LIMIT`          | `50`                        |
    /// | `WEEKLY_REPORT_RETRY_COOLDOWN_HOURS`    | `20`                        |
    /// | `WEEKLY_REPORT_COST_CENTS`              | `50`                        |
    /// | `WEEKLY_REPORT_SCHEDULER_INTERVAL_SECS` | unset or `0` (disabled)     |
    /// | `FEATURE_FLAG_CACHE_TTL_SECS`           | `60`                        |
    ///
    /// See [`JwtConfig::from_env`] for the session token variables.
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let port: u16 = env_parse("PORT", 3000);

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let request_timeout_secs: u64 = env_parse("REQUEST_TIMEOUT_SECS", 30);
        let shutdown_timeout_secs: u64 = env_parse("SHUTDOWN_TIMEOUT_SECS", 30);

        let scheduler = SchedulerAuthConfig {
            secret: env_opt("SCHEDULER_SECRET"),
            signing_keys: ["QSTASH_CURRENT_SIGNING_KEY", "QSTASH_NEXT_SIGNING_KEY"]
                .into_iter()
                .filter_map(env_opt)
                .collect(),
            trust_cron_header: env_parse(
                "SCHEDULER_TRUST_CRON_HEADER",
                env_opt("VERCEL").is_some(),
            ),
        };

        let defaults = WeeklyReportConfig::default();
        let public_base_url = normalize_base_url(
            &env_opt("PUBLIC_BASE_URL").unwrap_or(defaults.public_base_url),
        );
        let weekly_reports = WeeklyReportConfig {
            public_base_url,
            queue_url: env_opt("QSTASH_URL").unwrap_or(defaults.queue_url),
            queue_token: env_opt("QSTASH_TOKEN"),
            batch_size: env_parse("WEEKLY_REPORT_BATCH_SIZE", defaults.batch_size),
            backfill_limit: env_parse("WEEKLY_REPORT_BACKFILL_LIMIT", defaults.backfill_limit),
            retry_cooldown_hours: env_parse(
                "WEEKLY_REPORT_RETRY_COOLDOWN_HOURS",
                defaults.retry_cooldown_hours,
            ),
            cost_cents: env_parse("WEEKLY_REPORT_COST_CENTS", defaults.cost_cents),
            scheduler_interval_secs: scheduler_interval(env_parse(
                "WEEKLY_REPORT_SCHEDULER_INTERVAL_SECS",
                0,
            )),
            flag_cache_ttl_secs: env_parse(
                "FEATURE_FLAG_CACHE_TTL_SECS",
                defaults.flag_cache_ttl_secs,
            ),
        };

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            shutdown_timeout_secs,
            jwt: JwtConfig::from_env(),
            scheduler,
            weekly_reports,
        }
    }
}

/// Non-empty value of `name`, if set.
fn env_opt(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Parse `name` or fall back to `default`. Panics on a malformed value so
/// misconfiguration fails at startup.
fn env_parse<T>(name: &str, default: T) -> T
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env_opt(name) {
        Some(raw) => raw
            .parse()
            .unwrap_or_else(|e| panic!("{name} must be a valid value ('{raw}'): {e}")),
        None => default,
    }
}

/// In-process scheduler period. Zero disables the loop, since a zero-length
/// tick interval is invalid.
pub fn scheduler_interval(secs: u64) -> Option<u64> {
    (secs > 0).then_some(secs)
}

/// Ensure a scheme and strip trailing slashes.
pub fn normalize_base_url(raw: &str) -> String {
    let trimmed = raw.trim();
    let with_scheme = if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    };
    with_scheme.trim_end_matches('/').to_string()
}
