//! Schedule state repository against a real database: opt-in, due scan,
//! backfill and run outcomes.

use chrono::{Duration, TimeZone, Utc};
use helfi_core::types::{DbId, Timestamp};
use helfi_core::weekly_report::{initial_due_at, LastStatus};
use helfi_db::repositories::{UserRepo, WeeklyReportStateRepo};
use sqlx::PgPool;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn ts(day: u32) -> Timestamp {
    Utc.with_ymd_and_hms(2026, 3, day, 12, 0, 0).unwrap()
}

async fn new_user(pool: &PgPool, email: &str) -> DbId {
    UserRepo::create(pool, email).await.unwrap().id
}

fn cooldown() -> Duration {
    Duration::hours(20)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_health_check(pool: PgPool) {
    helfi_db::health_check(&pool).await.unwrap();
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_enable_schedules_first_report(pool: PgPool) {
    let user = new_user(&pool, "a@example.com").await;
    let state = WeeklyReportStateRepo::enable(&pool, user, ts(1), initial_due_at(ts(1)))
        .await
        .unwrap();

    assert!(state.reports_enabled);
    assert_eq!(state.reports_enabled_at, Some(ts(1)));
    assert_eq!(state.next_report_due_at, Some(ts(8)));
    assert_eq!(state.status().unwrap(), LastStatus::Pending);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_reenable_keeps_existing_schedule(pool: PgPool) {
    let user = new_user(&pool, "a@example.com").await;
    WeeklyReportStateRepo::enable(&pool, user, ts(1), ts(8)).await.unwrap();
    let again = WeeklyReportStateRepo::enable(&pool, user, ts(3), ts(10)).await.unwrap();

    assert_eq!(again.reports_enabled_at, Some(ts(1)));
    assert_eq!(again.next_report_due_at, Some(ts(8)));
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_enable_after_disable_restarts_schedule(pool: PgPool) {
    let user = new_user(&pool, "a@example.com").await;
    WeeklyReportStateRepo::enable(&pool, user, ts(1), ts(8)).await.unwrap();
    let off = WeeklyReportStateRepo::disable(&pool, user).await.unwrap();
    assert!(!off.reports_enabled);

    let on = WeeklyReportStateRepo::enable(&pool, user, ts(20), ts(27)).await.unwrap();
    assert_eq!(on.reports_enabled_at, Some(ts(20)));
    assert_eq!(on.next_report_due_at, Some(ts(27)));
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_list_due_excludes_disabled_and_future(pool: PgPool) {
    let due = new_user(&pool, "due@example.com").await;
    let disabled = new_user(&pool, "off@example.com").await;
    let future = new_user(&pool, "later@example.com").await;

    WeeklyReportStateRepo::enable(&pool, due, ts(1), ts(8)).await.unwrap();
    WeeklyReportStateRepo::enable(&pool, disabled, ts(1), ts(8)).await.unwrap();
    WeeklyReportStateRepo::disable(&pool, disabled).await.unwrap();
    WeeklyReportStateRepo::enable(&pool, future, ts(5), ts(12)).await.unwrap();

    let rows = WeeklyReportStateRepo::list_due(&pool, ts(9), 20, cooldown())
        .await
        .unwrap();
    let ids: Vec<DbId> = rows.iter().map(|r| r.user_id).collect();
    assert_eq!(ids, vec![due]);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_list_due_orders_oldest_first_and_limits(pool: PgPool) {
    let late = new_user(&pool, "late@example.com").await;
    let early = new_user(&pool, "early@example.com").await;
    let middle = new_user(&pool, "middle@example.com").await;

    WeeklyReportStateRepo::enable(&pool, late, ts(3), ts(10)).await.unwrap();
    WeeklyReportStateRepo::enable(&pool, early, ts(1), ts(8)).await.unwrap();
    WeeklyReportStateRepo::enable(&pool, middle, ts(2), ts(9)).await.unwrap();

    let rows = WeeklyReportStateRepo::list_due(&pool, ts(15), 2, cooldown())
        .await
        .unwrap();
    let ids: Vec<DbId> = rows.iter().map(|r| r.user_id).collect();
    assert_eq!(ids, vec![early, middle]);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_list_due_skips_recent_attempts(pool: PgPool) {
    let user = new_user(&pool, "a@example.com").await;
    WeeklyReportStateRepo::enable(&pool, user, ts(1), ts(8)).await.unwrap();
    WeeklyReportStateRepo::mark_attempt(&pool, user, ts(9)).await.unwrap();

    let now = ts(9) + Duration::hours(2);
    let rows = WeeklyReportStateRepo::list_due(&pool, now, 20, cooldown())
        .await
        .unwrap();
    assert!(rows.is_empty(), "attempt inside cooldown should be skipped");

    let later = ts(10) + Duration::hours(1);
    let rows = WeeklyReportStateRepo::list_due(&pool, later, 20, cooldown())
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_backfill_repairs_missing_and_invalid_dates(pool: PgPool) {
    let missing = new_user(&pool, "missing@example.com").await;
    let invalid = new_user(&pool, "invalid@example.com").await;
    let healthy = new_user(&pool, "healthy@example.com").await;

    sqlx::query(
        "INSERT INTO weekly_report_states (user_id, reports_enabled, reports_enabled_at, next_report_due_at) \
         VALUES ($1, true, NULL, NULL), ($2, true, $4, $5), ($3, true, $4, $6)",
    )
    .bind(missing)
    .bind(invalid)
    .bind(healthy)
    .bind(ts(5))
    .bind(ts(2))
    .bind(ts(12))
    .execute(&pool)
    .await
    .unwrap();

    let updated = WeeklyReportStateRepo::backfill(&pool, ts(10), 50).await.unwrap();
    assert_eq!(updated, 2);

    let missing_state = WeeklyReportStateRepo::find(&pool, missing).await.unwrap().unwrap();
    assert_eq!(missing_state.reports_enabled_at, Some(ts(10)));
    assert_eq!(missing_state.next_report_due_at, Some(ts(17)));

    let invalid_state = WeeklyReportStateRepo::find(&pool, invalid).await.unwrap().unwrap();
    assert_eq!(invalid_state.next_report_due_at, Some(ts(12)));

    let healthy_state = WeeklyReportStateRepo::find(&pool, healthy).await.unwrap().unwrap();
    assert_eq!(healthy_state.next_report_due_at, Some(ts(12)));
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_backfill_is_idempotent(pool: PgPool) {
    let user = new_user(&pool, "a@example.com").await;
    sqlx::query("INSERT INTO weekly_report_states (user_id, reports_enabled) VALUES ($1, true)")
        .bind(user)
        .execute(&pool)
        .await
        .unwrap();

    assert_eq!(WeeklyReportStateRepo::backfill(&pool, ts(10), 50).await.unwrap(), 1);
    let first = WeeklyReportStateRepo::find(&pool, user).await.unwrap().unwrap();

    assert_eq!(WeeklyReportStateRepo::backfill(&pool, ts(11), 50).await.unwrap(), 0);
    let second = WeeklyReportStateRepo::find(&pool, user).await.unwrap().unwrap();
    assert_eq!(first.next_report_due_at, second.next_report_due_at);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_run_outcomes_update_status(pool: PgPool) {
    let user = new_user(&pool, "a@example.com").await;
    WeeklyReportStateRepo::enable(&pool, user, ts(1), ts(8)).await.unwrap();

    WeeklyReportStateRepo::mark_attempt(&pool, user, ts(8)).await.unwrap();
    WeeklyReportStateRepo::mark_failed(&pool, user).await.unwrap();
    let failed = WeeklyReportStateRepo::find(&pool, user).await.unwrap().unwrap();
    assert_eq!(failed.status().unwrap(), LastStatus::Failed);
    assert_eq!(failed.next_report_due_at, Some(ts(8)), "failure must not advance");
    assert_eq!(failed.last_attempt_at, Some(ts(8)));

    WeeklyReportStateRepo::mark_generated(&pool, user, ts(9), ts(15)).await.unwrap();
    let generated = WeeklyReportStateRepo::find(&pool, user).await.unwrap().unwrap();
    assert_eq!(generated.status().unwrap(), LastStatus::Generated);
    assert_eq!(generated.last_report_at, Some(ts(9)));
    assert_eq!(generated.next_report_due_at, Some(ts(15)));

    WeeklyReportStateRepo::mark_skipped(&pool, user, ts(22)).await.unwrap();
    let skipped = WeeklyReportStateRepo::find(&pool, user).await.unwrap().unwrap();
    assert_eq!(skipped.status().unwrap(), LastStatus::Skipped);
    assert_eq!(skipped.next_report_due_at, Some(ts(22)));
}
