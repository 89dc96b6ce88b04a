//! Weekly report repository: running-period uniqueness, settlement,
//! ownership scoping, delivery stamps and acknowledgement writes.

use assert_matches::assert_matches;
use chrono::{NaiveDate, TimeZone, Utc};
use helfi_core::types::{DbId, Timestamp};
use helfi_core::weekly_report::{AckEffect, AckState, NotifyChannel, ReportStatus};
use helfi_db::models::weekly_report::{CompleteWeeklyReport, SettleOutcome, Settlement};
use helfi_db::repositories::weekly_report_repo::RUNNING_PERIOD_CONSTRAINT;
use helfi_db::repositories::{
    FeatureFlagRepo, UserRepo, WalletRepo, WeeklyReportRepo, WeeklyReportStateRepo,
};
use sqlx::PgPool;

fn date(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 3, day).unwrap()
}

fn ts(day: u32) -> Timestamp {
    Utc.with_ymd_and_hms(2026, 3, day, 12, 0, 0).unwrap()
}

async fn new_user(pool: &PgPool, email: &str) -> DbId {
    UserRepo::create(pool, email).await.unwrap().id
}

fn content(summary: &str, cents: i64) -> CompleteWeeklyReport {
    CompleteWeeklyReport {
        summary: Some(summary.to_string()),
        data_summary: Some(serde_json::json!({ "coverage": {} })),
        report: Some(serde_json::json!({ "sections": {} })),
        credits_charged: cents,
    }
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_second_running_report_for_period_conflicts(pool: PgPool) {
    let user = new_user(&pool, "a@example.com").await;
    WeeklyReportRepo::create_running(&pool, user, date(1), date(8)).await.unwrap();

    let err = WeeklyReportRepo::create_running(&pool, user, date(1), date(8))
        .await
        .unwrap_err();
    assert_matches!(
        &err,
        sqlx::Error::Database(db) if db.constraint() == Some(RUNNING_PERIOD_CONSTRAINT)
    );
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_settled_report_frees_the_period(pool: PgPool) {
    let user = new_user(&pool, "a@example.com").await;
    let first = WeeklyReportRepo::create_running(&pool, user, date(1), date(8)).await.unwrap();
    WeeklyReportRepo::mark_failed(&pool, first.id, "boom").await.unwrap();

    let retry = WeeklyReportRepo::create_running(&pool, user, date(1), date(8)).await;
    assert!(retry.is_ok(), "failed report must not block a retry");
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_complete_only_settles_running_reports(pool: PgPool) {
    let user = new_user(&pool, "a@example.com").await;
    let report = WeeklyReportRepo::create_running(&pool, user, date(1), date(8)).await.unwrap();

    let ready = WeeklyReportRepo::complete(&pool, report.id, ReportStatus::Ready, &content("ok", 50), ts(8))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(ready.report_status().unwrap(), ReportStatus::Ready);
    assert_eq!(ready.credits_charged, 50);
    assert_eq!(ready.ready_at, Some(ts(8)));

    let again = WeeklyReportRepo::complete(&pool, report.id, ReportStatus::Locked, &content("x", 0), ts(9))
        .await
        .unwrap();
    assert!(again.is_none(), "terminal report must not change status");
}

fn settlement(report_id: DbId, user_id: DbId, status: ReportStatus, content: &CompleteWeeklyReport) -> Settlement<'_> {
    Settlement {
        report_id,
        user_id,
        status,
        content,
        settled_at: ts(8),
        next_due_at: ts(15),
    }
}

/// User with a funded wallet, an enabled schedule and a running report.
async fn running_setup(pool: &PgPool, cents: i64) -> (DbId, DbId) {
    let user = new_user(pool, "a@example.com").await;
    WalletRepo::upsert(pool, user, cents, None).await.unwrap();
    WeeklyReportStateRepo::enable(pool, user, ts(1), ts(8)).await.unwrap();
    let report = WeeklyReportRepo::create_running(pool, user, date(1), date(8)).await.unwrap();
    (user, report.id)
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_settle_charges_completes_and_advances(pool: PgPool) {
    let (user, report) = running_setup(&pool, 500).await;
    let body = content("ok", 50);

    let outcome = WeeklyReportRepo::settle(&pool, &settlement(report, user, ReportStatus::Ready, &body))
        .await
        .unwrap();

    assert_matches!(outcome, SettleOutcome::Settled(r) if r.status == "ready" && r.credits_charged == 50);
    let wallet = WalletRepo::find(&pool, user).await.unwrap().unwrap();
    assert_eq!(wallet.available_cents, 450);
    let state = WeeklyReportStateRepo::find(&pool, user).await.unwrap().unwrap();
    assert_eq!(state.last_status, "generated");
    assert_eq!(state.next_report_due_at, Some(ts(15)));
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_settle_rolls_back_charge_when_schedule_cannot_advance(pool: PgPool) {
    let (user, report) = running_setup(&pool, 500).await;
    sqlx::query("DELETE FROM weekly_report_states WHERE user_id = $1")
        .bind(user)
        .execute(&pool)
        .await
        .unwrap();
    let body = content("ok", 50);

    let outcome = WeeklyReportRepo::settle(&pool, &settlement(report, user, ReportStatus::Ready, &body))
        .await
        .unwrap();

    assert_matches!(outcome, SettleOutcome::ScheduleMissing);
    let wallet = WalletRepo::find(&pool, user).await.unwrap().unwrap();
    assert_eq!(wallet.available_cents, 500, "charge must roll back");
    let stored = WeeklyReportRepo::find_by_id(&pool, report).await.unwrap().unwrap();
    assert_eq!(stored.status, "running");
    assert_eq!(stored.credits_charged, 0);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_settle_short_wallet_writes_nothing(pool: PgPool) {
    let (user, report) = running_setup(&pool, 20).await;
    let body = content("ok", 50);

    let outcome = WeeklyReportRepo::settle(&pool, &settlement(report, user, ReportStatus::Ready, &body))
        .await
        .unwrap();

    assert_matches!(outcome, SettleOutcome::InsufficientCredits);
    let stored = WeeklyReportRepo::find_by_id(&pool, report).await.unwrap().unwrap();
    assert_eq!(stored.status, "running");
    let state = WeeklyReportStateRepo::find(&pool, user).await.unwrap().unwrap();
    assert_eq!(state.next_report_due_at, Some(ts(8)));
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_settle_of_finished_report_leaves_wallet_alone(pool: PgPool) {
    let (user, report) = running_setup(&pool, 500).await;
    WeeklyReportRepo::mark_failed(&pool, report, "boom").await.unwrap();
    let body = content("ok", 50);

    let outcome = WeeklyReportRepo::settle(&pool, &settlement(report, user, ReportStatus::Ready, &body))
        .await
        .unwrap();

    assert_matches!(outcome, SettleOutcome::NotRunning);
    let wallet = WalletRepo::find(&pool, user).await.unwrap().unwrap();
    assert_eq!(wallet.available_cents, 500);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_locked_settlement_skips_the_period(pool: PgPool) {
    let (user, report) = running_setup(&pool, 0).await;
    let body = content("locked", 0);

    let outcome = WeeklyReportRepo::settle(&pool, &settlement(report, user, ReportStatus::Locked, &body))
        .await
        .unwrap();

    assert_matches!(outcome, SettleOutcome::Settled(r) if r.status == "locked");
    let state = WeeklyReportStateRepo::find(&pool, user).await.unwrap().unwrap();
    assert_eq!(state.last_status, "skipped");
    assert_eq!(state.next_report_due_at, Some(ts(15)));
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_channel_stamp_keeps_first_delivery(pool: PgPool) {
    let user = new_user(&pool, "a@example.com").await;
    let report = WeeklyReportRepo::create_running(&pool, user, date(1), date(8)).await.unwrap();

    WeeklyReportRepo::mark_channel_sent(&pool, report.id, NotifyChannel::Email, ts(8)).await.unwrap();
    WeeklyReportRepo::mark_channel_sent(&pool, report.id, NotifyChannel::Email, ts(9)).await.unwrap();

    let stored = WeeklyReportRepo::find_by_id(&pool, report.id).await.unwrap().unwrap();
    assert_eq!(stored.sent_at(NotifyChannel::Email), Some(ts(8)));
    assert_eq!(stored.sent_at(NotifyChannel::Push), None);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_mark_failed_records_error(pool: PgPool) {
    let user = new_user(&pool, "a@example.com").await;
    let report = WeeklyReportRepo::create_running(&pool, user, date(1), date(8)).await.unwrap();
    WeeklyReportRepo::mark_failed(&pool, report.id, "composer exploded").await.unwrap();

    let found = WeeklyReportRepo::find_for_user(&pool, report.id, user).await.unwrap().unwrap();
    assert_eq!(found.report_status().unwrap(), ReportStatus::Failed);
    assert_eq!(found.error.as_deref(), Some("composer exploded"));
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_find_is_scoped_to_owner(pool: PgPool) {
    let owner = new_user(&pool, "owner@example.com").await;
    let other = new_user(&pool, "other@example.com").await;
    let report = WeeklyReportRepo::create_running(&pool, owner, date(1), date(8)).await.unwrap();

    assert!(WeeklyReportRepo::find_for_user(&pool, report.id, other).await.unwrap().is_none());
    assert!(WeeklyReportRepo::find_for_user(&pool, report.id, owner).await.unwrap().is_some());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_list_is_newest_first_and_limited(pool: PgPool) {
    let user = new_user(&pool, "a@example.com").await;
    let mut ids = Vec::new();
    for week in 0..10u32 {
        let r = WeeklyReportRepo::create_running(&pool, user, date(1 + week), date(2 + week))
            .await
            .unwrap();
        ids.push(r.id);
    }

    let listed = WeeklyReportRepo::list_for_user(&pool, user, 8).await.unwrap();
    assert_eq!(listed.len(), 8);
    assert_eq!(listed[0].id, *ids.last().unwrap());

    let latest = WeeklyReportRepo::latest_for_user(&pool, user).await.unwrap().unwrap();
    assert_eq!(latest.id, listed[0].id);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_latest_ready_summary_ignores_other_statuses(pool: PgPool) {
    let user = new_user(&pool, "a@example.com").await;
    assert!(WeeklyReportRepo::latest_ready_summary(&pool, user).await.unwrap().is_none());

    let ready = WeeklyReportRepo::create_running(&pool, user, date(1), date(8)).await.unwrap();
    WeeklyReportRepo::complete(&pool, ready.id, ReportStatus::Ready, &content("good week", 50), ts(8))
        .await
        .unwrap();
    let failed = WeeklyReportRepo::create_running(&pool, user, date(8), date(15)).await.unwrap();
    WeeklyReportRepo::mark_failed(&pool, failed.id, "boom").await.unwrap();

    let summary = WeeklyReportRepo::latest_ready_summary(&pool, user).await.unwrap();
    assert_eq!(summary.as_deref(), Some("good week"));
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_ack_writes_follow_effects(pool: PgPool) {
    let user = new_user(&pool, "a@example.com").await;
    let report = WeeklyReportRepo::create_running(&pool, user, date(1), date(8)).await.unwrap();
    assert_eq!(report.ack_state(), AckState::Created);

    let shown = WeeklyReportRepo::apply_ack(&pool, report.id, user, AckEffect::MarkShown { first: true }, ts(9))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(shown.notified_at, Some(ts(9)));
    assert_eq!(shown.ack_state(), AckState::Shown);

    let reshown = WeeklyReportRepo::apply_ack(&pool, report.id, user, AckEffect::MarkShown { first: false }, ts(10))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reshown.notified_at, Some(ts(9)));
    assert_eq!(reshown.last_shown_at, Some(ts(10)));

    let dismissed = WeeklyReportRepo::apply_ack(&pool, report.id, user, AckEffect::Dismiss, ts(11))
        .await
        .unwrap()
        .unwrap();
    assert!(dismissed.dismissed);
    assert_eq!(dismissed.ack_state(), AckState::Dismissed);

    let after = WeeklyReportRepo::apply_ack(&pool, report.id, user, AckEffect::MarkViewed, ts(12))
        .await
        .unwrap();
    assert!(after.is_none(), "dismissed report must not be written");
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_ack_ignores_foreign_report(pool: PgPool) {
    let owner = new_user(&pool, "owner@example.com").await;
    let other = new_user(&pool, "other@example.com").await;
    let report = WeeklyReportRepo::create_running(&pool, owner, date(1), date(8)).await.unwrap();

    let written = WeeklyReportRepo::apply_ack(&pool, report.id, other, AckEffect::Dismiss, ts(9))
        .await
        .unwrap();
    assert!(written.is_none());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_wallet_charge_is_guarded_by_balance(pool: PgPool) {
    let user = new_user(&pool, "a@example.com").await;
    assert!(!WalletRepo::try_charge(&pool, user, 50).await.unwrap(), "no wallet, no charge");

    WalletRepo::upsert(&pool, user, 80, None).await.unwrap();
    assert!(WalletRepo::try_charge(&pool, user, 50).await.unwrap());
    assert!(!WalletRepo::try_charge(&pool, user, 50).await.unwrap());

    let wallet = WalletRepo::find(&pool, user).await.unwrap().unwrap();
    assert_eq!(wallet.available_cents, 30);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_wallet_opt_in_rules(pool: PgPool) {
    let user = new_user(&pool, "a@example.com").await;
    let empty = WalletRepo::upsert(&pool, user, 0, None).await.unwrap();
    assert!(!empty.allows_opt_in());

    let planned = WalletRepo::upsert(&pool, user, 0, Some("premium")).await.unwrap();
    assert!(planned.allows_opt_in());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_unknown_flag_reads_disabled(pool: PgPool) {
    assert!(!FeatureFlagRepo::is_enabled(&pool, "weekly_reports_list").await.unwrap());
    FeatureFlagRepo::set(&pool, "weekly_reports_list", true).await.unwrap();
    assert!(FeatureFlagRepo::is_enabled(&pool, "weekly_reports_list").await.unwrap());
}
