#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, Response};
use axum::Router;
use helfi_api::auth::jwt::{generate_session_token, JwtConfig};
use helfi_api::auth::scheduler::{body_digest, QUEUE_ISSUER};
use helfi_api::config::{SchedulerAuthConfig, ServerConfig, WeeklyReportConfig};
use helfi_api::router::build_app_router;
use helfi_api::state::AppState;
use helfi_core::report_composer::BaselineComposer;
use helfi_core::types::DbId;
use helfi_db::repositories::{UserRepo, WalletRepo};
use helfi_events::{DirectDispatch, ReportDelivery, SchedulerSettings, WeeklyReportScheduler};
use http_body_util::BodyExt;
use sqlx::PgPool;
use tower::ServiceExt;

pub const SCHEDULER_SECRET: &str = "test-scheduler-secret";

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 30,
        jwt: JwtConfig {
            secret: "test-jwt-secret".to_string(),
            session_expiry_hours: 1,
        },
        scheduler: SchedulerAuthConfig {
            secret: Some(SCHEDULER_SECRET.to_string()),
            signing_keys: vec![],
            trust_cron_header: true,
        },
        weekly_reports: WeeklyReportConfig::default(),
    }
}

/// Full application router over `pool`, with the production middleware
/// stack. The scheduler dispatches directly to a closed local port, so
/// every dispatch reports `request_error`. Notices go to the log.
pub fn build_test_app(pool: PgPool) -> Router {
    let delivery = ReportDelivery::logging(pool.clone());
    build_app_with(pool, test_config(), delivery)
}

/// Like [`build_test_app`] with a custom config and notice delivery.
pub fn build_app_with(pool: PgPool, config: ServerConfig, delivery: ReportDelivery) -> Router {
    let dispatcher =
        DirectDispatch::new("http://127.0.0.1:9/api/reports/weekly/run", SCHEDULER_SECRET)
            .unwrap();
    let scheduler = WeeklyReportScheduler::new(
        pool.clone(),
        Arc::new(dispatcher),
        SchedulerSettings::default(),
    );
    let state = AppState::new(
        pool,
        Arc::new(config.clone()),
        Arc::new(scheduler),
        Arc::new(BaselineComposer),
        Arc::new(delivery),
    );
    build_app_router(state, &config)
}

/// Session token for `user_id`, signed with the test secret.
pub fn session_token(user_id: DbId) -> String {
    generate_session_token(user_id, "user@example.com", &test_config().jwt).unwrap()
}

/// Queue delivery signature for `body` posted to `url`.
pub fn queue_signature(key: &str, url: &str, body: &str) -> String {
    let now = chrono::Utc::now().timestamp();
    let claims = serde_json::json!({
        "iss": QUEUE_ISSUER,
        "sub": url,
        "exp": now + 300,
        "nbf": now - 10,
        "body": body_digest(body.as_bytes()),
    });
    jsonwebtoken::encode(
        &jsonwebtoken::Header::default(),
        &claims,
        &jsonwebtoken::EncodingKey::from_secret(key.as_bytes()),
    )
    .unwrap()
}

/// Create a user with the given wallet balance and return its id.
pub async fn user_with_balance(pool: &PgPool, email: &str, cents: i64) -> DbId {
    let user = UserRepo::create(pool, email).await.unwrap();
    WalletRepo::upsert(pool, user.id, cents, None).await.unwrap();
    user.id
}

// ---------------------------------------------------------------------------
// Request helpers
// ---------------------------------------------------------------------------

async fn send(app: Router, request: Request<Body>) -> Response<Body> {
    app.oneshot(request).await.unwrap()
}

pub async fn get(app: Router, uri: &str) -> Response<Body> {
    send(app, Request::get(uri).body(Body::empty()).unwrap()).await
}

pub async fn get_auth(app: Router, uri: &str, token: &str) -> Response<Body> {
    let request = Request::get(uri)
        .header("authorization", format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap();
    send(app, request).await
}

pub async fn post_json(app: Router, uri: &str, body: serde_json::Value) -> Response<Body> {
    let request = Request::post(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    send(app, request).await
}

pub async fn post_json_auth(
    app: Router,
    uri: &str,
    body: serde_json::Value,
    token: &str,
) -> Response<Body> {
    let request = Request::post(uri)
        .header("content-type", "application/json")
        .header("authorization", format!("Bearer {token}"))
        .body(Body::from(body.to_string()))
        .unwrap();
    send(app, request).await
}

/// POST a raw body with arbitrary extra headers.
pub async fn post_raw(app: Router, uri: &str, body: &str, headers: &[(&str, &str)]) -> Response<Body> {
    let mut builder = Request::post(uri).header("content-type", "application/json");
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    send(app, builder.body(Body::from(body.to_string())).unwrap()).await
}

/// POST with arbitrary extra headers and no JSON body.
pub async fn post_with_headers(app: Router, uri: &str, headers: &[(&str, &str)]) -> Response<Body> {
    let mut builder = Request::post(uri);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    send(app, builder.body(Body::empty()).unwrap()).await
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
