use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use helfi_api::background::weekly_report::{build_scheduler, spawn_scheduler};
use helfi_api::config::ServerConfig;
use helfi_api::router::build_app_router;
use helfi_api::state::AppState;
use helfi_core::report_composer::BaselineComposer;
use helfi_events::ReportDelivery;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "helfi_api=debug,helfi_events=debug,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(
        host = %config.host,
        port = %config.port,
        run_url = %config.weekly_reports.run_url(),
        "Loaded server configuration",
    );

    // --- Database ---
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool = helfi_db::create_pool(&database_url)
        .await
        .expect("Failed to connect to database");
    tracing::info!("Database connection pool created");

    helfi_db::health_check(&pool)
        .await
        .expect("Database health check failed");
    tracing::info!("Database health check passed");

    helfi_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");

    // --- Scheduler ---
    let scheduler = Arc::new(
        build_scheduler(pool.clone(), &config).expect("Failed to build report dispatcher"),
    );
    let cancel = CancellationToken::new();
    let scheduler_handle = spawn_scheduler(Arc::clone(&scheduler), &config, cancel.clone());

    // --- Notices ---
    let delivery = Arc::new(ReportDelivery::logging(pool.clone()));
    tracing::info!("Report-ready notices go to the log (no push or email provider configured)");

    // --- App state ---
    let state = AppState::new(
        pool,
        Arc::new(config.clone()),
        scheduler,
        Arc::new(BaselineComposer),
        delivery,
    );
    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");

    cancel.cancel();
    if let Some(handle) = scheduler_handle {
        let timeout = Duration::from_secs(config.shutdown_timeout_secs);
        if tokio::time::timeout(timeout, handle).await.is_err() {
            tracing::warn!("Weekly report scheduler did not stop in time");
        } else {
            tracing::info!("Weekly report scheduler stopped");
        }
    }

    tracing::info!("Graceful shutdown complete");
}

/// Wait for SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
