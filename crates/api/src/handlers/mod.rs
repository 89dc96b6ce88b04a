//! Request handlers.
//!
//! Handlers delegate to the repositories in `helfi_db` and map errors via
//! [`AppError`](crate::error::AppError).

pub mod cron;
pub mod weekly_report;
