//! Long-running tasks started alongside the HTTP server.

pub mod weekly_report;
