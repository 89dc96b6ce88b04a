//! Domain logic shared by the Helfi weekly report crates.
//!
//! Nothing in here performs IO: schedule arithmetic, the notification
//! acknowledgement state machine, report composition and the in-memory
//! cache are all pure so the db, events and api crates can share them.

pub mod cache;
pub mod error;
pub mod report_composer;
pub mod types;
pub mod weekly_report;
