//! Request extractors that authenticate callers before handlers run.
//!
//! - [`auth::AuthUser`] -- signed-in user from a bearer token or session cookie.
//! - [`scheduler::SchedulerAuth`] -- cron runner or secret holder.
//! - [`scheduler::SchedulerJson`] -- the same, or a signed queue delivery, plus its body.

pub mod auth;
pub mod scheduler;
