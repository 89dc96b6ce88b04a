//! Authentication primitives.
//!
//! - [`jwt`] -- session token generation and validation.
//! - [`scheduler`] -- machine-caller checks (cron header, shared secret,
//!   queue signature).

pub mod jwt;
pub mod scheduler;
