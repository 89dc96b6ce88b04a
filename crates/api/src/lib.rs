//! Helfi weekly health report API.
//!
//! Exposes the building blocks (config, state, error handling, routes,
//! scheduler wiring) so integration tests and the binary entrypoint can
//! both use them.

pub mod auth;
pub mod background;
pub mod config;
pub mod error;
pub mod generation;
pub mod handlers;
pub mod middleware;
pub mod router;
pub mod routes;
pub mod state;
