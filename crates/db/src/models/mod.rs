//! Row models and DTOs.
//!
//! Entity structs derive `FromRow` + `Serialize` and mirror their table.
//! They serialize with camelCase keys, which is the wire format of every
//! endpoint that returns them.

pub mod feature_flag;
pub mod inbox;
pub mod user;
pub mod wallet;
pub mod weekly_report;
