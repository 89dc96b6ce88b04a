//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async methods that
//! accept `&PgPool` as the first argument. Writes that take part in a
//! settlement transaction accept any `PgExecutor` instead.

pub mod feature_flag_repo;
pub mod inbox_repo;
pub mod user_repo;
pub mod wallet_repo;
pub mod weekly_report_repo;
pub mod weekly_report_state_repo;

pub use feature_flag_repo::FeatureFlagRepo;
pub use inbox_repo::InboxRepo;
pub use user_repo::UserRepo;
pub use wallet_repo::WalletRepo;
pub use weekly_report_repo::WeeklyReportRepo;
pub use weekly_report_state_repo::WeeklyReportStateRepo;
