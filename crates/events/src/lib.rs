//! Weekly report dispatch, scheduling and report-ready notices.
//!
//! - [`delivery`]: transports that trigger generation for one user
//!   ([`QueueDispatch`] via a message queue, [`DirectDispatch`] in-line).
//! - [`WeeklyReportScheduler`]: backfill, due scan and per-user dispatch.
//! - [`notify`]: report-ready notices per channel ([`ReportDelivery`]).

pub mod delivery;
pub mod notify;
pub mod scheduler;

pub use delivery::direct::DirectDispatch;
pub use delivery::queue::QueueDispatch;
pub use delivery::{DispatchError, DispatchOutcome, GenerationDispatch, GenerationJob};
pub use notify::{DeliveryOutcome, LogNotifier, NotifyError, ReportDelivery, ReportNotifier};
pub use scheduler::{RunSummary, SchedulerSettings, WeeklyReportScheduler};
