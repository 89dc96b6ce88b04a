//! Outbound transports that trigger report generation for one user.
//!
//! The scheduler holds an `Arc<dyn GenerationDispatch>` and never learns
//! which transport is behind it. Both transports make exactly one call per
//! job; retrying is left to the next scheduler run (or to the queue).

pub mod direct;
pub mod queue;

use async_trait::async_trait;
use helfi_core::types::{DbId, Timestamp};
use serde::Serialize;

// ---------------------------------------------------------------------------
// Job / outcome
// ---------------------------------------------------------------------------

/// One due user to hand to the generation endpoint.
#[derive(Debug, Clone)]
pub struct GenerationJob {
    pub user_id: DbId,
    pub due_at: Option<Timestamp>,
}

/// Per-user result reported by the cron endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchOutcome {
    pub user_id: DbId,
    pub ok: bool,
    pub reason: String,
}

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// The queue rejected the publish request.
    #[error("Queue returned HTTP {0}")]
    QueueStatus(u16),

    /// The publish request never completed.
    #[error("Queue request failed: {0}")]
    Queue(#[source] reqwest::Error),

    /// The generation endpoint returned a non-2xx status code.
    #[error("Generation endpoint returned HTTP {0}")]
    HttpStatus(u16),

    /// The direct request never completed (network, DNS, timeout, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[source] reqwest::Error),
}

impl DispatchError {
    /// Short machine-readable reason recorded in the run results.
    pub fn reason(&self) -> String {
        match self {
            DispatchError::QueueStatus(status) => format!("queue_http_{status}"),
            DispatchError::Queue(_) => "queue_error".to_string(),
            DispatchError::HttpStatus(status) => format!("http_{status}"),
            DispatchError::Request(_) => "request_error".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

#[async_trait]
pub trait GenerationDispatch: Send + Sync {
    /// Transport name, for logs.
    fn name(&self) -> &'static str;

    /// Trigger generation for one user. On success returns the reason to
    /// record (`queued` or `ok`).
    async fn dispatch(&self, job: &GenerationJob) -> Result<&'static str, DispatchError>;
}

/// Dispatch one job and fold the result into an outcome row.
pub async fn dispatch_outcome(
    dispatcher: &dyn GenerationDispatch,
    job: &GenerationJob,
) -> DispatchOutcome {
    match dispatcher.dispatch(job).await {
        Ok(reason) => DispatchOutcome {
            user_id: job.user_id,
            ok: true,
            reason: reason.to_string(),
        },
        Err(e) => {
            tracing::warn!(
                user_id = job.user_id,
                transport = dispatcher.name(),
                error = %e,
                "Weekly report dispatch failed"
            );
            DispatchOutcome {
                user_id: job.user_id,
                ok: false,
                reason: e.reason(),
            }
        }
    }
}
