//! Report-ready notices.
//!
//! Each channel (push, email) sits behind [`ReportNotifier`]. The API holds
//! one notifier per channel inside a [`ReportDelivery`], which decides
//! which channels still owe the user a notice, stamps each successful send
//! on the report, and records an inbox entry once anything went out.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use helfi_core::types::DbId;
use helfi_core::weekly_report::{
    NotifyChannel, ReportNotice, DISPATCH_SKIP_ALREADY_NOTIFIED, DISPATCH_SKIP_NOT_READY,
    INBOX_KIND_WEEKLY_REPORT, INBOX_SOURCE_SYSTEM, REPORT_EMAIL_SUBJECT,
};
use helfi_db::models::inbox::NewInboxEntry;
use helfi_db::repositories::{InboxRepo, UserRepo, WeeklyReportRepo};
use helfi_db::DbPool;
use serde::Serialize;

/// Status recorded for a channel that delivered.
pub const STATUS_SENT: &str = "sent";

/// Who a notice is for.
#[derive(Debug, Clone)]
pub struct Recipient {
    pub user_id: DbId,
    /// Empty when the account has no address on file.
    pub email: String,
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    /// Nothing was attempted: no destination, or the channel is not
    /// configured. Carries the status to report.
    #[error("Notice not sent: {0}")]
    Skipped(&'static str),

    /// The provider rejected or failed the send.
    #[error("Notice delivery failed: {0}")]
    Failed(String),
}

impl NotifyError {
    /// Per-channel status reported by the dispatch endpoint.
    pub fn status(&self) -> String {
        match self {
            NotifyError::Skipped(status) => (*status).to_string(),
            NotifyError::Failed(message) => format!("failed:{message}"),
        }
    }
}

#[async_trait]
pub trait ReportNotifier: Send + Sync {
    /// Provider name, for logs.
    fn name(&self) -> &'static str;

    fn channel(&self) -> NotifyChannel;

    async fn send(&self, recipient: &Recipient, notice: &ReportNotice) -> Result<(), NotifyError>;
}

/// Writes the notice to the log instead of a provider. The default for
/// deployments without push or email credentials.
#[derive(Debug, Clone, Copy)]
pub struct LogNotifier {
    channel: NotifyChannel,
}

impl LogNotifier {
    pub fn new(channel: NotifyChannel) -> Self {
        Self { channel }
    }
}

#[async_trait]
impl ReportNotifier for LogNotifier {
    fn name(&self) -> &'static str {
        "log"
    }

    fn channel(&self) -> NotifyChannel {
        self.channel
    }

    async fn send(&self, recipient: &Recipient, notice: &ReportNotice) -> Result<(), NotifyError> {
        if self.channel == NotifyChannel::Email && recipient.email.is_empty() {
            return Err(NotifyError::Skipped("missing_email"));
        }
        tracing::info!(
            channel = %self.channel,
            user_id = recipient.user_id,
            report_id = notice.report_id,
            title = %notice.title,
            subject = (self.channel == NotifyChannel::Email).then_some(REPORT_EMAIL_SUBJECT),
            url = %notice.url,
            "Report-ready notice",
        );
        Ok(())
    }
}

/// Per-channel statuses. A channel that had already delivered is omitted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelResults {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub push_status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email_status: Option<String>,
}

impl ChannelResults {
    fn set(&mut self, channel: NotifyChannel, status: String) {
        match channel {
            NotifyChannel::Push => self.push_status = Some(status),
            NotifyChannel::Email => self.email_status = Some(status),
        }
    }

    fn any_sent(&self) -> bool {
        [&self.push_status, &self.email_status]
            .into_iter()
            .any(|s| s.as_deref() == Some(STATUS_SENT))
    }
}

/// Result of one dispatch request, in its wire shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum DeliveryOutcome {
    Skipped { skipped: &'static str },
    Delivered { ok: bool, results: ChannelResults },
}

pub struct ReportDelivery {
    pool: DbPool,
    notifiers: Vec<Arc<dyn ReportNotifier>>,
}

impl ReportDelivery {
    pub fn new(pool: DbPool, notifiers: Vec<Arc<dyn ReportNotifier>>) -> Self {
        Self { pool, notifiers }
    }

    /// Log-only notifiers for both channels.
    pub fn logging(pool: DbPool) -> Self {
        Self::new(
            pool,
            vec![
                Arc::new(LogNotifier::new(NotifyChannel::Push)),
                Arc::new(LogNotifier::new(NotifyChannel::Email)),
            ],
        )
    }

    /// Send the report-ready notice for `report_id` on every channel that
    /// has not delivered yet.
    ///
    /// Reports that are missing, owned by someone else, or not `ready` /
    /// `locked` are skipped. Only database errors fail the call; channel
    /// failures are reported in the results and retried on the next call.
    pub async fn deliver(
        &self,
        user_id: DbId,
        report_id: DbId,
    ) -> Result<DeliveryOutcome, sqlx::Error> {
        let report = WeeklyReportRepo::find_for_user(&self.pool, report_id, user_id).await?;
        let Some((report, status)) = report.and_then(|r| {
            let status = r.report_status().ok().filter(|s| s.is_deliverable())?;
            Some((r, status))
        }) else {
            return Ok(DeliveryOutcome::Skipped {
                skipped: DISPATCH_SKIP_NOT_READY,
            });
        };

        let pending: Vec<&Arc<dyn ReportNotifier>> = self
            .notifiers
            .iter()
            .filter(|n| report.sent_at(n.channel()).is_none())
            .collect();
        if pending.is_empty() {
            return Ok(DeliveryOutcome::Skipped {
                skipped: DISPATCH_SKIP_ALREADY_NOTIFIED,
            });
        }

        let recipient = Recipient {
            user_id,
            email: UserRepo::find_by_id(&self.pool, user_id)
                .await?
                .map(|u| u.email)
                .unwrap_or_default(),
        };
        let notice = ReportNotice::for_report(report.id, status);

        let mut results = ChannelResults::default();
        for notifier in pending {
            let channel = notifier.channel();
            let status = match notifier.send(&recipient, &notice).await {
                Ok(()) => {
                    WeeklyReportRepo::mark_channel_sent(&self.pool, report.id, channel, Utc::now())
                        .await?;
                    STATUS_SENT.to_string()
                }
                Err(e) => {
                    tracing::warn!(
                        %channel,
                        provider = notifier.name(),
                        report_id = report.id,
                        error = %e,
                        "Report-ready notice not sent",
                    );
                    e.status()
                }
            };
            results.set(channel, status);
        }

        if results.any_sent() {
            self.record_inbox(&notice, user_id).await;
        }

        Ok(DeliveryOutcome::Delivered { ok: true, results })
    }

    /// Inbox failures never fail the dispatch.
    async fn record_inbox(&self, notice: &ReportNotice, user_id: DbId) {
        let entry = NewInboxEntry {
            user_id,
            title: notice.title.clone(),
            body: notice.body.clone(),
            url: Some(notice.url.clone()),
            kind: INBOX_KIND_WEEKLY_REPORT.to_string(),
            source: INBOX_SOURCE_SYSTEM.to_string(),
            event_key: notice.event_key(),
            metadata: serde_json::json!({
                "reportId": notice.report_id,
                "status": notice.status,
            }),
        };
        if let Err(e) = InboxRepo::record(&self.pool, &entry).await {
            tracing::warn!(user_id, report_id = notice.report_id, error = %e, "Failed to record inbox entry");
        }
    }
}
