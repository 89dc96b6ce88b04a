//! Queue dispatch: publish one message per user to an Upstash QStash
//! compatible queue, which then calls the generation endpoint.

use std::time::Duration;

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use super::{DispatchError, GenerationDispatch, GenerationJob};

/// Publishing only enqueues, so this can stay short.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

pub const DEFAULT_QUEUE_URL: &str = "https://qstash.upstash.io";

pub struct QueueDispatch {
    client: reqwest::Client,
    publish_url: String,
    token: String,
    /// Forwarded to the generation endpoint as its `Authorization` header.
    forward_secret: Option<String>,
}

impl QueueDispatch {
    pub fn new(
        queue_url: &str,
        token: impl Into<String>,
        run_url: &str,
        forward_secret: Option<String>,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            publish_url: publish_url(queue_url, run_url),
            token: token.into(),
            forward_secret,
        })
    }
}

/// `{queue_url}/v2/publish/{run_url}`.
pub fn publish_url(queue_url: &str, run_url: &str) -> String {
    format!("{}/v2/publish/{}", queue_url.trim_end_matches('/'), run_url)
}

/// Stable id per user and due date so a repeated cron tick for the same
/// period is dropped by the queue.
pub fn deduplication_id(job: &GenerationJob) -> String {
    let due = job.due_at.map(|d| d.to_rfc3339()).unwrap_or_default();
    let digest = Sha256::digest(format!("weekly-report:{}:{due}", job.user_id).as_bytes());
    format!("{digest:x}")
}

#[async_trait]
impl GenerationDispatch for QueueDispatch {
    fn name(&self) -> &'static str {
        "queue"
    }

    async fn dispatch(&self, job: &GenerationJob) -> Result<&'static str, DispatchError> {
        let mut request = self
            .client
            .post(&self.publish_url)
            .bearer_auth(&self.token)
            .header("Upstash-Deduplication-Id", deduplication_id(job))
            .json(&serde_json::json!({ "userId": job.user_id }));
        if let Some(secret) = &self.forward_secret {
            request = request.header("Upstash-Forward-Authorization", format!("Bearer {secret}"));
        }

        let response = request.send().await.map_err(DispatchError::Queue)?;
        if !response.status().is_success() {
            return Err(DispatchError::QueueStatus(response.status().as_u16()));
        }
        Ok("queued")
    }
}
