//! Direct HTTP dispatch: call the generation endpoint in-line.

use std::time::Duration;

use async_trait::async_trait;

use super::{DispatchError, GenerationDispatch, GenerationJob};

/// Generation can take a while; the call waits for it to finish.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// POSTs `{userId}` to the generation endpoint with the scheduler secret.
pub struct DirectDispatch {
    client: reqwest::Client,
    run_url: String,
    secret: String,
}

impl DirectDispatch {
    pub fn new(run_url: impl Into<String>, secret: impl Into<String>) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            run_url: run_url.into(),
            secret: secret.into(),
        })
    }
}

#[async_trait]
impl GenerationDispatch for DirectDispatch {
    fn name(&self) -> &'static str {
        "direct"
    }

    async fn dispatch(&self, job: &GenerationJob) -> Result<&'static str, DispatchError> {
        let response = self
            .client
            .post(&self.run_url)
            .bearer_auth(&self.secret)
            .json(&serde_json::json!({ "userId": job.user_id }))
            .send()
            .await
            .map_err(DispatchError::Request)?;

        if !response.status().is_success() {
            return Err(DispatchError::HttpStatus(response.status().as_u16()));
        }
        Ok("ok")
    }
}
