//! Machine-caller extractors for the cron and scheduler-driven endpoints.

use axum::body::to_bytes;
use axum::extract::{FromRequest, FromRequestParts, OriginalUri, Request};
use axum::http::request::Parts;
use helfi_core::error::CoreError;
use serde::de::DeserializeOwned;

use crate::auth::scheduler::{authorize, QueueDelivery, SchedulerCaller};
use crate::error::AppError;
use crate::state::AppState;

/// Largest body accepted from a machine caller.
const MAX_BODY_BYTES: usize = 64 * 1024;

pub const INVALID_PAYLOAD: &str = "invalid_payload";

fn unauthorized() -> AppError {
    AppError::Core(CoreError::Unauthorized("Scheduler credentials required".into()))
}

/// Cron runner or shared-secret holder. Used by the cron endpoint.
#[derive(Debug, Clone, Copy)]
pub struct SchedulerAuth {
    pub caller: SchedulerCaller,
}

impl FromRequestParts<AppState> for SchedulerAuth {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let caller =
            authorize(&parts.headers, &state.config.scheduler, None).ok_or_else(unauthorized)?;
        Ok(SchedulerAuth { caller })
    }
}

/// JSON body from an authorized machine caller.
///
/// Like [`SchedulerAuth`], but also accepts a signed queue delivery. The
/// body is buffered so the signature can be checked against the exact bytes
/// received and against this endpoint's public URL. Credentials are checked
/// before the body is parsed; a malformed body is `400 invalid_payload`.
#[derive(Debug)]
pub struct SchedulerJson<T> {
    pub caller: SchedulerCaller,
    pub body: T,
}

impl<T> FromRequest<AppState> for SchedulerJson<T>
where
    T: DeserializeOwned,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &AppState) -> Result<Self, Self::Rejection> {
        let (parts, body) = req.into_parts();
        let path = parts
            .extensions
            .get::<OriginalUri>()
            .map_or_else(|| parts.uri.path().to_string(), |uri| uri.0.path().to_string());
        let url = format!("{}{}", state.config.weekly_reports.public_base_url, path);

        let bytes = to_bytes(body, MAX_BODY_BYTES).await.map_err(|e| {
            tracing::debug!(error = %e, "Unreadable scheduler request body");
            AppError::BadRequest(INVALID_PAYLOAD.to_string())
        })?;

        let delivery = QueueDelivery {
            url: &url,
            body: &bytes,
        };
        let caller = authorize(&parts.headers, &state.config.scheduler, Some(delivery))
            .ok_or_else(unauthorized)?;
        tracing::debug!(?caller, path = %path, "Scheduler request authorized");

        let body = serde_json::from_slice(&bytes).map_err(|e| {
            tracing::debug!(error = %e, "Rejected scheduler payload");
            AppError::BadRequest(INVALID_PAYLOAD.to_string())
        })?;
        Ok(SchedulerJson { caller, body })
    }
}
