//! Machine-caller authentication for the cron and generation endpoints.
//!
//! Three kinds of caller are accepted:
//! - the hosting platform's cron runner, identified by its cron header, but
//!   only when the deployment opts in to trusting that header;
//! - anything holding the shared `SCHEDULER_SECRET` as a bearer token;
//! - the message queue, which signs each delivery with an HS256 JWT in the
//!   `Upstash-Signature` header. The JWT names the destination URL and a
//!   digest of the exact body it was issued for.

use axum::http::HeaderMap;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use sha2::{Digest, Sha256};

use crate::config::SchedulerAuthConfig;

pub const CRON_HEADER: &str = "x-vercel-cron";
pub const SIGNATURE_HEADER: &str = "upstash-signature";
pub const QUEUE_ISSUER: &str = "Upstash";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerCaller {
    PlatformCron,
    SharedSecret,
    Queue,
}

/// Claims of a queue delivery signature.
#[derive(Debug, Clone, Deserialize)]
pub struct QueueClaims {
    pub iss: String,
    /// Destination URL the message was published to.
    pub sub: String,
    pub exp: i64,
    /// Base64url SHA-256 of the request body.
    #[serde(default)]
    pub body: Option<String>,
}

/// What a queue signature must cover to be accepted.
#[derive(Debug, Clone, Copy)]
pub struct QueueDelivery<'a> {
    /// Absolute URL of the endpoint receiving the delivery.
    pub url: &'a str,
    /// Raw request body, exactly as received.
    pub body: &'a [u8],
}

/// Compare without short-circuiting on the first differing byte.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Whether `authorization` is `Bearer <secret>`. An unset secret matches nothing.
pub fn secret_matches(authorization: Option<&str>, secret: Option<&str>) -> bool {
    match (authorization.and_then(|h| h.strip_prefix("Bearer ")), secret) {
        (Some(token), Some(secret)) if !secret.is_empty() => {
            constant_time_eq(token.as_bytes(), secret.as_bytes())
        }
        _ => false,
    }
}

/// Unpadded base64url SHA-256 of `body`, the form carried in the `body` claim.
pub fn body_digest(body: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(body))
}

/// Verify a queue signature against any of the configured signing keys.
///
/// Checks the HS256 signature, expiry, not-before and issuer, then requires
/// the subject to name `delivery.url` and the `body` claim to match the
/// digest of `delivery.body`. Padding on the claim is ignored.
pub fn verify_queue_signature(
    token: &str,
    signing_keys: &[String],
    delivery: QueueDelivery<'_>,
) -> Option<QueueClaims> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_issuer(&[QUEUE_ISSUER]);
    validation.validate_nbf = true;

    let claims = signing_keys.iter().find_map(|key| {
        decode::<QueueClaims>(token, &DecodingKey::from_secret(key.as_bytes()), &validation)
            .ok()
            .map(|data| data.claims)
    })?;

    if claims.sub.trim_end_matches('/') != delivery.url.trim_end_matches('/') {
        tracing::warn!(sub = %claims.sub, expected = delivery.url, "Queue signature subject mismatch");
        return None;
    }

    let Some(signed) = claims.body.as_deref() else {
        tracing::warn!("Queue signature carries no body digest");
        return None;
    };
    let actual = body_digest(delivery.body);
    if !constant_time_eq(signed.trim_end_matches('=').as_bytes(), actual.as_bytes()) {
        tracing::warn!("Queue signature body digest mismatch");
        return None;
    }

    Some(claims)
}

/// Identify the caller, or `None` if the request carries no valid
/// machine credential.
///
/// Queue signatures are only checked when `queue` describes the delivery
/// they must cover.
pub fn authorize(
    headers: &HeaderMap,
    config: &SchedulerAuthConfig,
    queue: Option<QueueDelivery<'_>>,
) -> Option<SchedulerCaller> {
    if config.trust_cron_header && headers.contains_key(CRON_HEADER) {
        return Some(SchedulerCaller::PlatformCron);
    }

    let authorization = headers.get("authorization").and_then(|v| v.to_str().ok());
    if secret_matches(authorization, config.secret.as_deref()) {
        return Some(SchedulerCaller::SharedSecret);
    }

    match queue {
        Some(delivery) if !config.signing_keys.is_empty() => {
            let signature = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok())?;
            verify_queue_signature(signature, &config.signing_keys, delivery)?;
            Some(SchedulerCaller::Queue)
        }
        _ => None,
    }
}
