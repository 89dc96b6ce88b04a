//! Session authentication extractor for Axum handlers.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use helfi_core::error::CoreError;
use helfi_core::types::DbId;

use crate::auth::jwt::{validate_token, SESSION_COOKIE};
use crate::error::AppError;
use crate::state::AppState;

/// Authenticated user, resolved from either an `Authorization: Bearer`
/// header or the session cookie. Both carry the same signed token, so
/// handlers see one principal type regardless of client.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: DbId,
    pub email: String,
}

/// Value of `name` in a `Cookie` header.
fn cookie_value<'a>(header: &'a str, name: &str) -> Option<&'a str> {
    header.split(';').find_map(|pair| {
        let (key, value) = pair.trim().split_once('=')?;
        (key == name).then_some(value)
    })
}

/// Bearer header wins over the cookie when both are present.
fn session_token(parts: &Parts) -> Option<&str> {
    let bearer = parts
        .headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "));
    if bearer.is_some() {
        return bearer;
    }
    parts
        .headers
        .get_all("cookie")
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find_map(|h| cookie_value(h, SESSION_COOKIE))
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = session_token(parts).ok_or_else(|| {
            AppError::Core(CoreError::Unauthorized("Missing session token".into()))
        })?;

        let claims = validate_token(token, &state.config.jwt).map_err(|_| {
            AppError::Core(CoreError::Unauthorized("Invalid or expired token".into()))
        })?;

        Ok(AuthUser {
            user_id: claims.sub,
            email: claims.email,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_cookie_among_others() {
        let header = "theme=dark; helfi_session=abc.def.ghi; other=1";
        assert_eq!(cookie_value(header, SESSION_COOKIE), Some("abc.def.ghi"));
        assert_eq!(cookie_value("theme=dark", SESSION_COOKIE), None);
    }

    #[test]
    fn cookie_name_must_match_exactly() {
        assert_eq!(cookie_value("helfi_session_old=x", SESSION_COOKIE), None);
    }
}
