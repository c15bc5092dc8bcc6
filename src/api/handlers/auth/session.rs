//! Stateless session cookies.
//!
//! Login issues a signed JWT in an HttpOnly cookie; requests are
//! authenticated purely from the token's signature and expiry, so logout
//! only clears the cookie.

use axum::http::header::{AUTHORIZATION, COOKIE};
use axum::http::HeaderMap;
use uuid::Uuid;

use super::state::AuthState;
use crate::api::error::ApiError;

pub const SESSION_COOKIE_NAME: &str = "bodega_session";

/// Authenticated caller extracted from the request.
#[derive(Clone, Copy, Debug)]
pub struct Principal {
    pub user_id: Uuid,
}

/// Build the `Set-Cookie` value carrying a fresh session token.
pub(crate) fn session_cookie(auth: &AuthState, token: &str) -> String {
    let mut cookie = format!(
        "{SESSION_COOKIE_NAME}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        auth.config().session_ttl_seconds()
    );
    if auth.config().session_cookie_secure() {
        cookie.push_str("; Secure");
    }
    cookie
}

/// Build the `Set-Cookie` value that expires the session cookie.
pub(crate) fn clear_session_cookie(auth: &AuthState) -> String {
    let mut cookie =
        format!("{SESSION_COOKIE_NAME}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0");
    if auth.config().session_cookie_secure() {
        cookie.push_str("; Secure");
    }
    cookie
}

/// Pull the session token from the cookie header, falling back to a
/// `Bearer` authorization header for non-browser clients.
fn extract_session_token(headers: &HeaderMap) -> Option<String> {
    for value in headers.get_all(COOKIE) {
        let Ok(value) = value.to_str() else {
            continue;
        };
        for pair in value.split(';') {
            let pair = pair.trim();
            if let Some(token) = pair.strip_prefix(SESSION_COOKIE_NAME) {
                if let Some(token) = token.strip_prefix('=') {
                    if !token.is_empty() {
                        return Some(token.to_string());
                    }
                }
            }
        }
    }

    headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::to_string)
}

/// Resolve the caller or fail with 401. No database lookup is involved.
pub(crate) fn require_auth(headers: &HeaderMap, auth: &AuthState) -> Result<Principal, ApiError> {
    let token = extract_session_token(headers).ok_or(ApiError::Unauthenticated)?;
    let user_id = auth
        .tokens()
        .verify(&token)
        .map_err(|_| ApiError::Unauthenticated)?;
    Ok(Principal { user_id })
}
