//! Error taxonomy shared by every handler.
//!
//! Business-rule failures map to a status code plus a `{"error": message}`
//! body. Infrastructure failures are logged server-side and downgraded to a
//! generic `500`/`503` so internals never leak to clients.

use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use tracing::error;

#[derive(Debug)]
pub enum ApiError {
    /// Missing or malformed input (400).
    Validation(String),
    /// Missing or invalid session token (401).
    Unauthenticated,
    /// Failed login or rejected identity token (401, specific message).
    InvalidCredentials(&'static str),
    /// Authenticated but not allowed to touch the resource (403).
    Forbidden(&'static str),
    /// Referenced entity does not exist (404).
    NotFound(&'static str),
    /// State conflict, e.g. email already registered (409).
    Conflict(&'static str),
    /// Resend cooldown or similar throttle (429).
    RateLimited(&'static str),
    /// Database/provider/email outage; retryable (503).
    Upstream(anyhow::Error),
    /// Unexpected failure (500); details stay in the logs.
    Internal(anyhow::Error),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Unauthenticated | Self::InvalidCredentials(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            Self::Upstream(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn message(&self) -> String {
        match self {
            Self::Validation(message) => message.clone(),
            Self::Unauthenticated => "Unauthorized".to_string(),
            Self::InvalidCredentials(message)
            | Self::Forbidden(message)
            | Self::NotFound(message)
            | Self::Conflict(message)
            | Self::RateLimited(message) => (*message).to_string(),
            Self::Upstream(_) => "Service temporarily unavailable".to_string(),
            Self::Internal(_) => "Internal server error".to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        match &self {
            Self::Upstream(err) => error!("Upstream failure: {err:?}"),
            Self::Internal(err) => error!("Internal error: {err:?}"),
            _ => {}
        }
        let body = Json(json!({ "error": self.message() }));
        (self.status(), body).into_response()
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => {
                Self::Upstream(anyhow::Error::new(err))
            }
            _ => Self::Internal(anyhow::Error::new(err)),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err)
    }
}
