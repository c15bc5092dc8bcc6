//! Request/response types for the auth endpoints.
//!
//! Wire field names are camelCase to match the original frontend payloads.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Deserialize, ToSchema)]
pub struct RegisterInitiateRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegisterInitiateResponse {
    pub user_id: String,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegisterVerifyRequest {
    pub user_id: String,
    pub otp: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RegisterResendRequest {
    pub email: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct EmailCheckRequest {
    pub email: String,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EmailCheckResponse {
    pub available: bool,
    pub is_pending: bool,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct GoogleLoginRequest {
    pub token: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ForgotInitiateRequest {
    pub email: String,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ForgotInitiateResponse {
    pub user_id: String,
    pub email: String,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ForgotVerifyRequest {
    pub user_id: String,
    pub otp: String,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ForgotResendRequest {
    pub user_id: String,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ForgotResendResponse {
    pub user_id: String,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ForgotResetRequest {
    pub user_id: String,
    pub password: String,
    pub otp: Option<String>,
}

/// Public user fields returned after a successful login/verification.
#[derive(Debug, Serialize, ToSchema)]
pub struct UserResponse {
    pub id: String,
    pub email: String,
    pub name: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UserEnvelope {
    pub user: UserResponse,
}

/// Tagged "the server needs another step" response, e.g.
/// `{"userId": "...", "action": "complete-verification"}`.
///
/// The `set-password` action also carries a one-time `resetToken`; the
/// reset endpoint requires it, so holding a user id is not enough.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ActionResponse {
    pub user_id: String,
    pub action: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reset_token: Option<String>,
}

pub const ACTION_COMPLETE_VERIFICATION: &str = "complete-verification";
pub const ACTION_SET_PASSWORD: &str = "set-password";
