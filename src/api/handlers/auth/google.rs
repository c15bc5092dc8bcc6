//! Google ID-token verification.
//!
//! The production implementation asks Google's `tokeninfo` endpoint to
//! validate the token, then checks the audience and that the email is
//! verified. The trait seam keeps handlers testable without network access.

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

const TOKENINFO_URL: &str = "https://oauth2.googleapis.com/tokeninfo";
const HTTP_TIMEOUT: Duration = Duration::from_secs(5);

/// Identity claims extracted from a valid Google ID token.
#[derive(Clone, Debug)]
pub struct GoogleIdentity {
    pub subject: String,
    pub email: String,
    pub name: Option<String>,
}

#[derive(Debug)]
pub enum GoogleVerifyError {
    /// Token missing/invalid or claims do not match expectations.
    Rejected(&'static str),
    /// Provider unreachable or timed out; retryable.
    Upstream(anyhow::Error),
}

#[async_trait]
pub trait GoogleTokenVerifier: Send + Sync {
    async fn verify(&self, id_token: &str) -> Result<GoogleIdentity, GoogleVerifyError>;
}

#[derive(Debug, Deserialize)]
struct TokenInfo {
    aud: String,
    sub: String,
    email: Option<String>,
    email_verified: Option<String>,
    name: Option<String>,
}

/// Verifier backed by Google's `tokeninfo` endpoint.
pub struct HttpGoogleVerifier {
    client: reqwest::Client,
    client_id: String,
}

impl HttpGoogleVerifier {
    /// # Errors
    /// Returns an error when the HTTP client cannot be built.
    pub fn new(client_id: String) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(crate::APP_USER_AGENT)
            .timeout(HTTP_TIMEOUT)
            .build()
            .context("failed to build Google verifier HTTP client")?;
        Ok(Self { client, client_id })
    }

    fn check_claims(&self, info: TokenInfo) -> Result<GoogleIdentity, GoogleVerifyError> {
        if info.aud != self.client_id {
            return Err(GoogleVerifyError::Rejected("Google token audience mismatch"));
        }
        if info.email_verified.as_deref() != Some("true") {
            return Err(GoogleVerifyError::Rejected(
                "Google account email is not verified",
            ));
        }
        let Some(email) = info.email else {
            return Err(GoogleVerifyError::Rejected("Google token has no email"));
        };
        Ok(GoogleIdentity {
            subject: info.sub,
            email,
            name: info.name,
        })
    }
}

#[async_trait]
impl GoogleTokenVerifier for HttpGoogleVerifier {
    async fn verify(&self, id_token: &str) -> Result<GoogleIdentity, GoogleVerifyError> {
        let response = self
            .client
            .get(TOKENINFO_URL)
            .query(&[("id_token", id_token)])
            .send()
            .await
            .map_err(|err| {
                GoogleVerifyError::Upstream(anyhow!("tokeninfo request failed: {err}"))
            })?;

        if response.status().is_client_error() {
            return Err(GoogleVerifyError::Rejected("Invalid Google token"));
        }
        if !response.status().is_success() {
            return Err(GoogleVerifyError::Upstream(anyhow!(
                "tokeninfo returned {}",
                response.status()
            )));
        }

        let info: TokenInfo = response.json().await.map_err(|err| {
            GoogleVerifyError::Upstream(anyhow!("tokeninfo payload unreadable: {err}"))
        })?;

        self.check_claims(info)
    }
}
