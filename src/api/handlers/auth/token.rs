//! Stateless session tokens.
//!
//! Tokens are signed with a server-held secret and carry only the user id
//! and a validity window. Nothing is persisted server-side; validity is a
//! pure function of signature and expiry.

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Token payload: subject plus issuance/expiry timestamps.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
}

/// Any malformed, tampered, or expired token collapses into this one
/// variant; callers treat it as "unauthenticated", never as a fatal error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidToken;

pub struct TokenService {
    secret: SecretString,
    ttl_seconds: i64,
}

impl TokenService {
    #[must_use]
    pub fn new(secret: SecretString, ttl_seconds: i64) -> Self {
        Self {
            secret,
            ttl_seconds,
        }
    }

    /// Issue a signed token for the given user.
    ///
    /// # Errors
    /// Returns an error only when signing itself fails.
    pub fn issue(&self, user_id: Uuid) -> anyhow::Result<String> {
        let now = unix_now();
        let claims = Claims {
            sub: user_id.to_string(),
            iat: now,
            exp: now + self.ttl_seconds,
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.secret.expose_secret().as_bytes()),
        )?;
        Ok(token)
    }

    /// Verify signature and expiry, returning the user id on success.
    pub fn verify(&self, token: &str) -> Result<Uuid, InvalidToken> {
        let validation = Validation::new(Algorithm::HS256);
        let data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.expose_secret().as_bytes()),
            &validation,
        )
        .map_err(|_| InvalidToken)?;
        Uuid::parse_str(&data.claims.sub).map_err(|_| InvalidToken)
    }

    #[must_use]
    pub fn ttl_seconds(&self) -> i64 {
        self.ttl_seconds
    }
}

fn unix_now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map_or(0, |elapsed| i64::try_from(elapsed.as_secs()).unwrap_or(0))
}
