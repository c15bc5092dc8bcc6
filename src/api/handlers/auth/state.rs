//! Auth configuration and shared state.

use std::sync::Arc;

use super::google::GoogleTokenVerifier;
use super::token::TokenService;

const DEFAULT_OTP_TTL_SECONDS: i64 = 10 * 60;
const DEFAULT_RESEND_COOLDOWN_SECONDS: i64 = 45;
const DEFAULT_MAX_OTP_ATTEMPTS: i32 = 5;
const DEFAULT_SESSION_TTL_SECONDS: i64 = 7 * 24 * 60 * 60;

#[derive(Clone, Debug)]
pub struct AuthConfig {
    frontend_base_url: String,
    otp_ttl_seconds: i64,
    resend_cooldown_seconds: i64,
    max_otp_attempts: i32,
    session_ttl_seconds: i64,
}

impl AuthConfig {
    #[must_use]
    pub fn new(frontend_base_url: String) -> Self {
        Self {
            frontend_base_url,
            otp_ttl_seconds: DEFAULT_OTP_TTL_SECONDS,
            resend_cooldown_seconds: DEFAULT_RESEND_COOLDOWN_SECONDS,
            max_otp_attempts: DEFAULT_MAX_OTP_ATTEMPTS,
            session_ttl_seconds: DEFAULT_SESSION_TTL_SECONDS,
        }
    }

    #[must_use]
    pub fn with_otp_ttl_seconds(mut self, seconds: i64) -> Self {
        self.otp_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_resend_cooldown_seconds(mut self, seconds: i64) -> Self {
        self.resend_cooldown_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_max_otp_attempts(mut self, attempts: i32) -> Self {
        self.max_otp_attempts = attempts;
        self
    }

    #[must_use]
    pub fn with_session_ttl_seconds(mut self, seconds: i64) -> Self {
        self.session_ttl_seconds = seconds;
        self
    }

    pub(crate) fn frontend_base_url(&self) -> &str {
        &self.frontend_base_url
    }

    pub(super) fn otp_ttl_seconds(&self) -> i64 {
        self.otp_ttl_seconds
    }

    pub(super) fn resend_cooldown_seconds(&self) -> i64 {
        self.resend_cooldown_seconds
    }

    pub(super) fn max_otp_attempts(&self) -> i32 {
        self.max_otp_attempts
    }

    pub(crate) fn session_ttl_seconds(&self) -> i64 {
        self.session_ttl_seconds
    }

    pub(super) fn session_cookie_secure(&self) -> bool {
        self.frontend_base_url.starts_with("https://")
    }
}

pub struct AuthState {
    config: AuthConfig,
    tokens: TokenService,
    google: Option<Arc<dyn GoogleTokenVerifier>>,
}

impl AuthState {
    pub fn new(
        config: AuthConfig,
        tokens: TokenService,
        google: Option<Arc<dyn GoogleTokenVerifier>>,
    ) -> Self {
        Self {
            config,
            tokens,
            google,
        }
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    #[must_use]
    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    pub(super) fn google(&self) -> Option<&dyn GoogleTokenVerifier> {
        self.google.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;

    #[test]
    fn auth_config_defaults_and_overrides() {
        let config = AuthConfig::new("https://bodega.dev".to_string());

        assert_eq!(config.frontend_base_url(), "https://bodega.dev");
        assert_eq!(config.otp_ttl_seconds(), super::DEFAULT_OTP_TTL_SECONDS);
        assert_eq!(
            config.resend_cooldown_seconds(),
            super::DEFAULT_RESEND_COOLDOWN_SECONDS
        );
        assert_eq!(config.max_otp_attempts(), super::DEFAULT_MAX_OTP_ATTEMPTS);
        assert_eq!(
            config.session_ttl_seconds(),
            super::DEFAULT_SESSION_TTL_SECONDS
        );
        assert!(config.session_cookie_secure());

        let config = config
            .with_otp_ttl_seconds(120)
            .with_resend_cooldown_seconds(30)
            .with_max_otp_attempts(3)
            .with_session_ttl_seconds(3600);

        assert_eq!(config.otp_ttl_seconds(), 120);
        assert_eq!(config.resend_cooldown_seconds(), 30);
        assert_eq!(config.max_otp_attempts(), 3);
        assert_eq!(config.session_ttl_seconds(), 3600);
    }

    #[test]
    fn plain_http_frontend_is_not_secure() {
        let config = AuthConfig::new("http://localhost:3000".to_string());
        assert!(!config.session_cookie_secure());
    }

    #[test]
    fn auth_state_without_google_verifier() {
        let config = AuthConfig::new("https://bodega.dev".to_string());
        let tokens = TokenService::new(SecretString::from("secret".to_string()), 3600);
        let state = AuthState::new(config, tokens, None);
        assert!(state.google().is_none());
        assert_eq!(state.tokens().ttl_seconds(), 3600);
    }
}
