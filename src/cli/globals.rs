use secrecy::SecretString;

/// Configuration shared by the server and its services.
///
/// Built once from CLI/environment arguments at startup and passed down
/// explicitly; services never read secrets from the process environment.
#[derive(Debug, Clone)]
pub struct GlobalArgs {
    pub token_secret: SecretString,
    pub frontend_base_url: String,
    pub google_client_id: Option<String>,
}

impl GlobalArgs {
    #[must_use]
    pub fn new(token_secret: SecretString, frontend_base_url: String) -> Self {
        Self {
            token_secret,
            frontend_base_url,
            google_client_id: None,
        }
    }

    #[must_use]
    pub fn with_google_client_id(mut self, client_id: Option<String>) -> Self {
        self.google_client_id = client_id;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn test_global_args() {
        let args = GlobalArgs::new(
            SecretString::from("top-secret".to_string()),
            "https://bodega.dev".to_string(),
        );
        assert_eq!(args.token_secret.expose_secret(), "top-secret");
        assert_eq!(args.frontend_base_url, "https://bodega.dev");
        assert!(args.google_client_id.is_none());

        let args = args.with_google_client_id(Some("client-id".to_string()));
        assert_eq!(args.google_client_id.as_deref(), Some("client-id"));
    }
}
