use crate::cli::{actions::Action, globals::GlobalArgs};
use anyhow::{Context, Result};
use secrecy::SecretString;

pub fn handler(matches: &clap::ArgMatches) -> Result<(Action, GlobalArgs)> {
    let action = Action::Server {
        port: matches.get_one::<u16>("port").copied().unwrap_or(8080),
        dsn: matches
            .get_one::<String>("dsn")
            .cloned()
            .context("missing required argument: --dsn")?,
    };

    let token_secret = matches
        .get_one::<String>("token-secret")
        .cloned()
        .context("missing required argument: --token-secret")?;

    let frontend_base_url = matches
        .get_one::<String>("frontend-url")
        .cloned()
        .unwrap_or_else(|| "http://localhost:3000".to_string());

    let globals = GlobalArgs::new(SecretString::from(token_secret), frontend_base_url)
        .with_google_client_id(matches.get_one::<String>("google-client-id").cloned());

    Ok((action, globals))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::commands;
    use secrecy::ExposeSecret;

    #[test]
    fn handler_builds_action_and_globals() -> Result<()> {
        let matches = commands::new().try_get_matches_from(vec![
            "bodega",
            "--port",
            "9090",
            "--dsn",
            "postgres://localhost/bodega",
            "--token-secret",
            "secret",
            "--google-client-id",
            "client-id",
        ])?;

        let (action, globals) = handler(&matches)?;

        let Action::Server { port, dsn } = action;
        assert_eq!(port, 9090);
        assert_eq!(dsn, "postgres://localhost/bodega");
        assert_eq!(globals.token_secret.expose_secret(), "secret");
        assert_eq!(globals.frontend_base_url, "http://localhost:3000");
        assert_eq!(globals.google_client_id.as_deref(), Some("client-id"));
        Ok(())
    }
}
