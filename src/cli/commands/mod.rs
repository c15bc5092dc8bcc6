use clap::{
    builder::{
        styling::{AnsiColor, Effects, Styles},
        ValueParser,
    },
    Arg, ColorChoice, Command,
};

pub fn validator_log_level() -> ValueParser {
    ValueParser::from(move |level: &str| -> std::result::Result<u8, String> {
        if let Ok(parsed) = level.parse::<u8>() {
            // Successfully parsed as a number
            if parsed <= 5 {
                return Ok(parsed);
            }
        }

        match level.to_lowercase().as_str() {
            "error" => Ok(0),
            "warn" => Ok(1),
            "info" => Ok(2),
            "debug" => Ok(3),
            "trace" => Ok(4),
            _ => Err("invalid log level".to_string()),
        }
    })
}

pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    Command::new("bodega")
        .about("Multi-tenant inventory and billing API")
        .version(env!("CARGO_PKG_VERSION"))
        .color(ColorChoice::Auto)
        .styles(styles)
        .arg(
            Arg::new("port")
                .short('p')
                .long("port")
                .help("Port to listen on")
                .default_value("8080")
                .env("BODEGA_PORT")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new("dsn")
                .short('d')
                .long("dsn")
                .help("Database connection string")
                .env("BODEGA_DSN")
                .required(true),
        )
        .arg(
            Arg::new("token-secret")
                .long("token-secret")
                .help("Secret used to sign session tokens")
                .env("BODEGA_TOKEN_SECRET")
                .required(true),
        )
        .arg(
            Arg::new("frontend-url")
                .long("frontend-url")
                .help("Frontend base URL, used for CORS and cookie policy")
                .default_value("http://localhost:3000")
                .env("BODEGA_FRONTEND_URL"),
        )
        .arg(
            Arg::new("google-client-id")
                .long("google-client-id")
                .help("Google OAuth client id; Google sign-in is disabled when unset")
                .env("BODEGA_GOOGLE_CLIENT_ID"),
        )
        .arg(
            Arg::new("verbosity")
                .short('v')
                .long("verbose")
                .help("Verbosity level: ERROR, WARN, INFO, DEBUG, TRACE (default: ERROR)")
                .env("BODEGA_LOG_LEVEL")
                .global(true)
                .action(clap::ArgAction::Count)
                .value_parser(validator_log_level()),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new() {
        let command = new();

        assert_eq!(command.get_name(), "bodega");
        assert_eq!(
            command.get_about().unwrap().to_string(),
            "Multi-tenant inventory and billing API"
        );
        assert_eq!(
            command.get_version().unwrap().to_string(),
            env!("CARGO_PKG_VERSION")
        );
    }

    #[test]
    fn test_check_port_and_dsn() {
        let command = new();
        let matches = command.get_matches_from(vec![
            "bodega",
            "--port",
            "9090",
            "--dsn",
            "postgres://localhost/bodega",
            "--token-secret",
            "secret",
        ]);

        assert_eq!(matches.get_one::<u16>("port").copied(), Some(9090));
        assert_eq!(
            matches.get_one::<String>("dsn").map(String::as_str),
            Some("postgres://localhost/bodega")
        );
        assert_eq!(
            matches.get_one::<String>("frontend-url").map(String::as_str),
            Some("http://localhost:3000")
        );
    }

    #[test]
    fn test_log_level_env() {
        temp_env::with_var("BODEGA_LOG_LEVEL", Some("debug"), || {
            let matches = new().get_matches_from(vec![
                "bodega",
                "--dsn",
                "postgres://localhost/bodega",
                "--token-secret",
                "secret",
            ]);
            assert_eq!(matches.get_one::<u8>("verbosity").copied(), Some(3));
        });
    }

    #[test]
    fn test_log_level_validator() {
        let command =
            Command::new("probe").arg(Arg::new("level").long("level").value_parser(validator_log_level()));

        for (value, expected) in [("2", 2u8), ("debug", 3), ("trace", 4)] {
            let matches = command
                .clone()
                .try_get_matches_from(["probe", "--level", value])
                .unwrap();
            assert_eq!(matches.get_one::<u8>("level").copied(), Some(expected));
        }

        assert!(command
            .clone()
            .try_get_matches_from(["probe", "--level", "nope"])
            .is_err());
    }
}
