use std::path::PathBuf;

use clap::{
    builder::styling::{AnsiColor, Effects, Styles},
    Arg, ArgAction, ColorChoice, Command,
};

use crate::GIT_COMMIT_HASH;

pub const ARG_VERIFIER_KEYS: &str = "verifier-keys";
pub const ARG_INSECURE_VERIFIER: &str = "insecure-verifier";

pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    let long_version: &'static str = Box::leak(
        format!("{} ({GIT_COMMIT_HASH})", env!("CARGO_PKG_VERSION")).into_boxed_str(),
    );

    Command::new("sesamo")
        .about("QR-code passwordless session authentication")
        .version(env!("CARGO_PKG_VERSION"))
        .long_version(long_version)
        .color(ColorChoice::Auto)
        .styles(styles)
        .arg(
            Arg::new("port")
                .short('p')
                .long("port")
                .help("Port to listen on")
                .default_value("8080")
                .env("SESAMO_PORT")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new("base-url")
                .long("base-url")
                .help("Public base URL embedded in QR payloads")
                .default_value("http://localhost:8080")
                .env("SESAMO_BASE_URL"),
        )
        .arg(
            Arg::new("frontend-url")
                .long("frontend-url")
                .help("Frontend origin allowed by CORS and used for cookie attributes")
                .default_value("http://localhost:3000")
                .env("SESAMO_FRONTEND_URL"),
        )
        .arg(
            Arg::new("session-ttl")
                .long("session-ttl")
                .help("Session time-to-live in seconds")
                .default_value("300")
                .env("SESAMO_SESSION_TTL")
                .value_parser(clap::value_parser!(i64).range(1..)),
        )
        .arg(
            Arg::new("retention")
                .long("retention")
                .help("Seconds terminal sessions are kept before garbage collection")
                .default_value("600")
                .env("SESAMO_RETENTION")
                .value_parser(clap::value_parser!(i64).range(0..)),
        )
        .arg(
            Arg::new(ARG_VERIFIER_KEYS)
                .long(ARG_VERIFIER_KEYS)
                .help("JSON file mapping identities to base64url Ed25519 public keys")
                .env("SESAMO_VERIFIER_KEYS")
                .value_parser(clap::value_parser!(PathBuf))
                .conflicts_with(ARG_INSECURE_VERIFIER),
        )
        .arg(
            Arg::new(ARG_INSECURE_VERIFIER)
                .long(ARG_INSECURE_VERIFIER)
                .help("Accept every signature without verification (development only)")
                .env("SESAMO_INSECURE_VERIFIER")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("verbosity")
                .short('v')
                .long("verbose")
                .help("Verbosity level: -v WARN, -vv INFO, -vvv DEBUG, -vvvv TRACE (default: ERROR)")
                .global(true)
                .action(ArgAction::Count),
        )
}

/// Cross-argument validation clap cannot express: a verifier must be
/// configured one way or the other.
pub fn validate(matches: &clap::ArgMatches) -> Result<(), String> {
    let has_keys = matches.get_one::<PathBuf>(ARG_VERIFIER_KEYS).is_some();
    let insecure = matches.get_flag(ARG_INSECURE_VERIFIER);
    if !has_keys && !insecure {
        return Err(format!(
            "either --{ARG_VERIFIER_KEYS} or --{ARG_INSECURE_VERIFIER} is required"
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let matches = new().get_matches_from(["sesamo", "--insecure-verifier"]);
        assert_eq!(matches.get_one::<u16>("port").copied(), Some(8080));
        assert_eq!(
            matches.get_one::<String>("base-url").map(String::as_str),
            Some("http://localhost:8080")
        );
        assert_eq!(
            matches
                .get_one::<String>("frontend-url")
                .map(String::as_str),
            Some("http://localhost:3000")
        );
        assert_eq!(matches.get_one::<i64>("session-ttl").copied(), Some(300));
        assert_eq!(matches.get_one::<i64>("retention").copied(), Some(600));
        assert!(validate(&matches).is_ok());
    }

    #[test]
    fn verifier_is_required() {
        let matches = new().get_matches_from(["sesamo"]);
        assert!(validate(&matches).is_err());
    }

    #[test]
    fn key_file_satisfies_validation() {
        let matches = new().get_matches_from(["sesamo", "--verifier-keys", "/etc/sesamo/keys.json"]);
        assert!(validate(&matches).is_ok());
        assert_eq!(
            matches.get_one::<PathBuf>(ARG_VERIFIER_KEYS),
            Some(&PathBuf::from("/etc/sesamo/keys.json"))
        );
    }

    #[test]
    fn key_file_conflicts_with_insecure() {
        let result = new().try_get_matches_from([
            "sesamo",
            "--verifier-keys",
            "/etc/sesamo/keys.json",
            "--insecure-verifier",
        ]);
        let err = result.expect_err("conflict");
        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn zero_ttl_is_rejected() {
        let result =
            new().try_get_matches_from(["sesamo", "--insecure-verifier", "--session-ttl", "0"]);
        assert!(result.is_err());
    }

    #[test]
    fn verbosity_counts() {
        let matches = new().get_matches_from(["sesamo", "--insecure-verifier", "-vvv"]);
        assert_eq!(matches.get_one::<u8>("verbosity").copied(), Some(3));
    }
}
