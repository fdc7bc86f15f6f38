use clap::{Arg, ArgMatches, Command};
use secrecy::SecretString;
use std::time::Duration;

pub const ARG_TOKEN_SECRET: &str = "token-secret";
pub const ARG_TOKEN_ISSUER: &str = "token-issuer";
pub const ARG_TOKEN_TTL_SECONDS: &str = "token-ttl-seconds";
pub const ARG_INVITATION_TTL_SECONDS: &str = "invitation-ttl-seconds";
pub const ARG_BASIC_AUTH_USER: &str = "basic-auth-user";
pub const ARG_BASIC_AUTH_PASS: &str = "basic-auth-pass";

const THREE_DAYS: &str = "259200";
/// Upper bound for configurable lifetimes: one year.
pub const MAX_TTL_SECONDS: u64 = 31_536_000;

#[derive(Debug, Clone)]
pub struct Options {
    pub token_secret: SecretString,
    pub token_issuer: String,
    pub token_ttl: Duration,
    pub invitation_ttl: Duration,
    pub basic_auth_user: String,
    pub basic_auth_pass: SecretString,
}

impl Options {
    /// Parse token and operator credentials from matches.
    ///
    /// # Errors
    /// Returns an error if a secret is missing or blank.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        let required_secret = |id: &str| -> anyhow::Result<SecretString> {
            match matches.get_one::<String>(id) {
                Some(value) if !value.trim().is_empty() => {
                    Ok(SecretString::from(value.clone()))
                }
                _ => anyhow::bail!("missing required argument: --{id}"),
            }
        };

        let seconds = |id: &str, default: u64| {
            Duration::from_secs(matches.get_one::<u64>(id).copied().unwrap_or(default))
        };

        Ok(Self {
            token_secret: required_secret(ARG_TOKEN_SECRET)?,
            token_issuer: matches
                .get_one::<String>(ARG_TOKEN_ISSUER)
                .cloned()
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| "agora-api".to_string()),
            token_ttl: seconds(ARG_TOKEN_TTL_SECONDS, 259_200),
            invitation_ttl: seconds(ARG_INVITATION_TTL_SECONDS, 259_200),
            basic_auth_user: matches
                .get_one::<String>(ARG_BASIC_AUTH_USER)
                .cloned()
                .unwrap_or_else(|| "admin".to_string()),
            basic_auth_pass: required_secret(ARG_BASIC_AUTH_PASS)?,
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_TOKEN_SECRET)
                .long(ARG_TOKEN_SECRET)
                .help("HMAC secret used to sign bearer tokens")
                .env("AGORA_TOKEN_SECRET")
                .hide_env_values(true)
                .required(true),
        )
        .arg(
            Arg::new(ARG_TOKEN_ISSUER)
                .long(ARG_TOKEN_ISSUER)
                .help("Service name used as bearer token issuer and audience")
                .env("AGORA_TOKEN_ISSUER")
                .default_value("agora-api"),
        )
        .arg(
            Arg::new(ARG_TOKEN_TTL_SECONDS)
                .long(ARG_TOKEN_TTL_SECONDS)
                .help("Bearer token lifetime in seconds")
                .env("AGORA_TOKEN_TTL_SECONDS")
                .default_value(THREE_DAYS)
                .value_parser(clap::value_parser!(u64).range(1..=MAX_TTL_SECONDS)),
        )
        .arg(
            Arg::new(ARG_INVITATION_TTL_SECONDS)
                .long(ARG_INVITATION_TTL_SECONDS)
                .help("Activation invitation lifetime in seconds")
                .env("AGORA_INVITATION_TTL_SECONDS")
                .default_value(THREE_DAYS)
                .value_parser(clap::value_parser!(u64).range(1..=MAX_TTL_SECONDS)),
        )
        .arg(
            Arg::new(ARG_BASIC_AUTH_USER)
                .long(ARG_BASIC_AUTH_USER)
                .help("Operator username for basic-auth routes")
                .env("AGORA_BASIC_AUTH_USER")
                .default_value("admin"),
        )
        .arg(
            Arg::new(ARG_BASIC_AUTH_PASS)
                .long(ARG_BASIC_AUTH_PASS)
                .help("Operator password for basic-auth routes")
                .env("AGORA_BASIC_AUTH_PASS")
                .hide_env_values(true)
                .required(true),
        )
}
