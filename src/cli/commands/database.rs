use clap::{Arg, ArgMatches, Command};
use std::time::Duration;

pub const ARG_DSN: &str = "dsn";
pub const ARG_DB_MAX_CONNECTIONS: &str = "db-max-connections";
pub const ARG_DB_MAX_IDLE_SECONDS: &str = "db-max-idle-seconds";
pub const ARG_DB_QUERY_TIMEOUT_SECONDS: &str = "db-query-timeout-seconds";

#[derive(Debug, Clone)]
pub struct Options {
    pub dsn: String,
    pub max_connections: u32,
    pub max_idle: Duration,
    pub query_timeout: Duration,
}

impl Options {
    /// Parse database arguments from matches.
    ///
    /// # Errors
    /// Returns an error if the DSN is missing or blank.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        let dsn = match matches.get_one::<String>(ARG_DSN).cloned() {
            Some(value) if !value.trim().is_empty() => value,
            _ => anyhow::bail!("missing required argument: --{ARG_DSN}"),
        };

        Ok(Self {
            dsn,
            max_connections: matches
                .get_one::<u32>(ARG_DB_MAX_CONNECTIONS)
                .copied()
                .unwrap_or(30),
            max_idle: Duration::from_secs(
                matches
                    .get_one::<u64>(ARG_DB_MAX_IDLE_SECONDS)
                    .copied()
                    .unwrap_or(900),
            ),
            query_timeout: Duration::from_secs(
                matches
                    .get_one::<u64>(ARG_DB_QUERY_TIMEOUT_SECONDS)
                    .copied()
                    .unwrap_or(10),
            ),
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_DSN)
                .short('d')
                .long(ARG_DSN)
                .help("Database connection string")
                .env("AGORA_DSN")
                .required(true),
        )
        .arg(
            Arg::new(ARG_DB_MAX_CONNECTIONS)
                .long(ARG_DB_MAX_CONNECTIONS)
                .help("Maximum open connections in the pool")
                .env("AGORA_DB_MAX_CONNECTIONS")
                .default_value("30")
                .value_parser(clap::value_parser!(u32).range(1..)),
        )
        .arg(
            Arg::new(ARG_DB_MAX_IDLE_SECONDS)
                .long(ARG_DB_MAX_IDLE_SECONDS)
                .help("Close pooled connections idle longer than this")
                .env("AGORA_DB_MAX_IDLE_SECONDS")
                .default_value("900")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new(ARG_DB_QUERY_TIMEOUT_SECONDS)
                .long(ARG_DB_QUERY_TIMEOUT_SECONDS)
                .help("Upper bound for a single query")
                .env("AGORA_DB_QUERY_TIMEOUT_SECONDS")
                .default_value("10")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
}
