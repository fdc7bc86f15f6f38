use clap::{Arg, ArgAction, ArgMatches, Command, builder::BoolishValueParser};
use secrecy::SecretString;
use std::time::Duration;

pub const ARG_REDIS_URL: &str = "redis-url";
pub const ARG_REDIS_POOL_SIZE: &str = "redis-pool-size";
pub const ARG_CACHE_TTL_SECONDS: &str = "cache-ttl-seconds";
pub const ARG_CACHE_TIMEOUT_MILLIS: &str = "cache-timeout-millis";
pub const ARG_CACHE_STRICT: &str = "cache-strict";

#[derive(Debug, Clone)]
pub struct Options {
    /// `None` disables the principal cache.
    pub redis_url: Option<SecretString>,
    pub pool_size: usize,
    pub ttl: Duration,
    pub timeout: Duration,
    pub strict: bool,
}

impl Options {
    #[must_use]
    pub fn parse(matches: &ArgMatches) -> Self {
        Self {
            redis_url: matches
                .get_one::<String>(ARG_REDIS_URL)
                .filter(|v| !v.trim().is_empty())
                .map(|v| SecretString::from(v.clone())),
            pool_size: matches
                .get_one::<usize>(ARG_REDIS_POOL_SIZE)
                .copied()
                .unwrap_or(4),
            ttl: Duration::from_secs(
                matches
                    .get_one::<u64>(ARG_CACHE_TTL_SECONDS)
                    .copied()
                    .unwrap_or(60),
            ),
            timeout: Duration::from_millis(
                matches
                    .get_one::<u64>(ARG_CACHE_TIMEOUT_MILLIS)
                    .copied()
                    .unwrap_or(2000),
            ),
            strict: matches.get_flag(ARG_CACHE_STRICT),
        }
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_REDIS_URL)
                .long(ARG_REDIS_URL)
                .help("Redis URL for the principal cache (cache disabled when unset)")
                .env("AGORA_REDIS_URL")
                .hide_env_values(true),
        )
        .arg(
            Arg::new(ARG_REDIS_POOL_SIZE)
                .long(ARG_REDIS_POOL_SIZE)
                .help("Number of Redis connections")
                .env("AGORA_REDIS_POOL_SIZE")
                .default_value("4")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new(ARG_CACHE_TTL_SECONDS)
                .long(ARG_CACHE_TTL_SECONDS)
                .help("Lifetime of cached principals in seconds")
                .env("AGORA_CACHE_TTL_SECONDS")
                .default_value("60")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new(ARG_CACHE_TIMEOUT_MILLIS)
                .long(ARG_CACHE_TIMEOUT_MILLIS)
                .help("Upper bound for a single cache call in milliseconds")
                .env("AGORA_CACHE_TIMEOUT_MILLIS")
                .default_value("2000")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new(ARG_CACHE_STRICT)
                .long(ARG_CACHE_STRICT)
                .help("Fail requests on cache errors instead of falling back to the database")
                .env("AGORA_CACHE_STRICT")
                .action(ArgAction::SetTrue)
                .value_parser(BoolishValueParser::new()),
        )
}
