use clap::{Arg, ArgAction, ArgMatches, Command, builder::BoolishValueParser};
use std::time::Duration;

use crate::auth::RateLimitConfig;

pub const ARG_RATE_LIMIT_REQUESTS: &str = "rate-limit-requests";
pub const ARG_RATE_LIMIT_WINDOW_SECONDS: &str = "rate-limit-window-seconds";
pub const ARG_RATE_LIMIT_DISABLED: &str = "rate-limit-disabled";

#[must_use]
pub fn parse(matches: &ArgMatches) -> RateLimitConfig {
    let defaults = RateLimitConfig::default();
    RateLimitConfig {
        requests_per_window: matches
            .get_one::<u32>(ARG_RATE_LIMIT_REQUESTS)
            .copied()
            .unwrap_or(defaults.requests_per_window),
        window: matches
            .get_one::<u64>(ARG_RATE_LIMIT_WINDOW_SECONDS)
            .copied()
            .map_or(defaults.window, Duration::from_secs),
        enabled: !matches.get_flag(ARG_RATE_LIMIT_DISABLED),
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_RATE_LIMIT_REQUESTS)
                .long(ARG_RATE_LIMIT_REQUESTS)
                .help("Requests admitted per client and window")
                .env("AGORA_RATE_LIMIT_REQUESTS")
                .default_value("20")
                .value_parser(clap::value_parser!(u32).range(1..)),
        )
        .arg(
            Arg::new(ARG_RATE_LIMIT_WINDOW_SECONDS)
                .long(ARG_RATE_LIMIT_WINDOW_SECONDS)
                .help("Rate limit window in seconds")
                .env("AGORA_RATE_LIMIT_WINDOW_SECONDS")
                .default_value("5")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new(ARG_RATE_LIMIT_DISABLED)
                .long(ARG_RATE_LIMIT_DISABLED)
                .help("Admit every request")
                .env("AGORA_RATE_LIMIT_DISABLED")
                .action(ArgAction::SetTrue)
                .value_parser(BoolishValueParser::new()),
        )
}
