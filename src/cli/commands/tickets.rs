use clap::{Arg, ArgMatches, Command};

pub const ARG_TGT_TTL: &str = "tgt-ttl";
pub const ARG_ST_TTL: &str = "st-ttl";
pub const ARG_RESET_TTL: &str = "reset-ttl";
pub const ARG_SWEEP_INTERVAL: &str = "sweep-interval";

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_TGT_TTL)
                .long(ARG_TGT_TTL)
                .help("Ticket-granting ticket (login cookie) lifetime in seconds")
                .env("STAFFIO_TGT_TTL")
                .default_value("28800")
                .value_parser(clap::value_parser!(i64).range(1..)),
        )
        .arg(
            Arg::new(ARG_ST_TTL)
                .long(ARG_ST_TTL)
                .help("Service ticket lifetime in seconds")
                .env("STAFFIO_ST_TTL")
                .default_value("300")
                .value_parser(clap::value_parser!(i64).range(1..)),
        )
        .arg(
            Arg::new(ARG_RESET_TTL)
                .long(ARG_RESET_TTL)
                .help("Password reset token lifetime in seconds")
                .env("STAFFIO_RESET_TTL")
                .default_value("1800")
                .value_parser(clap::value_parser!(i64).range(1..)),
        )
        .arg(
            Arg::new(ARG_SWEEP_INTERVAL)
                .long(ARG_SWEEP_INTERVAL)
                .help("Seconds between purges of expired tickets and tokens")
                .env("STAFFIO_SWEEP_INTERVAL")
                .default_value("60")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
}

#[derive(Debug, Clone, Copy)]
pub struct Options {
    pub tgt_ttl_seconds: i64,
    pub st_ttl_seconds: i64,
    pub reset_ttl_seconds: i64,
    pub sweep_interval_seconds: u64,
}

impl Options {
    #[must_use]
    pub fn parse(matches: &ArgMatches) -> Self {
        Self {
            tgt_ttl_seconds: matches
                .get_one::<i64>(ARG_TGT_TTL)
                .copied()
                .unwrap_or(8 * 60 * 60),
            st_ttl_seconds: matches.get_one::<i64>(ARG_ST_TTL).copied().unwrap_or(300),
            reset_ttl_seconds: matches
                .get_one::<i64>(ARG_RESET_TTL)
                .copied()
                .unwrap_or(30 * 60),
            sweep_interval_seconds: matches
                .get_one::<u64>(ARG_SWEEP_INTERVAL)
                .copied()
                .unwrap_or(60),
        }
    }
}
