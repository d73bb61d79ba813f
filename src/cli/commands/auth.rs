use clap::{Arg, Command};

pub const ARG_TOKEN_SECRET: &str = "token-secret";
pub const ARG_SESSION_TTL_SECONDS: &str = "session-ttl-seconds";
pub const ARG_CODE_TTL_SECONDS: &str = "code-ttl-seconds";
pub const ARG_ACTION_TTL_SECONDS: &str = "action-ttl-seconds";
pub const ARG_STORE_TIMEOUT_SECONDS: &str = "store-timeout-seconds";
pub const ARG_CODE_LENGTH: &str = "code-length";
pub const ARG_CORRELATION_LENGTH: &str = "correlation-length";
pub const ARG_MAX_CODE_ATTEMPTS: &str = "max-code-attempts";

#[must_use]
pub fn with_args(command: Command) -> Command {
    let command = with_token_args(command);
    let command = with_window_args(command);
    with_code_args(command)
}

fn with_token_args(command: Command) -> Command {
    command.arg(
        Arg::new(ARG_TOKEN_SECRET)
            .long(ARG_TOKEN_SECRET)
            .help("HMAC secret used to sign access and action tokens (at least 32 bytes)")
            .env("STOCKPILE_TOKEN_SECRET")
            .hide_env_values(true)
            .required(true),
    )
}

fn with_window_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_SESSION_TTL_SECONDS)
                .long(ARG_SESSION_TTL_SECONDS)
                .help("Lifetime of an access session in seconds")
                .env("STOCKPILE_SESSION_TTL_SECONDS")
                .default_value("86400")
                .value_parser(clap::value_parser!(i64).range(1..)),
        )
        .arg(
            Arg::new(ARG_CODE_TTL_SECONDS)
                .long(ARG_CODE_TTL_SECONDS)
                .help("Seconds a verification code stays valid")
                .env("STOCKPILE_CODE_TTL_SECONDS")
                .default_value("300")
                .value_parser(clap::value_parser!(i64).range(1..)),
        )
        .arg(
            Arg::new(ARG_ACTION_TTL_SECONDS)
                .long(ARG_ACTION_TTL_SECONDS)
                .help("Seconds an action token stays valid after the code is confirmed")
                .env("STOCKPILE_ACTION_TTL_SECONDS")
                .default_value("900")
                .value_parser(clap::value_parser!(i64).range(1..)),
        )
        .arg(
            Arg::new(ARG_STORE_TIMEOUT_SECONDS)
                .long(ARG_STORE_TIMEOUT_SECONDS)
                .help("Deadline for every database call in seconds")
                .env("STOCKPILE_STORE_TIMEOUT_SECONDS")
                .default_value("60")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
}

fn with_code_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_CODE_LENGTH)
                .long(ARG_CODE_LENGTH)
                .help("Number of digits in a verification code")
                .env("STOCKPILE_CODE_LENGTH")
                .default_value("6")
                .value_parser(clap::value_parser!(u8).range(4..=12)),
        )
        .arg(
            Arg::new(ARG_CORRELATION_LENGTH)
                .long(ARG_CORRELATION_LENGTH)
                .help("Number of characters in the correlation id sent with a code")
                .env("STOCKPILE_CORRELATION_LENGTH")
                .default_value("4")
                .value_parser(clap::value_parser!(u8).range(2..=16)),
        )
        .arg(
            Arg::new(ARG_MAX_CODE_ATTEMPTS)
                .long(ARG_MAX_CODE_ATTEMPTS)
                .help("Wrong codes allowed before a verification reference is revoked")
                .env("STOCKPILE_MAX_CODE_ATTEMPTS")
                .default_value("5")
                .value_parser(clap::value_parser!(u32).range(1..=100)),
        )
}
