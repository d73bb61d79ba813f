use clap::{Arg, Command};

pub const ARG_NOTIFY_WEBHOOK_URL: &str = "notify-webhook-url";
pub const ARG_NOTIFY_WEBHOOK_TOKEN: &str = "notify-webhook-token";

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_NOTIFY_WEBHOOK_URL)
                .long(ARG_NOTIFY_WEBHOOK_URL)
                .help("Webhook that delivers verification codes; codes are logged when unset")
                .env("STOCKPILE_NOTIFY_WEBHOOK_URL"),
        )
        .arg(
            Arg::new(ARG_NOTIFY_WEBHOOK_TOKEN)
                .long(ARG_NOTIFY_WEBHOOK_TOKEN)
                .help("Bearer token sent to the notification webhook")
                .env("STOCKPILE_NOTIFY_WEBHOOK_TOKEN")
                .hide_env_values(true)
                .requires(ARG_NOTIFY_WEBHOOK_URL),
        )
}
