use crate::cli::{
    actions::{server::Args, Action},
    commands::{auth, notify},
};
use anyhow::{Context, Result};
use secrecy::SecretString;
use url::Url;

/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>("port").copied().unwrap_or(8080);
    let dsn = matches
        .get_one::<String>("dsn")
        .cloned()
        .context("missing required argument: --dsn")?;

    let token_secret = matches
        .get_one::<String>(auth::ARG_TOKEN_SECRET)
        .cloned()
        .map(SecretString::from)
        .context("missing required argument: --token-secret")?;

    let session_ttl_seconds = matches
        .get_one::<i64>(auth::ARG_SESSION_TTL_SECONDS)
        .copied()
        .context("missing required argument: --session-ttl-seconds")?;
    let code_ttl_seconds = matches
        .get_one::<i64>(auth::ARG_CODE_TTL_SECONDS)
        .copied()
        .context("missing required argument: --code-ttl-seconds")?;
    let action_ttl_seconds = matches
        .get_one::<i64>(auth::ARG_ACTION_TTL_SECONDS)
        .copied()
        .context("missing required argument: --action-ttl-seconds")?;
    let store_timeout_seconds = matches
        .get_one::<u64>(auth::ARG_STORE_TIMEOUT_SECONDS)
        .copied()
        .context("missing required argument: --store-timeout-seconds")?;
    let code_length = matches
        .get_one::<u8>(auth::ARG_CODE_LENGTH)
        .copied()
        .context("missing required argument: --code-length")?;
    let correlation_length = matches
        .get_one::<u8>(auth::ARG_CORRELATION_LENGTH)
        .copied()
        .context("missing required argument: --correlation-length")?;
    let max_code_attempts = matches
        .get_one::<u32>(auth::ARG_MAX_CODE_ATTEMPTS)
        .copied()
        .context("missing required argument: --max-code-attempts")?;

    let notify_webhook_url = matches
        .get_one::<String>(notify::ARG_NOTIFY_WEBHOOK_URL)
        .map(|raw| Url::parse(raw))
        .transpose()
        .context("invalid --notify-webhook-url")?;
    let notify_webhook_token = matches
        .get_one::<String>(notify::ARG_NOTIFY_WEBHOOK_TOKEN)
        .cloned()
        .map(SecretString::from);

    Ok(Action::Server(Args {
        port,
        dsn,
        token_secret,
        session_ttl_seconds,
        code_ttl_seconds,
        action_ttl_seconds,
        store_timeout_seconds,
        code_length: usize::from(code_length),
        correlation_length: usize::from(correlation_length),
        max_code_attempts,
        notify_webhook_url,
        notify_webhook_token,
    }))
}
