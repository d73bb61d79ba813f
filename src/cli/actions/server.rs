use crate::{
    accounts::PgUserAccountStore,
    api,
    cli::telemetry,
    notify::{LogNotificationSender, NotificationSender, WebhookNotificationSender},
    token::TokenIssuer,
    verification::{PgVerificationStore, VerificationConfig, VerificationEngine},
};
use anyhow::{Context, Result};
use secrecy::SecretString;
use sqlx::postgres::PgPoolOptions;
use std::{sync::Arc, time::Duration};
use tracing::info;
use url::Url;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: String,
    pub token_secret: SecretString,
    pub session_ttl_seconds: i64,
    pub code_ttl_seconds: i64,
    pub action_ttl_seconds: i64,
    pub store_timeout_seconds: u64,
    pub code_length: usize,
    pub correlation_length: usize,
    pub max_code_attempts: u32,
    pub notify_webhook_url: Option<Url>,
    pub notify_webhook_token: Option<SecretString>,
}

impl Args {
    fn verification_config(&self) -> VerificationConfig {
        VerificationConfig::new()
            .with_session_ttl_seconds(self.session_ttl_seconds)
            .with_code_ttl_seconds(self.code_ttl_seconds)
            .with_action_ttl_seconds(self.action_ttl_seconds)
            .with_store_timeout_seconds(self.store_timeout_seconds)
            .with_code_length(self.code_length)
            .with_correlation_length(self.correlation_length)
            .with_max_code_attempts(self.max_code_attempts)
    }
}

/// Execute the server action.
/// # Errors
/// Returns an error if the token secret is rejected, the database is unreachable, or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    log_startup_args(&args);

    let config = args.verification_config();
    let tokens = TokenIssuer::new(&args.token_secret).context("Invalid token secret")?;

    let pool = PgPoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .max_lifetime(Duration::from_secs(120))
        .acquire_timeout(config.store_timeout())
        .test_before_acquire(true)
        .connect(&args.dsn)
        .await
        .context("Failed to connect to database")?;

    let notifier: Arc<dyn NotificationSender> = match args.notify_webhook_url {
        Some(url) => Arc::new(
            WebhookNotificationSender::new(url, args.notify_webhook_token)
                .context("Failed to build notification webhook client")?,
        ),
        None => Arc::new(LogNotificationSender),
    };

    let engine = VerificationEngine::new(
        config,
        tokens,
        Arc::new(PgVerificationStore::new(pool.clone())),
        Arc::new(PgUserAccountStore::new(pool)),
    )
    .with_notifier(notifier);

    let result = api::new(args.port, Arc::new(engine), async {
        let _ = tokio::signal::ctrl_c().await;
    })
    .await;

    telemetry::shutdown_tracer();

    result
}

fn log_startup_args(args: &Args) {
    let entries = [
        ("listen", format!("tcp:{}", args.port)),
        ("dsn", redact_dsn(&args.dsn)),
        ("session_ttl_seconds", args.session_ttl_seconds.to_string()),
        ("code_ttl_seconds", args.code_ttl_seconds.to_string()),
        ("action_ttl_seconds", args.action_ttl_seconds.to_string()),
        (
            "store_timeout_seconds",
            args.store_timeout_seconds.to_string(),
        ),
        ("code_length", args.code_length.to_string()),
        ("correlation_length", args.correlation_length.to_string()),
        ("max_code_attempts", args.max_code_attempts.to_string()),
        (
            "notify",
            args.notify_webhook_url
                .as_ref()
                .map_or_else(|| "log".to_string(), redact_url),
        ),
        (
            "notify_webhook_token_set",
            args.notify_webhook_token.is_some().to_string(),
        ),
    ];
    log_entries("Startup configuration", &entries);
}

fn redact_dsn(dsn: &str) -> String {
    match Url::parse(dsn) {
        Ok(parsed) => redact_url(&parsed),
        Err(_) => "invalid-dsn".to_string(),
    }
}

fn redact_url(url: &Url) -> String {
    let mut parsed = url.clone();
    if parsed.password().is_some() {
        let _ = parsed.set_password(Some("REDACTED"));
    }
    parsed.to_string()
}

fn log_entries(title: &str, entries: &[(&str, String)]) {
    let max_key_len = entries.iter().map(|(key, _)| key.len()).max().unwrap_or(0);
    let mut message = format!(
        "{} {} - {}\n\n{title}:",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        short_commit(crate::GIT_COMMIT_HASH)
    );
    for (key, value) in entries {
        let padding = " ".repeat(max_key_len.saturating_sub(key.len()));
        let _ =
            std::fmt::Write::write_fmt(&mut message, format_args!("\n  {key}:{padding} {value}"));
    }
    info!("{message}");
}

fn short_commit(hash: &str) -> String {
    let trimmed = hash.trim();
    if trimmed.len() > 7 {
        trimmed[..7].to_string()
    } else {
        trimmed.to_string()
    }
}
