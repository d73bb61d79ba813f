//! Out-of-band delivery of verification codes.
//!
//! Flow Overview: the engine composes a [`Notification`] when a channel is
//! selected and hands it to [`dispatch`], which delivers it on a spawned task.
//! Delivery failures are logged and never reach the caller; a user who does
//! not receive a code simply selects the channel again.

use crate::{verification::Channel, APP_USER_AGENT};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use std::{sync::Arc, time::Duration};
use tracing::{debug, error, info, Instrument};
use url::Url;
use uuid::Uuid;

const WEBHOOK_TIMEOUT_SECONDS: u64 = 10;

#[derive(Clone, Serialize)]
pub struct Notification {
    pub reference_id: Uuid,
    pub channel: Channel,
    pub destination: String,
    pub body: String,
}

impl Notification {
    /// The message a user receives after selecting a channel.
    #[must_use]
    pub fn verification_code(
        reference_id: Uuid,
        channel: Channel,
        destination: String,
        correlation_id: &str,
        code: &str,
    ) -> Self {
        Self {
            reference_id,
            channel,
            destination,
            body: format!("RefId: {correlation_id} Code: {code}"),
        }
    }
}

impl std::fmt::Debug for Notification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notification")
            .field("reference_id", &self.reference_id)
            .field("channel", &self.channel)
            .field("destination", &self.destination)
            .finish_non_exhaustive()
    }
}

/// Delivery abstraction for verification codes.
#[async_trait]
pub trait NotificationSender: Send + Sync {
    /// Deliver a message or return an error describing why it was not sent.
    async fn send(&self, message: &Notification) -> Result<()>;
}

/// Local dev sender that logs the message instead of delivering it.
#[derive(Clone, Debug)]
pub struct LogNotificationSender;

#[async_trait]
impl NotificationSender for LogNotificationSender {
    async fn send(&self, message: &Notification) -> Result<()> {
        info!(
            reference_id = %message.reference_id,
            channel = message.channel.as_str(),
            destination = %message.destination,
            "notification send stub"
        );
        debug!(body = %message.body, "notification body");
        Ok(())
    }
}

/// Posts each message as JSON to an HTTP endpoint that owns SMS/email delivery.
#[derive(Clone, Debug)]
pub struct WebhookNotificationSender {
    client: Client,
    url: Url,
    token: Option<SecretString>,
}

impl WebhookNotificationSender {
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(url: Url, token: Option<SecretString>) -> Result<Self> {
        let client = Client::builder()
            .user_agent(APP_USER_AGENT)
            .timeout(Duration::from_secs(WEBHOOK_TIMEOUT_SECONDS))
            .build()
            .context("Failed to build notification HTTP client")?;
        Ok(Self { client, url, token })
    }
}

#[async_trait]
impl NotificationSender for WebhookNotificationSender {
    async fn send(&self, message: &Notification) -> Result<()> {
        let mut request = self.client.post(self.url.clone()).json(message);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token.expose_secret());
        }
        request
            .send()
            .await
            .context("notification webhook request failed")?
            .error_for_status()
            .context("notification webhook rejected the message")?;
        Ok(())
    }
}

/// Deliver `message` in the background. Errors are logged, not returned.
pub fn dispatch(sender: Arc<dyn NotificationSender>, message: Notification) {
    let span = tracing::info_span!(
        "notify.send",
        reference_id = %message.reference_id,
        channel = message.channel.as_str()
    );
    tokio::spawn(
        async move {
            if let Err(err) = sender.send(&message).await {
                error!("Failed to deliver verification code: {err:#}");
            }
        }
        .instrument(span),
    );
}
