//! Verification reference model.

use crate::error::{AuthError, Expiry, Mismatch};
use anyhow::anyhow;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use time::OffsetDateTime;
use utoipa::ToSchema;
use uuid::Uuid;

pub const ACCESS_SESSION: &str = "access-session";
pub const SET_PASSWORD: &str = "set-password";

static OBJECTIVE_PATTERN: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"^[a-z0-9-]{1,64}$").ok());

/// Tag naming the action a reference authorizes.
#[derive(ToSchema, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Objective(String);

impl Objective {
    #[must_use]
    pub fn access_session() -> Self {
        Self(ACCESS_SESSION.to_string())
    }

    #[must_use]
    pub fn set_password() -> Self {
        Self(SET_PASSWORD.to_string())
    }

    /// Parse a caller-supplied objective: lowercase letters, digits and `-`.
    ///
    /// # Errors
    /// Returns a validation error for empty, oversized or malformed tags.
    pub fn parse(value: &str) -> Result<Self, AuthError> {
        let value = value.trim();
        if OBJECTIVE_PATTERN
            .as_ref()
            .map_or(false, |re| re.is_match(value)) {
            Ok(Self(value.to_string()))
        } else {
            Err(AuthError::Validation(format!("invalid objective: {value:?}")))
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn is_access_session(&self) -> bool {
        self.0 == ACCESS_SESSION
    }
}

impl fmt::Display for Objective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Out-of-band delivery destination kind.
#[derive(ToSchema, Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Channel {
    Email,
    Mobile,
    /// Password login; never used for code delivery.
    Username,
}

impl Channel {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Email => "EMAIL",
            Self::Mobile => "MOBILE",
            Self::Username => "USERNAME",
        }
    }
}

impl FromStr for Channel {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> anyhow::Result<Self> {
        match value {
            "EMAIL" => Ok(Self::Email),
            "MOBILE" => Ok(Self::Mobile),
            "USERNAME" => Ok(Self::Username),
            other => Err(anyhow!("unknown channel: {other}")),
        }
    }
}

#[derive(ToSchema, Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReferenceStatus {
    Inactive,
    Active,
}

impl ReferenceStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Inactive => "INACTIVE",
            Self::Active => "ACTIVE",
        }
    }
}

impl FromStr for ReferenceStatus {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> anyhow::Result<Self> {
        match value {
            "INACTIVE" => Ok(Self::Inactive),
            "ACTIVE" => Ok(Self::Active),
            other => Err(anyhow!("unknown reference status: {other}")),
        }
    }
}

/// Delivery binding written when a channel is selected.
#[derive(Clone)]
pub struct ChannelBinding {
    pub channel: Channel,
    pub channel_info: String,
    pub correlation_id: String,
    pub code: String,
    pub expires_at: OffsetDateTime,
}

/// The persisted one-time verification or session record.
#[derive(Clone, PartialEq, Eq)]
pub struct VerificationReference {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub objective: Objective,
    pub channel: Option<Channel>,
    pub channel_info: Option<String>,
    pub correlation_id: Option<String>,
    pub code: Option<String>,
    pub status: ReferenceStatus,
    /// Wrong codes submitted so far.
    pub failed_attempts: u32,
    pub created_at: OffsetDateTime,
    pub expires_at: OffsetDateTime,
    pub revoked_at: Option<OffsetDateTime>,
}

impl VerificationReference {
    /// A fresh `INACTIVE` reference with no channel or code.
    #[must_use]
    pub fn pending(
        owner_id: Uuid,
        objective: Objective,
        now: OffsetDateTime,
        expires_at: OffsetDateTime,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner_id,
            objective,
            channel: None,
            channel_info: None,
            correlation_id: None,
            code: None,
            status: ReferenceStatus::Inactive,
            failed_attempts: 0,
            created_at: now,
            expires_at,
            revoked_at: None,
        }
    }

    /// An `ACTIVE` reference that skipped the code step.
    #[must_use]
    pub fn active(
        owner_id: Uuid,
        objective: Objective,
        channel: Channel,
        channel_info: String,
        now: OffsetDateTime,
        expires_at: OffsetDateTime,
    ) -> Self {
        Self {
            channel: Some(channel),
            channel_info: Some(channel_info),
            status: ReferenceStatus::Active,
            ..Self::pending(owner_id, objective, now, expires_at)
        }
    }

    /// Expiry is closed-open: `expires_at == now` is already expired.
    #[must_use]
    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        now >= self.expires_at
    }

    #[must_use]
    pub const fn is_revoked(&self) -> bool {
        self.revoked_at.is_some()
    }

    #[must_use]
    pub fn authorizes(&self, objective: &Objective, now: OffsetDateTime) -> bool {
        self.ensure_authorizes(objective, now).is_ok()
    }

    /// Check that this reference currently authorizes `expected`.
    ///
    /// # Errors
    /// Revoked, expired, inactive and objective failures each get their own reason,
    /// checked in that order.
    pub fn ensure_authorizes(
        &self,
        expected: &Objective,
        now: OffsetDateTime,
    ) -> Result<(), AuthError> {
        if self.is_revoked() {
            return Err(AuthError::StatusMismatch(Mismatch::Revoked));
        }
        if self.is_expired_at(now) {
            return Err(AuthError::Expired(Expiry::Reference));
        }
        if self.status != ReferenceStatus::Active {
            return Err(AuthError::StatusMismatch(Mismatch::NotActive));
        }
        if self.objective != *expected {
            return Err(AuthError::StatusMismatch(Mismatch::WrongObjective));
        }
        Ok(())
    }
}

impl fmt::Debug for VerificationReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VerificationReference")
            .field("id", &self.id)
            .field("owner_id", &self.owner_id)
            .field("objective", &self.objective)
            .field("channel", &self.channel)
            .field("correlation_id", &self.correlation_id)
            .field("code", &self.code.as_ref().map(|_| "<redacted>"))
            .field("status", &self.status)
            .field("failed_attempts", &self.failed_attempts)
            .field("created_at", &self.created_at)
            .field("expires_at", &self.expires_at)
            .field("revoked_at", &self.revoked_at)
            .finish_non_exhaustive()
    }
}

/// Hide most of a destination so the challenge does not leak contact details.
#[must_use]
pub fn mask_destination(channel: Channel, destination: &str) -> String {
    match channel {
        Channel::Email => match destination.split_once('@') {
            Some((local, domain)) => {
                let first = local.chars().next().map(String::from).unwrap_or_default();
                format!("{first}***@{domain}")
            }
            None => "***".to_string(),
        },
        Channel::Mobile => {
            let digits: Vec<char> = destination.chars().collect();
            let keep = digits.len().min(4);
            let hidden = digits.len() - keep;
            let tail: String = digits[hidden..].iter().collect();
            format!("{}{tail}", "*".repeat(hidden))
        }
        Channel::Username => destination.to_string(),
    }
}
