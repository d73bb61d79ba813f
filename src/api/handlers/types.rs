//! Request/response types for the HTTP API.

use crate::{
    accounts::{Role, UserAccount, UserStatus},
    verification::{
        mask_destination, Channel, ChannelOption, ChannelSelection, IssuedToken, Objective,
        ReferenceStatus, VerificationChallenge, VerificationReference,
    },
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(deny_unknown_fields)]
pub struct SignUpRequest {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(deny_unknown_fields)]
pub struct VerificationRequest {
    pub username: String,
    pub objective: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(deny_unknown_fields)]
pub struct ChannelRequest {
    pub reference_id: Uuid,
    pub channel: Channel,
    pub channel_info: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(deny_unknown_fields)]
pub struct CodeRequest {
    pub reference_id: Uuid,
    pub correlation_id: String,
    pub code: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(deny_unknown_fields)]
pub struct SetPasswordRequest {
    pub password: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(deny_unknown_fields)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(deny_unknown_fields)]
pub struct VerifyPasswordRequest {
    pub password: String,
    pub objective: String,
}

/// Replaces both destinations; an omitted field is cleared.
#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(deny_unknown_fields)]
pub struct ContactUpdateRequest {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(deny_unknown_fields)]
pub struct CreateUserRequest {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    /// Defaults to `USER`.
    #[serde(default)]
    pub role: Option<Role>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(deny_unknown_fields)]
pub struct StatusUpdateRequest {
    pub status: UserStatus,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(deny_unknown_fields)]
pub struct RoleUpdateRequest {
    pub role: Role,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct TokenResponse {
    pub token: String,
    pub reference_id: Uuid,
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
}

impl From<IssuedToken> for TokenResponse {
    fn from(issued: IssuedToken) -> Self {
        Self {
            token: issued.token,
            reference_id: issued.reference_id,
            expires_at: issued.expires_at,
        }
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ChannelHint {
    pub channel: Channel,
    pub destination_hint: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ChallengeResponse {
    pub reference_id: Uuid,
    pub channels: Vec<ChannelHint>,
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
}

impl From<VerificationChallenge> for ChallengeResponse {
    fn from(challenge: VerificationChallenge) -> Self {
        Self {
            reference_id: challenge.reference_id,
            channels: challenge
                .channels
                .into_iter()
                .map(|ChannelOption { channel, destination_hint }| ChannelHint {
                    channel,
                    destination_hint,
                })
                .collect(),
            expires_at: challenge.expires_at,
        }
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ChannelResponse {
    pub reference_id: Uuid,
    pub correlation_id: String,
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
}

impl From<ChannelSelection> for ChannelResponse {
    fn from(selection: ChannelSelection) -> Self {
        Self {
            reference_id: selection.reference_id,
            correlation_id: selection.correlation_id,
            expires_at: selection.expires_at,
        }
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct UserResponse {
    pub id: Uuid,
    pub username: String,
    pub role: Role,
    pub status: UserStatus,
    pub email: Option<String>,
    pub phone: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl From<UserAccount> for UserResponse {
    fn from(user: UserAccount) -> Self {
        Self {
            id: user.id,
            username: user.username,
            role: user.role,
            status: user.status,
            email: user.email,
            phone: user.phone,
            created_at: user.created_at,
        }
    }
}

/// A reference as shown to its owner. Never carries the code.
#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ReferenceSummary {
    pub id: Uuid,
    pub objective: Objective,
    pub channel: Option<Channel>,
    pub destination_hint: Option<String>,
    pub status: ReferenceStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
}

impl From<VerificationReference> for ReferenceSummary {
    fn from(reference: VerificationReference) -> Self {
        let destination_hint = reference
            .channel
            .zip(reference.channel_info.as_deref())
            .map(|(channel, info)| mask_destination(channel, info));
        Self {
            id: reference.id,
            objective: reference.objective,
            channel: reference.channel,
            destination_hint,
            status: reference.status,
            created_at: reference.created_at,
            expires_at: reference.expires_at,
        }
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct VerificationInfoResponse {
    pub reference: ReferenceSummary,
    pub user: UserResponse,
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use time::Duration;

    #[test]
    fn requests_reject_unknown_fields() {
        let parsed: Result<LoginRequest, _> = serde_json::from_str(
            r#"{"username":"alice","password":"correct horse","role":"ADMIN"}"#,
        );
        assert!(parsed.is_err());
    }

    #[test]
    fn contact_update_fields_are_optional() -> Result<()> {
        let request: ContactUpdateRequest = serde_json::from_str(r#"{"phone":"+15551234567"}"#)?;
        assert!(request.email.is_none());
        assert_eq!(request.phone.as_deref(), Some("+15551234567"));
        Ok(())
    }

    #[test]
    fn create_user_role_defaults_to_none() -> Result<()> {
        let request: CreateUserRequest =
            serde_json::from_str(r#"{"username":"carol","password":"hunter2hunter2"}"#)?;
        assert!(request.role.is_none());
        let admin: CreateUserRequest = serde_json::from_str(
            r#"{"username":"carol","password":"hunter2hunter2","role":"ADMIN"}"#,
        )?;
        assert_eq!(admin.role, Some(Role::Admin));
        Ok(())
    }

    #[test]
    fn channel_request_uses_upper_case_channels() -> Result<()> {
        let request: ChannelRequest = serde_json::from_str(&format!(
            r#"{{"reference_id":"{}","channel":"EMAIL","channel_info":"alice@example.com"}}"#,
            Uuid::nil()
        ))?;
        assert_eq!(request.channel, Channel::Email);
        Ok(())
    }

    #[test]
    fn summary_masks_destination_and_omits_code() -> Result<()> {
        let now = OffsetDateTime::UNIX_EPOCH;
        let reference = VerificationReference::active(
            Uuid::new_v4(),
            Objective::set_password(),
            Channel::Email,
            "alice@example.com".to_string(),
            now,
            now + Duration::minutes(15),
        );
        let value = serde_json::to_value(ReferenceSummary::from(reference))?;
        assert_eq!(value["destination_hint"], "a***@example.com");
        assert_eq!(value["objective"], "set-password");
        assert!(value.get("code").is_none());
        Ok(())
    }
}
