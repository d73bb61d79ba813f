//! Verification reference endpoints.
//!
//! Flow Overview:
//! 1. `POST /v1/auth/verification/user` opens a reference and lists masked channels.
//! 2. `POST /v1/auth/verification/channel` binds a channel and sends the code.
//! 3. `POST /v1/auth/verification/code` confirms the code and returns an action token.
//! 4. The action token goes in `X-Action-Token` for the privileged step.
//!
//! A signed-in caller can skip steps 1-3 with `POST /v1/auth/verify-password`.

use super::{
    require_payload,
    types::{
        ChallengeResponse, ChannelRequest, ChannelResponse, CodeRequest, SetPasswordRequest,
        TokenResponse, VerificationInfoResponse, VerificationRequest, VerifyPasswordRequest,
    },
};
use crate::{
    api::error::{ApiError, ErrorBody},
    gate::{ActionIdentity, Identity},
    verification::VerificationEngine,
};
use axum::{extract::Extension, http::StatusCode, Json};
use std::sync::Arc;

/// Open a verification for a user and objective.
#[utoipa::path(
    post,
    path = "/v1/auth/verification/user",
    request_body = VerificationRequest,
    responses(
        (status = 200, description = "Reference created", body = ChallengeResponse),
        (status = 400, description = "Invalid objective or no deliverable channel", body = ErrorBody),
        (status = 401, description = "User is inactive", body = ErrorBody),
        (status = 404, description = "Unknown user", body = ErrorBody)
    ),
    tag = "verification"
)]
pub async fn request_verification(
    engine: Extension<Arc<VerificationEngine>>,
    payload: Option<Json<VerificationRequest>>,
) -> Result<Json<ChallengeResponse>, ApiError> {
    let request = require_payload(payload)?;
    let challenge = engine
        .request_verification(&request.username, &request.objective)
        .await?;
    Ok(Json(challenge.into()))
}

/// Bind a delivery channel and send the code.
#[utoipa::path(
    post,
    path = "/v1/auth/verification/channel",
    request_body = ChannelRequest,
    responses(
        (status = 200, description = "Code sent", body = ChannelResponse),
        (status = 400, description = "Channel not available", body = ErrorBody),
        (status = 401, description = "Reference expired or revoked", body = ErrorBody),
        (status = 404, description = "Unknown reference", body = ErrorBody),
        (status = 409, description = "Reference already active", body = ErrorBody)
    ),
    tag = "verification"
)]
pub async fn select_channel(
    engine: Extension<Arc<VerificationEngine>>,
    payload: Option<Json<ChannelRequest>>,
) -> Result<Json<ChannelResponse>, ApiError> {
    let request = require_payload(payload)?;
    let selection = engine
        .select_channel(request.reference_id, request.channel, &request.channel_info)
        .await
        .map_err(|err| ApiError::with_reference(err, request.reference_id))?;
    Ok(Json(selection.into()))
}

/// Confirm the delivered code.
#[utoipa::path(
    post,
    path = "/v1/auth/verification/code",
    request_body = CodeRequest,
    responses(
        (status = 200, description = "Action token issued", body = TokenResponse),
        (status = 401, description = "Wrong code, expired or revoked reference", body = ErrorBody),
        (status = 404, description = "Unknown reference", body = ErrorBody),
        (status = 409, description = "Already confirmed or no channel selected", body = ErrorBody)
    ),
    tag = "verification"
)]
pub async fn confirm_code(
    engine: Extension<Arc<VerificationEngine>>,
    payload: Option<Json<CodeRequest>>,
) -> Result<Json<TokenResponse>, ApiError> {
    let request = require_payload(payload)?;
    let issued = engine
        .confirm_code(request.reference_id, &request.correlation_id, &request.code)
        .await
        .map_err(|err| ApiError::with_reference(err, request.reference_id))?;
    Ok(Json(issued.into()))
}

/// Trade the caller's password for an action token bound to `objective`.
#[utoipa::path(
    post,
    path = "/v1/auth/verify-password",
    request_body = VerifyPasswordRequest,
    params(
        ("Authorization" = String, Header, description = "Bearer access token")
    ),
    responses(
        (status = 200, description = "Action token issued", body = TokenResponse),
        (status = 400, description = "Invalid or reserved objective", body = ErrorBody),
        (status = 401, description = "Wrong password or session no longer valid", body = ErrorBody)
    ),
    tag = "verification"
)]
pub async fn verify_password(
    engine: Extension<Arc<VerificationEngine>>,
    Extension(identity): Extension<Identity>,
    payload: Option<Json<VerifyPasswordRequest>>,
) -> Result<Json<TokenResponse>, ApiError> {
    let request = require_payload(payload)?;
    let issued = engine
        .verify_password(&identity, &request.password, &request.objective)
        .await?;
    Ok(Json(issued.into()))
}

/// Describe the reference behind an action token.
#[utoipa::path(
    get,
    path = "/v1/auth/verification/info",
    params(
        ("X-Action-Token" = String, Header, description = "Action token")
    ),
    responses(
        (status = 200, description = "Reference and owner", body = VerificationInfoResponse),
        (status = 401, description = "Invalid action token", body = ErrorBody)
    ),
    tag = "verification"
)]
pub async fn verification_info(
    engine: Extension<Arc<VerificationEngine>>,
    Extension(identity): Extension<ActionIdentity>,
) -> Result<Json<VerificationInfoResponse>, ApiError> {
    let (reference, user) = engine
        .verification_info(&identity)
        .await
        .map_err(|err| ApiError::with_reference(err, identity.ref_id))?;
    Ok(Json(VerificationInfoResponse {
        reference: reference.into(),
        user: user.into(),
    }))
}

/// Set a new password with a one-shot `set-password` action token.
#[utoipa::path(
    post,
    path = "/v1/auth/set-password",
    request_body = SetPasswordRequest,
    params(
        ("X-Action-Token" = String, Header, description = "Action token for set-password")
    ),
    responses(
        (status = 204, description = "Password updated"),
        (status = 400, description = "Password rejected", body = ErrorBody),
        (status = 401, description = "Invalid or already used action token", body = ErrorBody)
    ),
    tag = "verification"
)]
pub async fn set_password(
    engine: Extension<Arc<VerificationEngine>>,
    Extension(identity): Extension<ActionIdentity>,
    payload: Option<Json<SetPasswordRequest>>,
) -> Result<StatusCode, ApiError> {
    let request = require_payload(payload)?;
    engine
        .set_password(&identity, &request.password)
        .await
        .map_err(|err| ApiError::with_reference(err, identity.ref_id))?;
    Ok(StatusCode::NO_CONTENT)
}
