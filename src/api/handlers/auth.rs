//! Sign-up, login and session lifecycle endpoints.

use super::{
    require_payload,
    types::{LoginRequest, SignUpRequest, TokenResponse, UserResponse},
};
use crate::{
    api::error::{ApiError, ErrorBody},
    gate::Identity,
    verification::{NewAccount, VerificationEngine},
};
use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};
use std::sync::Arc;

/// Register an account with the `USER` role.
#[utoipa::path(
    post,
    path = "/v1/auth/sign-up",
    request_body = SignUpRequest,
    responses(
        (status = 201, description = "Account created", body = UserResponse),
        (status = 400, description = "Invalid payload", body = ErrorBody),
        (status = 409, description = "Username is taken", body = ErrorBody)
    ),
    tag = "auth"
)]
pub async fn sign_up(
    engine: Extension<Arc<VerificationEngine>>,
    payload: Option<Json<SignUpRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    let request = require_payload(payload)?;
    let user = engine
        .sign_up(NewAccount {
            username: request.username,
            password: request.password,
            email: request.email,
            phone: request.phone,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(UserResponse::from(user))))
}

/// Exchange username and password for an access token.
#[utoipa::path(
    post,
    path = "/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Session issued", body = TokenResponse),
        (status = 400, description = "Invalid payload", body = ErrorBody),
        (status = 401, description = "Wrong credentials or inactive user", body = ErrorBody)
    ),
    tag = "auth"
)]
pub async fn login(
    engine: Extension<Arc<VerificationEngine>>,
    payload: Option<Json<LoginRequest>>,
) -> Result<Json<TokenResponse>, ApiError> {
    let request = require_payload(payload)?;
    let issued = engine
        .issue_access_token(&request.username, &request.password)
        .await?;
    Ok(Json(issued.into()))
}

/// Replace the caller's session with a fresh one.
#[utoipa::path(
    post,
    path = "/v1/auth/keep-alive",
    params(
        ("Authorization" = String, Header, description = "Bearer access token")
    ),
    responses(
        (status = 200, description = "Session renewed", body = TokenResponse),
        (status = 401, description = "Session is no longer valid", body = ErrorBody)
    ),
    tag = "auth"
)]
pub async fn keep_alive(
    engine: Extension<Arc<VerificationEngine>>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<TokenResponse>, ApiError> {
    let issued = engine
        .renew_access_token(identity.ref_id)
        .await
        .map_err(|err| ApiError::with_reference(err, identity.ref_id))?;
    Ok(Json(issued.into()))
}

/// Revoke the caller's session reference.
#[utoipa::path(
    post,
    path = "/v1/auth/logout",
    params(
        ("Authorization" = String, Header, description = "Bearer access token")
    ),
    responses(
        (status = 204, description = "Session revoked"),
        (status = 401, description = "Session is no longer valid", body = ErrorBody)
    ),
    tag = "auth"
)]
pub async fn logout(
    engine: Extension<Arc<VerificationEngine>>,
    Extension(identity): Extension<Identity>,
) -> Result<StatusCode, ApiError> {
    engine
        .revoke_reference(identity.ref_id)
        .await
        .map_err(|err| ApiError::with_reference(err, identity.ref_id))?;
    Ok(StatusCode::NO_CONTENT)
}
