use super::{
    require_payload,
    types::{ChangePasswordRequest, ContactUpdateRequest, UserResponse},
};
use crate::{
    api::error::{ApiError, ErrorBody},
    gate::Identity,
    verification::{ContactUpdate, VerificationEngine},
};
use axum::{extract::Extension, http::StatusCode, Json};
use std::sync::Arc;

/// Profile of the authenticated caller.
#[utoipa::path(
    get,
    path = "/v1/me",
    params(
        ("Authorization" = String, Header, description = "Bearer access token")
    ),
    responses(
        (status = 200, description = "Caller profile", body = UserResponse),
        (status = 401, description = "Not authenticated", body = ErrorBody)
    ),
    tag = "me"
)]
pub async fn me(
    engine: Extension<Arc<VerificationEngine>>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<UserResponse>, ApiError> {
    let user = engine.profile(identity.user_id).await?;
    Ok(Json(user.into()))
}

/// Replace the caller's email and phone.
#[utoipa::path(
    put,
    path = "/v1/me",
    request_body = ContactUpdateRequest,
    params(
        ("Authorization" = String, Header, description = "Bearer access token")
    ),
    responses(
        (status = 200, description = "Updated profile", body = UserResponse),
        (status = 400, description = "Invalid email or phone", body = ErrorBody),
        (status = 401, description = "Not authenticated", body = ErrorBody)
    ),
    tag = "me"
)]
pub async fn update_me(
    engine: Extension<Arc<VerificationEngine>>,
    Extension(identity): Extension<Identity>,
    payload: Option<Json<ContactUpdateRequest>>,
) -> Result<Json<UserResponse>, ApiError> {
    let request = require_payload(payload)?;
    let user = engine
        .update_contact(
            identity.user_id,
            ContactUpdate {
                email: request.email,
                phone: request.phone,
            },
        )
        .await?;
    Ok(Json(user.into()))
}

#[utoipa::path(
    put,
    path = "/v1/me/password",
    request_body = ChangePasswordRequest,
    params(
        ("Authorization" = String, Header, description = "Bearer access token")
    ),
    responses(
        (status = 204, description = "Password changed"),
        (status = 400, description = "Password rejected", body = ErrorBody),
        (status = 401, description = "Wrong current password", body = ErrorBody)
    ),
    tag = "me"
)]
pub async fn change_password(
    engine: Extension<Arc<VerificationEngine>>,
    Extension(identity): Extension<Identity>,
    payload: Option<Json<ChangePasswordRequest>>,
) -> Result<StatusCode, ApiError> {
    let request = require_payload(payload)?;
    engine
        .change_password(&identity, &request.current_password, &request.new_password)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
