//! Account administration. Every route here sits behind the `ADMIN` role check.

use super::{
    require_payload,
    types::{
        ContactUpdateRequest, CreateUserRequest, RoleUpdateRequest, StatusUpdateRequest,
        UserResponse,
    },
};
use crate::{
    accounts::Role,
    api::error::{ApiError, ErrorBody},
    gate::Identity,
    verification::{ContactUpdate, NewAccount, VerificationEngine},
};
use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use std::sync::Arc;
use uuid::Uuid;

#[utoipa::path(
    get,
    path = "/v1/users",
    params(
        ("Authorization" = String, Header, description = "Bearer access token")
    ),
    responses(
        (status = 200, description = "All accounts", body = [UserResponse]),
        (status = 403, description = "Role not permitted", body = ErrorBody)
    ),
    tag = "users"
)]
pub async fn list_users(
    engine: Extension<Arc<VerificationEngine>>,
) -> Result<Json<Vec<UserResponse>>, ApiError> {
    let users = engine.list_users().await?;
    Ok(Json(users.into_iter().map(UserResponse::from).collect()))
}

#[utoipa::path(
    post,
    path = "/v1/users",
    request_body = CreateUserRequest,
    params(
        ("Authorization" = String, Header, description = "Bearer access token")
    ),
    responses(
        (status = 201, description = "Account created", body = UserResponse),
        (status = 400, description = "Invalid payload", body = ErrorBody),
        (status = 403, description = "Role not permitted", body = ErrorBody),
        (status = 409, description = "Username is taken", body = ErrorBody)
    ),
    tag = "users"
)]
pub async fn create_user(
    engine: Extension<Arc<VerificationEngine>>,
    payload: Option<Json<CreateUserRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    let request = require_payload(payload)?;
    let user = engine
        .create_user(
            NewAccount {
                username: request.username,
                password: request.password,
                email: request.email,
                phone: request.phone,
            },
            request.role.unwrap_or(Role::User),
        )
        .await?;
    Ok((StatusCode::CREATED, Json(UserResponse::from(user))))
}

#[utoipa::path(
    get,
    path = "/v1/users/{id}",
    params(
        ("id" = Uuid, Path, description = "User id"),
        ("Authorization" = String, Header, description = "Bearer access token")
    ),
    responses(
        (status = 200, description = "Account", body = UserResponse),
        (status = 403, description = "Role not permitted", body = ErrorBody),
        (status = 404, description = "Unknown user", body = ErrorBody)
    ),
    tag = "users"
)]
pub async fn get_user(
    engine: Extension<Arc<VerificationEngine>>,
    Path(id): Path<Uuid>,
) -> Result<Json<UserResponse>, ApiError> {
    let user = engine.profile(id).await?;
    Ok(Json(user.into()))
}

/// Replace an account's email and phone.
#[utoipa::path(
    put,
    path = "/v1/users/{id}",
    request_body = ContactUpdateRequest,
    params(
        ("id" = Uuid, Path, description = "User id"),
        ("Authorization" = String, Header, description = "Bearer access token")
    ),
    responses(
        (status = 200, description = "Updated account", body = UserResponse),
        (status = 400, description = "Invalid email or phone", body = ErrorBody),
        (status = 403, description = "Role not permitted", body = ErrorBody),
        (status = 404, description = "Unknown user", body = ErrorBody)
    ),
    tag = "users"
)]
pub async fn update_user(
    engine: Extension<Arc<VerificationEngine>>,
    Path(id): Path<Uuid>,
    payload: Option<Json<ContactUpdateRequest>>,
) -> Result<Json<UserResponse>, ApiError> {
    let request = require_payload(payload)?;
    let user = engine
        .update_contact(
            id,
            ContactUpdate {
                email: request.email,
                phone: request.phone,
            },
        )
        .await?;
    Ok(Json(user.into()))
}

/// Delete an account together with its references. Admins cannot delete themselves.
#[utoipa::path(
    delete,
    path = "/v1/users/{id}",
    params(
        ("id" = Uuid, Path, description = "User id"),
        ("Authorization" = String, Header, description = "Bearer access token")
    ),
    responses(
        (status = 200, description = "Deleted account", body = UserResponse),
        (status = 400, description = "Caller tried to delete their own account", body = ErrorBody),
        (status = 403, description = "Role not permitted", body = ErrorBody),
        (status = 404, description = "Unknown user", body = ErrorBody)
    ),
    tag = "users"
)]
pub async fn delete_user(
    engine: Extension<Arc<VerificationEngine>>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<Uuid>,
) -> Result<Json<UserResponse>, ApiError> {
    let user = engine.delete_user(&identity, id).await?;
    Ok(Json(user.into()))
}

/// Activate or deactivate an account. Deactivation blocks live sessions at once.
#[utoipa::path(
    patch,
    path = "/v1/users/{id}/status",
    request_body = StatusUpdateRequest,
    params(
        ("id" = Uuid, Path, description = "User id"),
        ("Authorization" = String, Header, description = "Bearer access token")
    ),
    responses(
        (status = 200, description = "Updated account", body = UserResponse),
        (status = 403, description = "Role not permitted", body = ErrorBody),
        (status = 404, description = "Unknown user", body = ErrorBody)
    ),
    tag = "users"
)]
pub async fn update_status(
    engine: Extension<Arc<VerificationEngine>>,
    Path(id): Path<Uuid>,
    payload: Option<Json<StatusUpdateRequest>>,
) -> Result<Json<UserResponse>, ApiError> {
    let request = require_payload(payload)?;
    let user = engine.update_user_status(id, request.status).await?;
    Ok(Json(user.into()))
}

/// Change an account's role. Tokens already issued keep their old role until they expire.
#[utoipa::path(
    patch,
    path = "/v1/users/{id}/role",
    request_body = RoleUpdateRequest,
    params(
        ("id" = Uuid, Path, description = "User id"),
        ("Authorization" = String, Header, description = "Bearer access token")
    ),
    responses(
        (status = 200, description = "Updated account", body = UserResponse),
        (status = 403, description = "Role not permitted", body = ErrorBody),
        (status = 404, description = "Unknown user", body = ErrorBody)
    ),
    tag = "users"
)]
pub async fn update_role(
    engine: Extension<Arc<VerificationEngine>>,
    Path(id): Path<Uuid>,
    payload: Option<Json<RoleUpdateRequest>>,
) -> Result<Json<UserResponse>, ApiError> {
    let request = require_payload(payload)?;
    let user = engine.update_user_role(id, request.role).await?;
    Ok(Json(user.into()))
}
