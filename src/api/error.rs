//! HTTP mapping for [`AuthError`].

use crate::error::{AuthError, Mismatch};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{error, warn};
use utoipa::ToSchema;
use uuid::Uuid;

/// Body of every error response.
#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
}

/// An engine failure on its way out, tagged with the reference it concerns.
#[derive(Debug)]
pub struct ApiError {
    error: AuthError,
    reference_id: Option<Uuid>,
}

impl ApiError {
    #[must_use]
    pub const fn with_reference(error: AuthError, reference_id: Uuid) -> Self {
        Self {
            error,
            reference_id: Some(reference_id),
        }
    }

    #[must_use]
    pub fn bad_request(message: &str) -> Self {
        AuthError::Validation(message.to_string()).into()
    }
}

impl From<AuthError> for ApiError {
    fn from(error: AuthError) -> Self {
        Self {
            error,
            reference_id: None,
        }
    }
}

#[must_use]
pub const fn status_for(error: &AuthError) -> StatusCode {
    match error {
        AuthError::Validation(_) => StatusCode::BAD_REQUEST,
        AuthError::NotFound(_) => StatusCode::NOT_FOUND,
        AuthError::Conflict(_)
        | AuthError::StatusMismatch(Mismatch::AlreadyActive | Mismatch::ChannelNotSelected) => {
            StatusCode::CONFLICT
        }
        AuthError::StatusMismatch(_)
        | AuthError::Expired(_)
        | AuthError::Credential(_)
        | AuthError::Signature(_) => StatusCode::UNAUTHORIZED,
        AuthError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.error);
        let code = self.error.code();
        let reference_id = self.reference_id.map(|id| id.to_string());

        let message = if let AuthError::Internal(err) = &self.error {
            error!(
                code,
                reference_id = reference_id.as_deref(),
                "Request failed: {err:#}"
            );
            "internal server error".to_string()
        } else {
            warn!(
                code,
                reference_id = reference_id.as_deref(),
                "Request rejected: {}",
                self.error
            );
            self.error.to_string()
        };

        (
            status,
            Json(ErrorBody {
                error: code.to_string(),
                message,
            }),
        )
            .into_response()
    }
}
