pub mod auth;
pub mod health;
pub mod me;
pub mod types;
pub mod users;
pub mod verification;

use super::error::ApiError;
use axum::Json;

/// Unwrap an optional JSON body; absent or unparsable bodies are a 400.
fn require_payload<T>(payload: Option<Json<T>>) -> Result<T, ApiError> {
    payload
        .map(|Json(payload)| payload)
        .ok_or_else(|| ApiError::bad_request("missing or malformed payload"))
}
