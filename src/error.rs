//! Error taxonomy shared by the verification engine and the auth gate.
//!
//! Each failure is raised where it is detected and travels unchanged to the
//! HTTP boundary, which maps it to a status code and logs it once.

use crate::token::TokenError;
use std::fmt;
use thiserror::Error;

/// What a failed lookup was looking for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Lookup {
    User,
    Reference,
}

/// What ran out of time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Expiry {
    Token,
    Reference,
}

/// Which state or binding check failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mismatch {
    AlreadyActive,
    NotActive,
    ChannelNotSelected,
    WrongObjective,
    Revoked,
    UserInactive,
}

/// Which secret the caller got wrong.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CredentialFailure {
    WrongPassword,
    WrongCode,
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("{0} not found")]
    NotFound(Lookup),
    #[error("{0} expired")]
    Expired(Expiry),
    #[error("status mismatch: {0}")]
    StatusMismatch(Mismatch),
    #[error("invalid credentials: {0}")]
    Credential(CredentialFailure),
    #[error("invalid token: {0}")]
    Signature(TokenError),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AuthError {
    /// Stable, machine-readable code for the failure.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_failed",
            Self::NotFound(Lookup::User) => "user_not_found",
            Self::NotFound(Lookup::Reference) => "reference_not_found",
            Self::Expired(Expiry::Token) => "token_expired",
            Self::Expired(Expiry::Reference) => "reference_expired",
            Self::StatusMismatch(mismatch) => mismatch.code(),
            Self::Credential(CredentialFailure::WrongPassword) => "wrong_password",
            Self::Credential(CredentialFailure::WrongCode) => "wrong_code",
            Self::Signature(TokenError::BadSignature) => "bad_signature",
            Self::Signature(_) => "malformed_token",
            Self::Conflict(_) => "conflict",
            Self::Internal(_) => "internal_error",
        }
    }
}

impl From<TokenError> for AuthError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Expired => Self::Expired(Expiry::Token),
            other => Self::Signature(other),
        }
    }
}

impl Mismatch {
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::AlreadyActive => "already_active",
            Self::NotActive => "reference_not_active",
            Self::ChannelNotSelected => "channel_not_selected",
            Self::WrongObjective => "wrong_objective",
            Self::Revoked => "reference_revoked",
            Self::UserInactive => "user_inactive",
        }
    }
}

impl fmt::Display for Lookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User => f.write_str("user"),
            Self::Reference => f.write_str("verification reference"),
        }
    }
}

impl fmt::Display for Expiry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Token => f.write_str("token"),
            Self::Reference => f.write_str("verification reference"),
        }
    }
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::AlreadyActive => "reference is already active",
            Self::NotActive => "reference is not active",
            Self::ChannelNotSelected => "no delivery channel selected",
            Self::WrongObjective => "reference does not authorize this objective",
            Self::Revoked => "reference was revoked",
            Self::UserInactive => "user is not active",
        };
        f.write_str(text)
    }
}

impl fmt::Display for CredentialFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WrongPassword => f.write_str("wrong username or password"),
            Self::WrongCode => f.write_str("wrong verification code"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expired_token_error_becomes_expiry() {
        let err = AuthError::from(TokenError::Expired);
        assert!(matches!(err, AuthError::Expired(Expiry::Token)));
        assert_eq!(err.code(), "token_expired");
    }

    #[test]
    fn signature_errors_keep_their_reason() {
        assert_eq!(AuthError::from(TokenError::BadSignature).code(), "bad_signature");
        assert_eq!(AuthError::from(TokenError::Malformed).code(), "malformed_token");
    }

    #[test]
    fn mismatch_codes_are_distinct() {
        let all = [
            Mismatch::AlreadyActive,
            Mismatch::NotActive,
            Mismatch::ChannelNotSelected,
            Mismatch::WrongObjective,
            Mismatch::Revoked,
            Mismatch::UserInactive,
        ];
        let mut codes: Vec<_> = all.iter().map(|m| m.code()).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), all.len());
    }

    #[test]
    fn display_includes_reason() {
        let err = AuthError::StatusMismatch(Mismatch::AlreadyActive);
        assert_eq!(err.to_string(), "status mismatch: reference is already active");
    }
}
