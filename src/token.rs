//! HS256 token codec for access and action tokens.
//!
//! Flow Overview: the engine builds typed claims and asks the issuer to sign
//! them; the gate hands raw header values back for verification. Expiry is
//! checked against the caller's clock rather than the system clock so the
//! closed-open boundary (`now >= exp` is expired) is exact and testable.

use crate::{accounts::Role, error::AuthError, verification::Objective};
use anyhow::{anyhow, bail};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use secrecy::{ExposeSecret, SecretString};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Shortest accepted signing secret, in bytes.
pub const MIN_SECRET_LEN: usize = 32;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("token is malformed")]
    Malformed,
    #[error("token signature is invalid")]
    BadSignature,
    #[error("token has expired")]
    Expired,
}

/// Claims of a session token.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AccessClaims {
    #[serde(rename = "ref")]
    pub ref_id: Uuid,
    pub role: Role,
    pub exp: i64,
}

/// Claims of a one-shot action token. Carries no role on purpose.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ActionClaims {
    #[serde(rename = "ref")]
    pub ref_id: Uuid,
    pub objective: Objective,
    pub exp: i64,
}

#[derive(Clone)]
pub struct TokenIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenIssuer")
            .field("algorithm", &Algorithm::HS256)
            .finish_non_exhaustive()
    }
}

impl TokenIssuer {
    /// Build an issuer from the shared signing secret.
    ///
    /// # Errors
    /// Returns an error if the secret is shorter than [`MIN_SECRET_LEN`] bytes.
    pub fn new(secret: &SecretString) -> anyhow::Result<Self> {
        let bytes = secret.expose_secret().as_bytes();
        if bytes.len() < MIN_SECRET_LEN {
            bail!("token secret must be at least {MIN_SECRET_LEN} bytes");
        }

        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp"]);

        Ok(Self {
            encoding: EncodingKey::from_secret(bytes),
            decoding: DecodingKey::from_secret(bytes),
            validation,
        })
    }

    /// # Errors
    /// Signing only fails on an internal encoder fault.
    pub fn sign_access(&self, claims: &AccessClaims) -> Result<String, AuthError> {
        self.sign(claims, "access")
    }

    /// # Errors
    /// Signing only fails on an internal encoder fault.
    pub fn sign_action(&self, claims: &ActionClaims) -> Result<String, AuthError> {
        self.sign(claims, "action")
    }

    /// Verify an access token at `now` (unix seconds).
    ///
    /// # Errors
    /// Returns the [`TokenError`] describing why the token is unusable.
    pub fn verify_access(&self, token: &str, now: i64) -> Result<AccessClaims, TokenError> {
        let claims: AccessClaims = self.decode(token)?;
        check_exp(claims.exp, now)?;
        Ok(claims)
    }

    /// Verify an action token at `now` (unix seconds).
    ///
    /// # Errors
    /// Returns the [`TokenError`] describing why the token is unusable.
    pub fn verify_action(&self, token: &str, now: i64) -> Result<ActionClaims, TokenError> {
        let claims: ActionClaims = self.decode(token)?;
        check_exp(claims.exp, now)?;
        Ok(claims)
    }

    fn sign<T: Serialize>(&self, claims: &T, kind: &str) -> Result<String, AuthError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding)
            .map_err(|err| AuthError::Internal(anyhow!("failed to sign {kind} token: {err}")))
    }

    fn decode<T: DeserializeOwned>(&self, token: &str) -> Result<T, TokenError> {
        decode::<T>(token, &self.decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(|err| match err.kind() {
                ErrorKind::InvalidSignature => TokenError::BadSignature,
                _ => TokenError::Malformed,
            })
    }
}

const fn check_exp(exp: i64, now: i64) -> Result<(), TokenError> {
    if now >= exp {
        Err(TokenError::Expired)
    } else {
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const SECRET: &str = "0123456789abcdef0123456789abcdef";
    const NOW: i64 = 1_700_000_000;

    fn issuer(secret: &str) -> TokenIssuer {
        TokenIssuer::new(&SecretString::from(secret.to_string())).unwrap()
    }

    fn access_claims() -> AccessClaims {
        AccessClaims {
            ref_id: Uuid::new_v4(),
            role: Role::User,
            exp: NOW + 60,
        }
    }

    fn action_claims() -> ActionClaims {
        ActionClaims {
            ref_id: Uuid::new_v4(),
            objective: Objective::set_password(),
            exp: NOW + 60,
        }
    }

    #[test]
    fn short_secret_is_rejected() {
        let result = TokenIssuer::new(&SecretString::from("too-short".to_string()));
        assert!(result.is_err());
    }

    #[test]
    fn access_token_verifies_until_exp() {
        let issuer = issuer(SECRET);
        let claims = access_claims();
        let token = issuer.sign_access(&claims).unwrap();

        assert_eq!(issuer.verify_access(&token, NOW).unwrap(), claims);
        assert_eq!(issuer.verify_access(&token, claims.exp - 1).unwrap(), claims);
        assert_eq!(
            issuer.verify_access(&token, claims.exp),
            Err(TokenError::Expired)
        );
        assert_eq!(
            issuer.verify_access(&token, claims.exp + 1),
            Err(TokenError::Expired)
        );
    }

    #[test]
    fn foreign_secret_is_a_bad_signature() {
        let token = issuer(SECRET).sign_access(&access_claims()).unwrap();
        let other = issuer("fedcba9876543210fedcba9876543210");
        assert_eq!(
            other.verify_access(&token, NOW),
            Err(TokenError::BadSignature)
        );
    }

    #[test]
    fn garbage_is_malformed() {
        let issuer = issuer(SECRET);
        assert_eq!(
            issuer.verify_access("not-a-token", NOW),
            Err(TokenError::Malformed)
        );
        assert_eq!(issuer.verify_action("", NOW), Err(TokenError::Malformed));
    }

    #[test]
    fn shapes_are_not_interchangeable() {
        let issuer = issuer(SECRET);
        let access = issuer.sign_access(&access_claims()).unwrap();
        let action = issuer.sign_action(&action_claims()).unwrap();

        assert_eq!(
            issuer.verify_action(&access, NOW),
            Err(TokenError::Malformed)
        );
        assert_eq!(
            issuer.verify_access(&action, NOW),
            Err(TokenError::Malformed)
        );
    }

    #[test]
    fn action_claims_keep_objective() {
        let issuer = issuer(SECRET);
        let claims = action_claims();
        let token = issuer.sign_action(&claims).unwrap();
        let decoded = issuer.verify_action(&token, NOW).unwrap();
        assert_eq!(decoded.objective, Objective::set_password());
        assert_eq!(decoded.ref_id, claims.ref_id);
    }

    #[test]
    fn missing_exp_is_malformed() {
        #[derive(Serialize)]
        struct NoExp {
            #[serde(rename = "ref")]
            ref_id: Uuid,
            role: Role,
        }

        let issuer = issuer(SECRET);
        let token = encode(
            &Header::new(Algorithm::HS256),
            &NoExp {
                ref_id: Uuid::new_v4(),
                role: Role::Admin,
            },
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap();
        assert_eq!(
            issuer.verify_access(&token, NOW),
            Err(TokenError::Malformed)
        );
    }

    #[test]
    fn debug_hides_keys() {
        let rendered = format!("{:?}", issuer(SECRET));
        assert!(!rendered.contains(SECRET));
    }
}
