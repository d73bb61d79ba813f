//! Request guards for session and action tokens.
//!
//! Flow Overview: each guard decodes its token once, hands the typed claims to
//! the engine for the store checks, and attaches the resulting identity to the
//! request extensions. Role checks read the identity the authentication guard
//! attached and never touch the store.
//!
//! The token guards find the [`AuthGate`] in the request extensions, so the
//! router must carry `Extension(gate)` outside of them.

use crate::{
    accounts::Role,
    error::{AuthError, Expiry, Lookup, Mismatch},
    token::TokenError,
    verification::VerificationEngine,
};
use axum::{
    extract::{Extension, Request, State},
    http::{
        header::{AUTHORIZATION, WWW_AUTHENTICATE},
        HeaderMap, HeaderValue, StatusCode,
    },
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, warn};
use uuid::Uuid;

pub use crate::verification::{ActionIdentity, Identity};

pub const ACTION_TOKEN_HEADER: &str = "x-action-token";

/// Why a guard turned a request away.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RejectionReason {
    MissingHeader,
    MalformedToken,
    BadSignature,
    TokenExpired,
    UnknownReference,
    ReferenceRevoked,
    ReferenceExpired,
    ReferenceNotActive,
    WrongObjective,
    UnknownUser,
    UserInactive,
    InsufficientRole,
    Unavailable,
}

impl RejectionReason {
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::MissingHeader => "missing_header",
            Self::MalformedToken => "malformed_token",
            Self::BadSignature => "bad_signature",
            Self::TokenExpired => "token_expired",
            Self::UnknownReference => "unknown_reference",
            Self::ReferenceRevoked => "reference_revoked",
            Self::ReferenceExpired => "reference_expired",
            Self::ReferenceNotActive => "reference_not_active",
            Self::WrongObjective => "wrong_objective",
            Self::UnknownUser => "unknown_user",
            Self::UserInactive => "user_inactive",
            Self::InsufficientRole => "insufficient_role",
            Self::Unavailable => "unavailable",
        }
    }

    #[must_use]
    pub const fn status(self) -> StatusCode {
        match self {
            Self::InsufficientRole => StatusCode::FORBIDDEN,
            Self::Unavailable => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::UNAUTHORIZED,
        }
    }
}

#[derive(Debug, Error)]
#[error("request rejected: {}", reason.code())]
pub struct GateRejection {
    pub reason: RejectionReason,
    pub reference_id: Option<Uuid>,
    #[source]
    source: Option<AuthError>,
}

impl GateRejection {
    #[must_use]
    pub const fn new(reason: RejectionReason) -> Self {
        Self {
            reason,
            reference_id: None,
            source: None,
        }
    }

    /// Classify an engine failure. `reference_id` is the claim's reference, when known.
    #[must_use]
    pub fn from_auth(err: AuthError, reference_id: Option<Uuid>) -> Self {
        let reason = match &err {
            AuthError::Signature(TokenError::BadSignature) => RejectionReason::BadSignature,
            AuthError::Signature(_) => RejectionReason::MalformedToken,
            AuthError::Expired(Expiry::Token) => RejectionReason::TokenExpired,
            AuthError::Expired(Expiry::Reference) => RejectionReason::ReferenceExpired,
            AuthError::NotFound(Lookup::Reference) => RejectionReason::UnknownReference,
            AuthError::NotFound(Lookup::User) => RejectionReason::UnknownUser,
            AuthError::StatusMismatch(Mismatch::Revoked) => RejectionReason::ReferenceRevoked,
            AuthError::StatusMismatch(Mismatch::WrongObjective) => RejectionReason::WrongObjective,
            AuthError::StatusMismatch(Mismatch::UserInactive) => RejectionReason::UserInactive,
            AuthError::StatusMismatch(_) => RejectionReason::ReferenceNotActive,
            AuthError::Validation(_)
            | AuthError::Credential(_)
            | AuthError::Conflict(_)
            | AuthError::Internal(_) => RejectionReason::Unavailable,
        };
        Self {
            reason,
            reference_id,
            source: Some(err),
        }
    }
}

impl IntoResponse for GateRejection {
    fn into_response(self) -> Response {
        let reference_id = self.reference_id.map(|id| id.to_string());
        match self.reason {
            RejectionReason::Unavailable => error!(
                reason = self.reason.code(),
                reference_id = reference_id.as_deref(),
                "Auth gate failed: {:?}",
                self.source
            ),
            reason => warn!(
                reason = reason.code(),
                reference_id = reference_id.as_deref(),
                "Request rejected by auth gate"
            ),
        }

        let message = match self.reason {
            RejectionReason::Unavailable => "authentication is temporarily unavailable".to_string(),
            RejectionReason::MissingHeader => "missing or malformed credentials header".to_string(),
            RejectionReason::InsufficientRole => "role not permitted".to_string(),
            _ => self
                .source
                .as_ref()
                .map_or_else(|| self.reason.code().to_string(), ToString::to_string),
        };

        let status = self.reason.status();
        let mut response = (
            status,
            Json(json!({ "error": self.reason.code(), "message": message })),
        )
            .into_response();
        if status == StatusCode::UNAUTHORIZED {
            response
                .headers_mut()
                .insert(WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        response
    }
}

/// The guards' shared state.
#[derive(Clone, Debug)]
pub struct AuthGate {
    engine: Arc<VerificationEngine>,
}

impl AuthGate {
    #[must_use]
    pub const fn new(engine: Arc<VerificationEngine>) -> Self {
        Self { engine }
    }

    #[must_use]
    pub const fn engine(&self) -> &Arc<VerificationEngine> {
        &self.engine
    }

    /// Resolve `Authorization: Bearer <token>` into an identity.
    ///
    /// # Errors
    /// A [`GateRejection`] naming the first check that failed.
    pub async fn authenticate(&self, headers: &HeaderMap) -> Result<Identity, GateRejection> {
        let token = extract_bearer_token(headers)
            .ok_or_else(|| GateRejection::new(RejectionReason::MissingHeader))?;
        let claims = self
            .engine
            .tokens()
            .verify_access(&token, self.engine.now().unix_timestamp())
            .map_err(|err| GateRejection::from_auth(err.into(), None))?;
        self.engine
            .authorize_access(&claims)
            .await
            .map_err(|err| GateRejection::from_auth(err, Some(claims.ref_id)))
    }

    /// Resolve `X-Action-Token` into an action identity. The objective comes
    /// from the token and must match the stored reference.
    ///
    /// # Errors
    /// A [`GateRejection`] naming the first check that failed.
    pub async fn authenticate_action(
        &self,
        headers: &HeaderMap,
    ) -> Result<ActionIdentity, GateRejection> {
        let token = extract_action_token(headers)
            .ok_or_else(|| GateRejection::new(RejectionReason::MissingHeader))?;
        let claims = self
            .engine
            .tokens()
            .verify_action(&token, self.engine.now().unix_timestamp())
            .map_err(|err| GateRejection::from_auth(err.into(), None))?;
        self.engine
            .authorize_action(&claims, &claims.objective)
            .await
            .map_err(|err| GateRejection::from_auth(err, Some(claims.ref_id)))
    }
}

/// Roles accepted by [`require_authorization`].
#[derive(Clone, Copy, Debug)]
pub struct AllowedRoles(pub &'static [Role]);

impl AllowedRoles {
    pub const ADMIN: Self = Self(&[Role::Admin]);
}

/// Claims-only role check against the snapshot in the access token.
///
/// # Errors
/// `MissingHeader` without an identity, `InsufficientRole` for other roles.
pub fn authorize(identity: Option<&Identity>, allowed: &[Role]) -> Result<(), GateRejection> {
    let identity = identity.ok_or_else(|| GateRejection::new(RejectionReason::MissingHeader))?;
    if allowed.contains(&identity.role) {
        Ok(())
    } else {
        Err(GateRejection {
            reason: RejectionReason::InsufficientRole,
            reference_id: Some(identity.ref_id),
            source: None,
        })
    }
}

pub async fn require_authenticated(
    Extension(gate): Extension<AuthGate>,
    mut request: Request,
    next: Next,
) -> Result<Response, GateRejection> {
    let identity = gate.authenticate(request.headers()).await?;
    request.extensions_mut().insert(identity);
    Ok(next.run(request).await)
}

pub async fn require_action_token(
    Extension(gate): Extension<AuthGate>,
    mut request: Request,
    next: Next,
) -> Result<Response, GateRejection> {
    let identity = gate.authenticate_action(request.headers()).await?;
    request.extensions_mut().insert(identity);
    Ok(next.run(request).await)
}

/// Must run after [`require_authenticated`].
pub async fn require_authorization(
    State(allowed): State<AllowedRoles>,
    request: Request,
    next: Next,
) -> Result<Response, GateRejection> {
    authorize(request.extensions().get::<Identity>(), allowed.0)?;
    Ok(next.run(request).await)
}

fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let trimmed = value.trim();
    let token = trimmed
        .strip_prefix("Bearer ")
        .or_else(|| trimmed.strip_prefix("bearer "))?
        .trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

fn extract_action_token(headers: &HeaderMap) -> Option<String> {
    let token = headers.get(ACTION_TOKEN_HEADER)?.to_str().ok()?.trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::{
        accounts::{
            MemoryUserAccountStore, PasswordHasher, UserAccount, UserAccountStore, UserStatus,
        },
        token::{AccessClaims, TokenIssuer},
        verification::{
            Channel, ManualClock, MemoryVerificationStore, Objective, SecureRandom,
            VerificationConfig, VerificationReference, VerificationStore,
        },
    };
    use anyhow::Result;
    use axum::{
        body::{to_bytes, Body},
        http::Request as HttpRequest,
        middleware::{from_fn, from_fn_with_state},
        routing::get,
        Router,
    };
    use secrecy::SecretString;
    use serde_json::Value;
    use time::{Duration, OffsetDateTime};
    use tower::ServiceExt;

    struct PlainHasher;

    impl PasswordHasher for PlainHasher {
        fn hash(&self, plain: &str) -> Result<String> {
            Ok(format!("plain:{plain}"))
        }

        fn verify(&self, plain: &str, hash: &str) -> bool {
            hash.strip_prefix("plain:") == Some(plain)
        }
    }

    struct FixedRandom;

    impl SecureRandom for FixedRandom {
        fn numeric_code(&self, _length: usize) -> String {
            "482913".to_string()
        }

        fn correlation_id(&self, _length: usize) -> String {
            "AB12".to_string()
        }
    }

    struct Harness {
        gate: AuthGate,
        clock: Arc<ManualClock>,
        references: Arc<MemoryVerificationStore>,
        users: Arc<MemoryUserAccountStore>,
        alice: UserAccount,
    }

    fn start() -> OffsetDateTime {
        OffsetDateTime::UNIX_EPOCH + Duration::days(20_000)
    }

    async fn harness() -> Result<Harness> {
        let clock = Arc::new(ManualClock::new(start()));
        let references = Arc::new(MemoryVerificationStore::new());
        let users = Arc::new(MemoryUserAccountStore::new());
        let alice = UserAccount {
            id: Uuid::new_v4(),
            username: "alice".to_string(),
            role: Role::User,
            status: UserStatus::Active,
            password_hash: PlainHasher.hash("correct horse")?,
            email: Some("alice@example.com".to_string()),
            phone: None,
            created_at: start(),
        };
        users.create(&alice).await?;

        let engine = VerificationEngine::new(
            VerificationConfig::new().with_session_ttl_seconds(600),
            TokenIssuer::new(&SecretString::from("s".repeat(32)))?,
            references.clone(),
            users.clone(),
        )
        .with_hasher(Arc::new(PlainHasher))
        .with_random(Arc::new(FixedRandom))
        .with_clock(clock.clone());

        Ok(Harness {
            gate: AuthGate::new(Arc::new(engine)),
            clock,
            references,
            users,
            alice,
        })
    }

    fn app(gate: AuthGate) -> Router {
        let session = Router::new()
            .route(
                "/whoami",
                get(|Extension(identity): Extension<Identity>| async move {
                    identity.user_id.to_string()
                }),
            )
            .route_layer(from_fn(require_authenticated));
        let admin = Router::new()
            .route("/admin", get(|| async { "ok" }))
            .route_layer(from_fn_with_state(AllowedRoles::ADMIN, require_authorization))
            .route_layer(from_fn(require_authenticated));
        let action = Router::new()
            .route(
                "/action",
                get(|Extension(identity): Extension<ActionIdentity>| async move {
                    identity.objective.to_string()
                }),
            )
            .route_layer(from_fn(require_action_token));
        session.merge(admin).merge(action).layer(Extension(gate))
    }

    async fn call(router: Router, uri: &str, header: Option<(&str, &str)>) -> Result<(StatusCode, Value)> {
        let mut builder = HttpRequest::builder().uri(uri);
        if let Some((name, value)) = header {
            builder = builder.header(name, value);
        }
        let response = router.oneshot(builder.body(Body::empty())?).await?;
        let status = response.status();
        let bytes = to_bytes(response.into_body(), 1024 * 1024).await?;
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        Ok((status, body))
    }

    fn reason(body: &Value) -> &str {
        body["error"].as_str().unwrap_or_default()
    }

    #[tokio::test]
    async fn missing_header_is_rejected() -> Result<()> {
        let h = harness().await?;
        let (status, body) = call(app(h.gate), "/whoami", None).await?;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(reason(&body), "missing_header");
        Ok(())
    }

    #[tokio::test]
    async fn valid_session_reaches_handler() -> Result<()> {
        let h = harness().await?;
        let issued = h.gate.engine().issue_access_token("alice", "correct horse").await?;
        let bearer = format!("Bearer {}", issued.token);

        let response = app(h.gate.clone())
            .oneshot(
                HttpRequest::builder()
                    .uri("/whoami")
                    .header(AUTHORIZATION, bearer)
                    .body(Body::empty())?,
            )
            .await?;
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), 1024).await?;
        assert_eq!(bytes, h.alice.id.to_string().as_bytes());
        Ok(())
    }

    #[tokio::test]
    async fn each_failure_has_its_own_reason() -> Result<()> {
        let h = harness().await?;
        let engine = Arc::clone(h.gate.engine());
        let issued = engine.issue_access_token("alice", "correct horse").await?;
        let bearer = format!("Bearer {}", issued.token);

        let (_, body) = call(app(h.gate.clone()), "/whoami", Some(("authorization", "Bearer nope"))).await?;
        assert_eq!(reason(&body), "malformed_token");

        let foreign = TokenIssuer::new(&SecretString::from("f".repeat(32)))?;
        let forged = foreign.sign_access(&AccessClaims {
            ref_id: issued.reference_id,
            role: Role::Admin,
            exp: (start() + Duration::hours(1)).unix_timestamp(),
        })?;
        let (_, body) = call(
            app(h.gate.clone()),
            "/whoami",
            Some(("authorization", format!("Bearer {forged}").as_str())),
        )
        .await?;
        assert_eq!(reason(&body), "bad_signature");

        h.users.update_status(h.alice.id, UserStatus::Inactive).await?;
        let (_, body) = call(app(h.gate.clone()), "/whoami", Some(("authorization", bearer.as_str()))).await?;
        assert_eq!(reason(&body), "user_inactive");
        h.users.update_status(h.alice.id, UserStatus::Active).await?;

        engine.revoke_reference(issued.reference_id).await?;
        let (status, body) = call(app(h.gate.clone()), "/whoami", Some(("authorization", bearer.as_str()))).await?;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(reason(&body), "reference_revoked");

        let later = engine.issue_access_token("alice", "correct horse").await?;
        h.clock.advance(Duration::seconds(600));
        let (_, body) = call(
            app(h.gate.clone()),
            "/whoami",
            Some(("authorization", format!("Bearer {}", later.token).as_str())),
        )
        .await?;
        assert_eq!(reason(&body), "token_expired");
        Ok(())
    }

    #[tokio::test]
    async fn session_token_over_action_reference_is_wrong_objective() -> Result<()> {
        let h = harness().await?;
        let reference = VerificationReference::active(
            h.alice.id,
            Objective::set_password(),
            Channel::Email,
            "alice@example.com".to_string(),
            start(),
            start() + Duration::minutes(15),
        );
        h.references.create(&reference).await?;

        let token = h.gate.engine().tokens().sign_access(&AccessClaims {
            ref_id: reference.id,
            role: Role::User,
            exp: reference.expires_at.unix_timestamp(),
        })?;
        let (status, body) = call(
            app(h.gate),
            "/whoami",
            Some(("authorization", format!("Bearer {token}").as_str())),
        )
        .await?;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(reason(&body), "wrong_objective");
        Ok(())
    }

    #[tokio::test]
    async fn admin_route_checks_role_snapshot() -> Result<()> {
        let h = harness().await?;
        let engine = Arc::clone(h.gate.engine());
        let user_session = engine.issue_access_token("alice", "correct horse").await?;

        let (status, body) = call(
            app(h.gate.clone()),
            "/admin",
            Some(("authorization", format!("Bearer {}", user_session.token).as_str())),
        )
        .await?;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(reason(&body), "insufficient_role");

        engine.update_user_role(h.alice.id, Role::Admin).await?;
        let (status, _) = call(
            app(h.gate.clone()),
            "/admin",
            Some(("authorization", format!("Bearer {}", user_session.token).as_str())),
        )
        .await?;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let admin_session = engine.issue_access_token("alice", "correct horse").await?;
        let (status, _) = call(
            app(h.gate),
            "/admin",
            Some(("authorization", format!("Bearer {}", admin_session.token).as_str())),
        )
        .await?;
        assert_eq!(status, StatusCode::OK);
        Ok(())
    }

    #[tokio::test]
    async fn action_token_uses_its_own_objective() -> Result<()> {
        let h = harness().await?;
        let engine = Arc::clone(h.gate.engine());
        let challenge = engine.request_verification("alice", "set-password").await?;
        engine
            .select_channel(challenge.reference_id, Channel::Email, "alice@example.com")
            .await?;
        let issued = engine
            .confirm_code(challenge.reference_id, "AB12", "482913")
            .await?;

        let response = app(h.gate.clone())
            .oneshot(
                HttpRequest::builder()
                    .uri("/action")
                    .header(ACTION_TOKEN_HEADER, &issued.token)
                    .body(Body::empty())?,
            )
            .await?;
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), 1024).await?;
        assert_eq!(bytes, "set-password".as_bytes());

        let (_, body) = call(
            app(h.gate),
            "/action",
            Some(("authorization", format!("Bearer {}", issued.token).as_str())),
        )
        .await?;
        assert_eq!(reason(&body), "missing_header");
        Ok(())
    }

    #[test]
    fn authorize_without_identity_is_unauthenticated() {
        let err = authorize(None, &[Role::Admin]).unwrap_err();
        assert_eq!(err.reason, RejectionReason::MissingHeader);
    }

    #[test]
    fn bearer_extraction() {
        let mut headers = HeaderMap::new();
        assert!(extract_bearer_token(&headers).is_none());
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert!(extract_bearer_token(&headers).is_none());
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer   "));
        assert!(extract_bearer_token(&headers).is_none());
        headers.insert(AUTHORIZATION, HeaderValue::from_static("bearer abc.def"));
        assert_eq!(extract_bearer_token(&headers).as_deref(), Some("abc.def"));
    }
}
