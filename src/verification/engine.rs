//! The verification state machine.
//!
//! Flow Overview:
//! 1. `request_verification` purges live references for `(user, objective)` and
//!    stores a fresh `INACTIVE` one.
//! 2. `select_channel` binds a known destination, a numeric code and a short
//!    correlation id, then delivers them out of band.
//! 3. `confirm_code` activates the reference exactly once and mints an action
//!    token bound to its objective.
//! 4. `issue_access_token` skips the code step: a correct password yields an
//!    `ACTIVE` `access-session` reference and an access token.
//! 5. `verify_password` lets a signed-in caller trade their password for an
//!    action token, again without a code.
//! 6. `validate_for_access` / `validate_for_action` re-check token, reference and
//!    owning user on every request.
//!
//! Failures are returned, never logged here; the HTTP boundary logs them once.

use super::{
    clock::{Clock, SystemClock},
    config::VerificationConfig,
    model::{
        mask_destination, Channel, ChannelBinding, Objective, ReferenceStatus,
        VerificationReference,
    },
    random::{OsRandom, SecureRandom},
    store::VerificationStore,
};
use crate::{
    accounts::{
        Argon2PasswordHasher, PasswordHasher, Role, UserAccount, UserAccountStore, UserStatus,
    },
    error::{AuthError, CredentialFailure, Expiry, Lookup, Mismatch},
    notify::{self, LogNotificationSender, Notification, NotificationSender},
    token::{AccessClaims, ActionClaims, TokenIssuer},
};
use anyhow::{anyhow, Context};
use once_cell::sync::{Lazy, OnceCell};
use regex::Regex;
use std::{future::Future, sync::Arc};
use subtle::ConstantTimeEq;
use time::OffsetDateTime;
use tracing::{debug, info};
use uuid::Uuid;

const PASSWORD_MIN_CHARS: usize = 8;
const PASSWORD_MAX_CHARS: usize = 256;

// Unknown usernames are checked against a hash of this so login costs the same either way.
const DUMMY_PASSWORD: &str = "stockpile-dummy-password";

static USERNAME_PATTERN: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9._-]{3,64}$").ok());
static EMAIL_PATTERN: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").ok());
static PHONE_PATTERN: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"^\+?[0-9][0-9 -]{5,19}$").ok());

/// A destination the user may choose for code delivery.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChannelOption {
    pub channel: Channel,
    pub destination_hint: String,
}

/// Result of `request_verification`.
#[derive(Clone, Debug)]
pub struct VerificationChallenge {
    pub reference_id: Uuid,
    pub channels: Vec<ChannelOption>,
    pub expires_at: OffsetDateTime,
}

/// Result of `select_channel`. The code itself only travels out of band.
#[derive(Clone, Debug)]
pub struct ChannelSelection {
    pub reference_id: Uuid,
    pub correlation_id: String,
    pub expires_at: OffsetDateTime,
}

#[derive(Clone, Debug)]
pub struct IssuedToken {
    pub token: String,
    pub reference_id: Uuid,
    pub expires_at: OffsetDateTime,
}

/// Caller of a session-authenticated request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identity {
    pub user_id: Uuid,
    /// Snapshot taken when the access token was minted.
    pub role: Role,
    pub ref_id: Uuid,
}

/// Caller of a request authorized by an action token.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ActionIdentity {
    pub user_id: Uuid,
    pub ref_id: Uuid,
    pub objective: Objective,
}

#[derive(Clone, Debug)]
pub struct NewAccount {
    pub username: String,
    pub password: String,
    pub email: Option<String>,
    pub phone: Option<String>,
}

/// Replacement contact destinations. `None` clears the field.
#[derive(Clone, Debug, Default)]
pub struct ContactUpdate {
    pub email: Option<String>,
    pub phone: Option<String>,
}

pub struct VerificationEngine {
    config: VerificationConfig,
    tokens: TokenIssuer,
    references: Arc<dyn VerificationStore>,
    users: Arc<dyn UserAccountStore>,
    hasher: Arc<dyn PasswordHasher>,
    random: Arc<dyn SecureRandom>,
    notifier: Arc<dyn NotificationSender>,
    clock: Arc<dyn Clock>,
    dummy_hash: OnceCell<String>,
}

impl VerificationEngine {
    /// Engine with OS randomness, Argon2id, the system clock and the log sender.
    #[must_use]
    pub fn new(
        config: VerificationConfig,
        tokens: TokenIssuer,
        references: Arc<dyn VerificationStore>,
        users: Arc<dyn UserAccountStore>,
    ) -> Self {
        Self {
            config,
            tokens,
            references,
            users,
            hasher: Arc::new(Argon2PasswordHasher),
            random: Arc::new(OsRandom),
            notifier: Arc::new(LogNotificationSender),
            clock: Arc::new(SystemClock),
            dummy_hash: OnceCell::new(),
        }
    }

    #[must_use]
    pub fn with_hasher(mut self, hasher: Arc<dyn PasswordHasher>) -> Self {
        self.hasher = hasher;
        self.dummy_hash = OnceCell::new();
        self
    }

    #[must_use]
    pub fn with_random(mut self, random: Arc<dyn SecureRandom>) -> Self {
        self.random = random;
        self
    }

    #[must_use]
    pub fn with_notifier(mut self, notifier: Arc<dyn NotificationSender>) -> Self {
        self.notifier = notifier;
        self
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub const fn config(&self) -> &VerificationConfig {
        &self.config
    }

    #[must_use]
    pub const fn tokens(&self) -> &TokenIssuer {
        &self.tokens
    }

    #[must_use]
    pub fn now(&self) -> OffsetDateTime {
        self.clock.now()
    }

    /// Open a verification for `objective` on behalf of `username`.
    ///
    /// # Errors
    /// `Validation` for a malformed or reserved objective or a user without
    /// deliverable channels, `NotFound(User)` for an unknown username,
    /// `StatusMismatch(UserInactive)` for a deactivated account.
    pub async fn request_verification(
        &self,
        username: &str,
        objective: &str,
    ) -> Result<VerificationChallenge, AuthError> {
        let objective = Objective::parse(objective)?;
        if objective.is_access_session() {
            return Err(AuthError::Validation(
                "access-session references are only issued by login".to_string(),
            ));
        }

        let user = self.load_user_by_username(username).await?;
        if !user.is_active() {
            return Err(AuthError::StatusMismatch(Mismatch::UserInactive));
        }

        let channels = deliverable_channels(&user);
        if channels.is_empty() {
            return Err(AuthError::Validation(
                "user has no deliverable channel".to_string(),
            ));
        }

        let now = self.now();
        let reference = VerificationReference::pending(
            user.id,
            objective,
            now,
            now + self.config.code_window(),
        );
        self.bounded(self.references.replace_for_objective(&reference))
            .await?;

        info!(
            reference_id = %reference.id,
            objective = %reference.objective,
            "verification requested"
        );

        Ok(VerificationChallenge {
            reference_id: reference.id,
            channels: channels
                .into_iter()
                .map(|(channel, destination)| ChannelOption {
                    channel,
                    destination_hint: mask_destination(channel, &destination),
                })
                .collect(),
            expires_at: reference.expires_at,
        })
    }

    /// Bind a delivery channel, generate the code and deliver it.
    ///
    /// # Errors
    /// `StatusMismatch(AlreadyActive)` once the reference was confirmed,
    /// `Expired(Reference)` past its window, `Validation` for a channel the
    /// owner does not have or a destination that does not match it.
    pub async fn select_channel(
        &self,
        reference_id: Uuid,
        channel: Channel,
        channel_info: &str,
    ) -> Result<ChannelSelection, AuthError> {
        let reference = self.load_reference(reference_id).await?;
        let now = self.now();
        ensure_pending(&reference, now)?;

        let user = self.load_user(reference.owner_id).await?;
        if !user.is_active() {
            return Err(AuthError::StatusMismatch(Mismatch::UserInactive));
        }

        let destination = destination_for(&user, channel).ok_or_else(|| {
            AuthError::Validation(format!(
                "channel {} is not available for this user",
                channel.as_str()
            ))
        })?;
        let matches = normalize_destination(channel, &destination)
            .as_bytes()
            .ct_eq(normalize_destination(channel, channel_info).as_bytes());
        if !bool::from(matches) {
            return Err(AuthError::Validation(
                "channel info does not match the registered destination".to_string(),
            ));
        }

        let binding = ChannelBinding {
            channel,
            channel_info: destination.clone(),
            correlation_id: self.random.correlation_id(self.config.correlation_length()),
            code: self.random.numeric_code(self.config.code_length()),
            expires_at: now + self.config.code_window(),
        };

        let Some(updated) = self
            .bounded(self.references.set_channel(reference_id, &binding, now))
            .await?
        else {
            return Err(self.explain_lost_transition(reference_id, now).await);
        };

        notify::dispatch(
            Arc::clone(&self.notifier),
            Notification::verification_code(
                updated.id,
                channel,
                destination,
                &binding.correlation_id,
                &binding.code,
            ),
        );

        debug!(reference_id = %updated.id, channel = channel.as_str(), "channel selected");

        Ok(ChannelSelection {
            reference_id: updated.id,
            correlation_id: binding.correlation_id,
            expires_at: updated.expires_at,
        })
    }

    /// Confirm the delivered code and mint an action token.
    ///
    /// # Errors
    /// Each failed condition has its own reason: `NotFound(Reference)`,
    /// `StatusMismatch(Revoked)`, `Expired(Reference)`,
    /// `StatusMismatch(AlreadyActive)`, `StatusMismatch(ChannelNotSelected)`,
    /// and `Credential(WrongCode)` for a code or correlation id mismatch.
    /// Every mismatch is counted; the one that reaches the configured limit
    /// revokes the reference.
    pub async fn confirm_code(
        &self,
        reference_id: Uuid,
        correlation_id: &str,
        code: &str,
    ) -> Result<IssuedToken, AuthError> {
        let reference = self.load_reference(reference_id).await?;
        let now = self.now();
        ensure_pending(&reference, now)?;

        let (Some(expected_correlation), Some(expected_code)) =
            (&reference.correlation_id, &reference.code)
        else {
            return Err(AuthError::StatusMismatch(Mismatch::ChannelNotSelected));
        };

        // Both halves are compared before deciding so timing does not reveal which one failed.
        let correlation = correlation_id.trim().to_ascii_uppercase();
        let matched = expected_correlation
            .as_bytes()
            .ct_eq(correlation.as_bytes())
            & expected_code.as_bytes().ct_eq(code.trim().as_bytes());
        if !bool::from(matched) {
            let counted = self
                .bounded(self.references.record_failed_attempt(
                    reference_id,
                    self.config.max_code_attempts(),
                    now,
                ))
                .await?;
            if let Some(locked) = counted.filter(VerificationReference::is_revoked) {
                info!(
                    reference_id = %locked.id,
                    failed_attempts = locked.failed_attempts,
                    "verification locked"
                );
            }
            return Err(AuthError::Credential(CredentialFailure::WrongCode));
        }

        let expires_at = now + self.config.action_window();
        let Some(activated) = self
            .bounded(self.references.activate(reference_id, now, expires_at))
            .await?
        else {
            return Err(self.explain_lost_transition(reference_id, now).await);
        };

        let token = self.tokens.sign_action(&ActionClaims {
            ref_id: activated.id,
            objective: activated.objective.clone(),
            exp: activated.expires_at.unix_timestamp(),
        })?;

        info!(
            reference_id = %activated.id,
            objective = %activated.objective,
            "verification confirmed"
        );

        Ok(IssuedToken {
            token,
            reference_id: activated.id,
            expires_at: activated.expires_at,
        })
    }

    /// Password login.
    ///
    /// # Errors
    /// `Credential(WrongPassword)` for an unknown user or wrong password (no
    /// reference is created), `StatusMismatch(UserInactive)` for a deactivated
    /// account.
    pub async fn issue_access_token(
        &self,
        username: &str,
        password: &str,
    ) -> Result<IssuedToken, AuthError> {
        let Some(user) = self
            .bounded(self.users.get_by_username(username.trim()))
            .await?
        else {
            let dummy = self.dummy_hash().await?;
            self.check_password(password, &dummy).await?;
            return Err(AuthError::Credential(CredentialFailure::WrongPassword));
        };

        if !self
            .check_password(password, &user.password_hash)
            .await?
        {
            return Err(AuthError::Credential(CredentialFailure::WrongPassword));
        }

        if !user.is_active() {
            return Err(AuthError::StatusMismatch(Mismatch::UserInactive));
        }

        self.mint_session(&user).await
    }

    /// Session keep-alive: a fresh reference replaces the current one.
    ///
    /// # Errors
    /// Fails when the current reference no longer authorizes `access-session`
    /// or its owner is gone or inactive.
    pub async fn renew_access_token(&self, current_ref: Uuid) -> Result<IssuedToken, AuthError> {
        let reference = self.load_reference(current_ref).await?;
        let now = self.now();
        reference.ensure_authorizes(&Objective::access_session(), now)?;

        let user = self.load_active_user(reference.owner_id).await?;
        let issued = self.mint_session(&user).await?;

        self.bounded(self.references.revoke(current_ref, now))
            .await?;

        debug!(
            previous = %current_ref,
            reference_id = %issued.reference_id,
            "session renewed"
        );

        Ok(issued)
    }

    /// Re-check a signed-in caller's password and mint an action token for
    /// `objective`. The reference is `ACTIVE` at once and replaces any other
    /// reference the caller holds for that objective.
    ///
    /// # Errors
    /// `Validation` for a malformed or reserved objective,
    /// `Credential(WrongPassword)` when the password is wrong (no reference is
    /// created), `StatusMismatch(UserInactive)` for a deactivated account.
    pub async fn verify_password(
        &self,
        identity: &Identity,
        password: &str,
        objective: &str,
    ) -> Result<IssuedToken, AuthError> {
        let objective = Objective::parse(objective)?;
        if objective.is_access_session() {
            return Err(AuthError::Validation(
                "access-session references are only issued by login".to_string(),
            ));
        }

        let user = self.load_active_user(identity.user_id).await?;
        if !self
            .check_password(password, &user.password_hash)
            .await?
        {
            return Err(AuthError::Credential(CredentialFailure::WrongPassword));
        }

        let now = self.now();
        let reference = VerificationReference::active(
            user.id,
            objective,
            Channel::Username,
            user.username,
            now,
            now + self.config.code_window(),
        );
        self.bounded(self.references.replace_for_objective(&reference))
            .await?;

        let token = self.tokens.sign_action(&ActionClaims {
            ref_id: reference.id,
            objective: reference.objective.clone(),
            exp: reference.expires_at.unix_timestamp(),
        })?;

        info!(
            reference_id = %reference.id,
            objective = %reference.objective,
            "password verified"
        );

        Ok(IssuedToken {
            token,
            reference_id: reference.id,
            expires_at: reference.expires_at,
        })
    }

    /// Revoke a reference. Repeating the call changes nothing.
    ///
    /// # Errors
    /// `NotFound(Reference)` when the reference does not exist.
    pub async fn revoke_reference(
        &self,
        reference_id: Uuid,
    ) -> Result<VerificationReference, AuthError> {
        let now = self.now();
        self.bounded(self.references.revoke(reference_id, now))
            .await?
            .ok_or(AuthError::NotFound(Lookup::Reference))
    }

    /// Verify an access token and the state behind it.
    ///
    /// # Errors
    /// Token, reference and user failures each surface with their own reason.
    pub async fn validate_for_access(&self, token: &str) -> Result<Identity, AuthError> {
        let claims = self
            .tokens
            .verify_access(token, self.now().unix_timestamp())?;
        self.authorize_access(&claims).await
    }

    /// Check already-verified access claims against the store.
    ///
    /// # Errors
    /// See [`VerificationEngine::validate_for_access`].
    pub async fn authorize_access(&self, claims: &AccessClaims) -> Result<Identity, AuthError> {
        let reference = self.load_reference(claims.ref_id).await?;
        reference.ensure_authorizes(&Objective::access_session(), self.now())?;
        let user = self.load_active_user(reference.owner_id).await?;

        Ok(Identity {
            user_id: user.id,
            role: claims.role,
            ref_id: reference.id,
        })
    }

    /// Verify an action token for `expected`.
    ///
    /// # Errors
    /// Token, reference and user failures each surface with their own reason.
    pub async fn validate_for_action(
        &self,
        token: &str,
        expected: &Objective,
    ) -> Result<ActionIdentity, AuthError> {
        let claims = self
            .tokens
            .verify_action(token, self.now().unix_timestamp())?;
        self.authorize_action(&claims, expected).await
    }

    /// Check already-verified action claims. The objective must match both the
    /// claim and the stored reference.
    ///
    /// # Errors
    /// See [`VerificationEngine::validate_for_action`].
    pub async fn authorize_action(
        &self,
        claims: &ActionClaims,
        expected: &Objective,
    ) -> Result<ActionIdentity, AuthError> {
        if claims.objective != *expected {
            return Err(AuthError::StatusMismatch(Mismatch::WrongObjective));
        }

        let reference = self.load_reference(claims.ref_id).await?;
        reference.ensure_authorizes(expected, self.now())?;
        let user = self.load_active_user(reference.owner_id).await?;

        Ok(ActionIdentity {
            user_id: user.id,
            ref_id: reference.id,
            objective: reference.objective,
        })
    }

    /// Register an `ACTIVE` account with the `USER` role.
    ///
    /// # Errors
    /// `Validation` for malformed fields, `Conflict` for a taken username.
    pub async fn sign_up(&self, account: NewAccount) -> Result<UserAccount, AuthError> {
        let user = self.register(account, Role::User).await?;
        info!(user_id = %user.id, "user signed up");
        Ok(user)
    }

    /// Admin account creation with an explicit role.
    ///
    /// # Errors
    /// Same as [`VerificationEngine::sign_up`].
    pub async fn create_user(
        &self,
        account: NewAccount,
        role: Role,
    ) -> Result<UserAccount, AuthError> {
        let user = self.register(account, role).await?;
        info!(user_id = %user.id, role = %user.role, "user created");
        Ok(user)
    }

    /// Replace the contact destinations of an account. References already
    /// bound to the old destinations keep them.
    ///
    /// # Errors
    /// `Validation` for a malformed email or phone, `NotFound(User)` when the
    /// account does not exist.
    pub async fn update_contact(
        &self,
        user_id: Uuid,
        contact: ContactUpdate,
    ) -> Result<UserAccount, AuthError> {
        let (email, phone) = validate_contact(contact.email, contact.phone)?;
        let user = self
            .bounded(
                self.users
                    .update_contact(user_id, email.as_deref(), phone.as_deref()),
            )
            .await?
            .ok_or(AuthError::NotFound(Lookup::User))?;
        info!(user_id = %user.id, "user contact updated");
        Ok(user)
    }

    /// Delete an account and, with it, every reference it owns.
    ///
    /// # Errors
    /// `Validation` when `caller` targets their own account, `NotFound(User)`
    /// when the account does not exist.
    pub async fn delete_user(
        &self,
        caller: &Identity,
        user_id: Uuid,
    ) -> Result<UserAccount, AuthError> {
        if caller.user_id == user_id {
            return Err(AuthError::Validation(
                "cannot delete your own account".to_string(),
            ));
        }
        let user = self
            .bounded(self.users.delete(user_id))
            .await?
            .ok_or(AuthError::NotFound(Lookup::User))?;
        info!(user_id = %user.id, "user deleted");
        Ok(user)
    }

    /// Replace the password of the action token's owner. The reference is
    /// consumed before the new hash is written, so the token works once.
    ///
    /// # Errors
    /// `StatusMismatch(WrongObjective)` unless the token was issued for
    /// `set-password`; a second use fails with `StatusMismatch(Revoked)`.
    pub async fn set_password(
        &self,
        identity: &ActionIdentity,
        new_password: &str,
    ) -> Result<(), AuthError> {
        let objective = Objective::set_password();
        if identity.objective != objective {
            return Err(AuthError::StatusMismatch(Mismatch::WrongObjective));
        }
        validate_password(new_password)?;

        let now = self.now();
        let consumed = self
            .bounded(self.references.consume(identity.ref_id, &objective, now))
            .await?;
        if consumed.is_none() {
            let reference = self.load_reference(identity.ref_id).await?;
            reference.ensure_authorizes(&objective, now)?;
            return Err(AuthError::StatusMismatch(Mismatch::Revoked));
        }

        let hash = self.hash_password(new_password).await?;
        if !self
            .bounded(self.users.update_password_hash(identity.user_id, &hash))
            .await?
        {
            return Err(AuthError::NotFound(Lookup::User));
        }

        info!(user_id = %identity.user_id, reference_id = %identity.ref_id, "password set");
        Ok(())
    }

    /// Change the caller's password after re-checking the current one.
    ///
    /// # Errors
    /// `Credential(WrongPassword)` when `current_password` is wrong.
    pub async fn change_password(
        &self,
        identity: &Identity,
        current_password: &str,
        new_password: &str,
    ) -> Result<(), AuthError> {
        validate_password(new_password)?;
        let user = self.load_active_user(identity.user_id).await?;
        if !self
            .check_password(current_password, &user.password_hash)
            .await?
        {
            return Err(AuthError::Credential(CredentialFailure::WrongPassword));
        }

        let hash = self.hash_password(new_password).await?;
        if !self
            .bounded(self.users.update_password_hash(user.id, &hash))
            .await?
        {
            return Err(AuthError::NotFound(Lookup::User));
        }

        info!(user_id = %user.id, "password changed");
        Ok(())
    }

    /// # Errors
    /// `NotFound(User)` when the account is gone.
    pub async fn profile(&self, user_id: Uuid) -> Result<UserAccount, AuthError> {
        self.load_user(user_id).await
    }

    /// The reference and owner behind an action token.
    ///
    /// # Errors
    /// `NotFound` when either record is gone.
    pub async fn verification_info(
        &self,
        identity: &ActionIdentity,
    ) -> Result<(VerificationReference, UserAccount), AuthError> {
        let reference = self.load_reference(identity.ref_id).await?;
        let user = self.load_user(identity.user_id).await?;
        Ok((reference, user))
    }

    /// # Errors
    /// Only store failures.
    pub async fn list_users(&self) -> Result<Vec<UserAccount>, AuthError> {
        self.bounded(self.users.list()).await
    }

    /// # Errors
    /// `NotFound(User)` when the account does not exist.
    pub async fn update_user_status(
        &self,
        user_id: Uuid,
        status: UserStatus,
    ) -> Result<UserAccount, AuthError> {
        let user = self
            .bounded(self.users.update_status(user_id, status))
            .await?
            .ok_or(AuthError::NotFound(Lookup::User))?;
        info!(user_id = %user.id, status = %user.status, "user status updated");
        Ok(user)
    }

    /// Existing access tokens keep their role snapshot until they expire.
    ///
    /// # Errors
    /// `NotFound(User)` when the account does not exist.
    pub async fn update_user_role(&self, user_id: Uuid, role: Role) -> Result<UserAccount, AuthError> {
        let user = self
            .bounded(self.users.update_role(user_id, role))
            .await?
            .ok_or(AuthError::NotFound(Lookup::User))?;
        info!(user_id = %user.id, role = %user.role, "user role updated");
        Ok(user)
    }

    /// # Errors
    /// Returns the store failure, if any.
    pub async fn ping(&self) -> Result<(), AuthError> {
        self.bounded(self.references.ping()).await
    }

    async fn register(&self, account: NewAccount, role: Role) -> Result<UserAccount, AuthError> {
        let username = account.username.trim().to_string();
        if !valid_username(&username) {
            return Err(AuthError::Validation(
                "username must be 3-64 characters of letters, digits, '.', '_' or '-'".to_string(),
            ));
        }
        validate_password(&account.password)?;
        let (email, phone) = validate_contact(account.email, account.phone)?;

        let user = UserAccount {
            id: Uuid::new_v4(),
            username,
            role,
            status: UserStatus::Active,
            password_hash: self.hash_password(&account.password).await?,
            email,
            phone,
            created_at: self.now(),
        };

        if !self.bounded(self.users.create(&user)).await? {
            return Err(AuthError::Conflict("username is taken".to_string()));
        }
        Ok(user)
    }

    /// Each login or renewal first drops the owner's sessions that already
    /// ended, so revoked and expired session rows do not pile up.
    async fn mint_session(&self, user: &UserAccount) -> Result<IssuedToken, AuthError> {
        let now = self.now();
        let objective = Objective::access_session();
        let purged = self
            .bounded(self.references.purge_expired(user.id, &objective, now))
            .await?;
        if purged > 0 {
            debug!(user_id = %user.id, purged, "ended sessions purged");
        }

        let reference = VerificationReference::active(
            user.id,
            objective,
            Channel::Username,
            user.username.clone(),
            now,
            now + self.config.session_window(),
        );
        self.bounded(self.references.create(&reference)).await?;

        let token = self.tokens.sign_access(&AccessClaims {
            ref_id: reference.id,
            role: user.role,
            exp: reference.expires_at.unix_timestamp(),
        })?;

        info!(user_id = %user.id, reference_id = %reference.id, "session issued");

        Ok(IssuedToken {
            token,
            reference_id: reference.id,
            expires_at: reference.expires_at,
        })
    }

    // A compare-and-set lost the race or hit a changed row: report what the row looks like now.
    async fn explain_lost_transition(&self, reference_id: Uuid, now: OffsetDateTime) -> AuthError {
        match self.load_reference(reference_id).await {
            Ok(reference) => ensure_pending(&reference, now)
                .err()
                .unwrap_or(AuthError::StatusMismatch(Mismatch::AlreadyActive)),
            Err(err) => err,
        }
    }

    async fn load_reference(&self, id: Uuid) -> Result<VerificationReference, AuthError> {
        self.bounded(self.references.find_by_id(id))
            .await?
            .ok_or(AuthError::NotFound(Lookup::Reference))
    }

    async fn load_user(&self, id: Uuid) -> Result<UserAccount, AuthError> {
        self.bounded(self.users.get_by_id(id))
            .await?
            .ok_or(AuthError::NotFound(Lookup::User))
    }

    async fn load_active_user(&self, id: Uuid) -> Result<UserAccount, AuthError> {
        let user = self.load_user(id).await?;
        if user.is_active() {
            Ok(user)
        } else {
            Err(AuthError::StatusMismatch(Mismatch::UserInactive))
        }
    }

    async fn load_user_by_username(&self, username: &str) -> Result<UserAccount, AuthError> {
        self.bounded(self.users.get_by_username(username.trim()))
            .await?
            .ok_or(AuthError::NotFound(Lookup::User))
    }

    async fn hash_password(&self, plain: &str) -> Result<String, AuthError> {
        let hasher = Arc::clone(&self.hasher);
        let plain = plain.to_string();
        let hash = tokio::task::spawn_blocking(move || hasher.hash(&plain))
            .await
            .context("password hashing task failed")??;
        Ok(hash)
    }

    async fn dummy_hash(&self) -> Result<String, AuthError> {
        if let Some(hash) = self.dummy_hash.get() {
            return Ok(hash.clone());
        }
        let hash = self.hash_password(DUMMY_PASSWORD).await?;
        Ok(self.dummy_hash.get_or_init(|| hash).clone())
    }

    async fn check_password(&self, plain: &str, hash: &str) -> Result<bool, AuthError> {
        let hasher = Arc::clone(&self.hasher);
        let plain = plain.to_string();
        let hash = hash.to_string();
        let verified = tokio::task::spawn_blocking(move || hasher.verify(&plain, &hash))
            .await
            .context("password verification task failed")?;
        Ok(verified)
    }

    /// Run a store call under the configured deadline.
    async fn bounded<T, F>(&self, call: F) -> Result<T, AuthError>
    where
        F: Future<Output = anyhow::Result<T>>,
    {
        let deadline = self.config.store_timeout();
        match tokio::time::timeout(deadline, call).await {
            Ok(result) => result.map_err(AuthError::Internal),
            Err(_) => Err(AuthError::Internal(anyhow!(
                "store call exceeded {}s deadline",
                deadline.as_secs()
            ))),
        }
    }
}

impl std::fmt::Debug for VerificationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VerificationEngine")
            .field("config", &self.config)
            .field("tokens", &self.tokens)
            .finish_non_exhaustive()
    }
}

/// Revoked, expired and already-active references cannot take a channel or a code.
fn ensure_pending(reference: &VerificationReference, now: OffsetDateTime) -> Result<(), AuthError> {
    if reference.is_revoked() {
        return Err(AuthError::StatusMismatch(Mismatch::Revoked));
    }
    if reference.is_expired_at(now) {
        return Err(AuthError::Expired(Expiry::Reference));
    }
    if reference.status == ReferenceStatus::Active {
        return Err(AuthError::StatusMismatch(Mismatch::AlreadyActive));
    }
    Ok(())
}

fn deliverable_channels(user: &UserAccount) -> Vec<(Channel, String)> {
    [Channel::Mobile, Channel::Email]
        .into_iter()
        .filter_map(|channel| destination_for(user, channel).map(|dest| (channel, dest)))
        .collect()
}

fn destination_for(user: &UserAccount, channel: Channel) -> Option<String> {
    let destination = match channel {
        Channel::Email => user.email.as_ref(),
        Channel::Mobile => user.phone.as_ref(),
        Channel::Username => None,
    }?;
    if destination.trim().is_empty() {
        None
    } else {
        Some(destination.clone())
    }
}

fn normalize_destination(channel: Channel, value: &str) -> String {
    match channel {
        Channel::Email => value.trim().to_lowercase(),
        Channel::Mobile => value
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '-')
            .collect(),
        Channel::Username => value.trim().to_string(),
    }
}

fn normalize_optional(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn validate_contact(
    email: Option<String>,
    phone: Option<String>,
) -> Result<(Option<String>, Option<String>), AuthError> {
    let email = normalize_optional(email);
    if let Some(email) = &email {
        if !valid_email(email) {
            return Err(AuthError::Validation("invalid email address".to_string()));
        }
    }
    let phone = normalize_optional(phone);
    if let Some(phone) = &phone {
        if !valid_phone(phone) {
            return Err(AuthError::Validation("invalid phone number".to_string()));
        }
    }
    Ok((email, phone))
}

fn validate_password(password: &str) -> Result<(), AuthError> {
    let length = password.chars().count();
    if (PASSWORD_MIN_CHARS..=PASSWORD_MAX_CHARS).contains(&length) {
        Ok(())
    } else {
        Err(AuthError::Validation(format!(
            "password must be {PASSWORD_MIN_CHARS}-{PASSWORD_MAX_CHARS} characters"
        )))
    }
}

fn pattern_matches(pattern: &Lazy<Option<Regex>>, value: &str) -> bool {
    pattern.as_ref().map_or(false, |re| re.is_match(value))
}

fn valid_username(username: &str) -> bool {
    pattern_matches(&USERNAME_PATTERN, username)
}

fn valid_email(email: &str) -> bool {
    pattern_matches(&EMAIL_PATTERN, email)
}

fn valid_phone(phone: &str) -> bool {
    pattern_matches(&PHONE_PATTERN, phone)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_length_bounds() {
        assert!(validate_password("short").is_err());
        assert!(validate_password("eightchr").is_ok());
        assert!(validate_password(&"x".repeat(256)).is_ok());
        assert!(validate_password(&"x".repeat(257)).is_err());
    }

    #[test]
    fn validation_patterns_compile() {
        assert!(USERNAME_PATTERN.is_some());
        assert!(EMAIL_PATTERN.is_some());
        assert!(PHONE_PATTERN.is_some());
    }

    #[test]
    fn username_rules() {
        assert!(valid_username("alice"));
        assert!(valid_username("a.b-c_d"));
        assert!(!valid_username("al"));
        assert!(!valid_username("alice smith"));
    }

    #[test]
    fn contact_rules() {
        assert!(valid_email("alice@example.com"));
        assert!(!valid_email("alice@"));
        assert!(valid_phone("+1 555-123-4567"));
        assert!(!valid_phone("call me"));
    }

    #[test]
    fn mobile_destinations_ignore_formatting() {
        assert_eq!(
            normalize_destination(Channel::Mobile, "+1 555-123-4567"),
            "+15551234567"
        );
        assert_eq!(
            normalize_destination(Channel::Email, " Alice@Example.com "),
            "alice@example.com"
        );
    }
}
