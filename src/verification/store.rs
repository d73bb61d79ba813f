//! Persistence contract for verification references.
//!
//! Every write is a single statement (or a single transaction for
//! [`VerificationStore::replace_for_objective`]) and returns the row as it
//! stands afterwards, so a caller always reads its own write. State
//! transitions are compare-and-set: a method that returns `None` either found
//! no row or found one that was not in the required state.

use super::model::{ChannelBinding, Objective, VerificationReference};
use anyhow::Result;
use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

#[async_trait]
pub trait VerificationStore: Send + Sync {
    /// Insert a reference as given.
    async fn create(&self, reference: &VerificationReference) -> Result<()>;

    /// Atomically delete every reference for `(owner, objective)` and insert
    /// `reference`. Concurrent calls for the same pair serialize.
    async fn replace_for_objective(&self, reference: &VerificationReference) -> Result<()>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<VerificationReference>>;

    /// Bind a channel and code to an `INACTIVE`, unrevoked reference that has
    /// not expired at `now`.
    async fn set_channel(
        &self,
        id: Uuid,
        binding: &ChannelBinding,
        now: OffsetDateTime,
    ) -> Result<Option<VerificationReference>>;

    /// `INACTIVE -> ACTIVE` with a new expiry. Only one caller can win.
    async fn activate(
        &self,
        id: Uuid,
        now: OffsetDateTime,
        expires_at: OffsetDateTime,
    ) -> Result<Option<VerificationReference>>;

    /// Clamp `expires_at` to `now` and stamp `revoked_at` once. Repeating the
    /// call leaves the row unchanged.
    async fn revoke(&self, id: Uuid, now: OffsetDateTime) -> Result<Option<VerificationReference>>;

    /// Revoke an `ACTIVE`, unexpired, unrevoked reference for `objective` and
    /// return it. Only one caller can win.
    async fn consume(
        &self,
        id: Uuid,
        objective: &Objective,
        now: OffsetDateTime,
    ) -> Result<Option<VerificationReference>>;

    /// Count one wrong code against an `INACTIVE`, unrevoked reference. The
    /// attempt that reaches `max_attempts` also revokes it at `now`.
    async fn record_failed_attempt(
        &self,
        id: Uuid,
        max_attempts: u32,
        now: OffsetDateTime,
    ) -> Result<Option<VerificationReference>>;

    /// Delete the owner's references for `objective` that have ended by
    /// `now`. Returns the number of deleted references.
    async fn purge_expired(
        &self,
        owner_id: Uuid,
        objective: &Objective,
        now: OffsetDateTime,
    ) -> Result<u64>;

    /// Returns the number of deleted references.
    async fn delete_by_objective(&self, owner_id: Uuid, objective: &Objective) -> Result<u64>;

    /// Returns `false` when nothing was deleted.
    async fn delete(&self, id: Uuid) -> Result<bool>;

    /// Liveness check for the health endpoint.
    async fn ping(&self) -> Result<()>;
}
