use super::{
    model::{ChannelBinding, Objective, ReferenceStatus, VerificationReference},
    store::VerificationStore,
};
use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use uuid::Uuid;

/// In-process reference store for tests and local runs. A single lock makes
/// every operation atomic.
#[derive(Debug, Default)]
pub struct MemoryVerificationStore {
    references: Mutex<HashMap<Uuid, VerificationReference>>,
}

impl MemoryVerificationStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All references owned by `owner_id`.
    pub async fn owned_by(&self, owner_id: Uuid) -> Vec<VerificationReference> {
        self.references
            .lock()
            .await
            .values()
            .filter(|reference| reference.owner_id == owner_id)
            .cloned()
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.references.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.references.lock().await.is_empty()
    }
}

#[async_trait]
impl VerificationStore for MemoryVerificationStore {
    async fn create(&self, reference: &VerificationReference) -> Result<()> {
        self.references
            .lock()
            .await
            .insert(reference.id, reference.clone());
        Ok(())
    }

    async fn replace_for_objective(&self, reference: &VerificationReference) -> Result<()> {
        let mut references = self.references.lock().await;
        references.retain(|_, existing| {
            existing.owner_id != reference.owner_id || existing.objective != reference.objective
        });
        references.insert(reference.id, reference.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<VerificationReference>> {
        Ok(self.references.lock().await.get(&id).cloned())
    }

    async fn set_channel(
        &self,
        id: Uuid,
        binding: &ChannelBinding,
        now: OffsetDateTime,
    ) -> Result<Option<VerificationReference>> {
        let mut references = self.references.lock().await;
        Ok(references
            .get_mut(&id)
            .filter(|reference| {
                reference.status == ReferenceStatus::Inactive
                    && !reference.is_revoked()
                    && !reference.is_expired_at(now)
            })
            .map(|reference| {
                reference.channel = Some(binding.channel);
                reference.channel_info = Some(binding.channel_info.clone());
                reference.correlation_id = Some(binding.correlation_id.clone());
                reference.code = Some(binding.code.clone());
                reference.expires_at = binding.expires_at;
                reference.clone()
            }))
    }

    async fn activate(
        &self,
        id: Uuid,
        now: OffsetDateTime,
        expires_at: OffsetDateTime,
    ) -> Result<Option<VerificationReference>> {
        let mut references = self.references.lock().await;
        Ok(references
            .get_mut(&id)
            .filter(|reference| {
                reference.status == ReferenceStatus::Inactive
                    && !reference.is_revoked()
                    && !reference.is_expired_at(now)
            })
            .map(|reference| {
                reference.status = ReferenceStatus::Active;
                reference.expires_at = expires_at;
                reference.clone()
            }))
    }

    async fn revoke(&self, id: Uuid, now: OffsetDateTime) -> Result<Option<VerificationReference>> {
        let mut references = self.references.lock().await;
        Ok(references.get_mut(&id).map(|reference| {
            reference.expires_at = reference.expires_at.min(now);
            reference.revoked_at = reference.revoked_at.or(Some(now));
            reference.clone()
        }))
    }

    async fn consume(
        &self,
        id: Uuid,
        objective: &Objective,
        now: OffsetDateTime,
    ) -> Result<Option<VerificationReference>> {
        let mut references = self.references.lock().await;
        Ok(references
            .get_mut(&id)
            .filter(|reference| reference.authorizes(objective, now))
            .map(|reference| {
                reference.expires_at = now;
                reference.revoked_at = Some(now);
                reference.clone()
            }))
    }

    async fn record_failed_attempt(
        &self,
        id: Uuid,
        max_attempts: u32,
        now: OffsetDateTime,
    ) -> Result<Option<VerificationReference>> {
        let mut references = self.references.lock().await;
        Ok(references
            .get_mut(&id)
            .filter(|reference| {
                reference.status == ReferenceStatus::Inactive && !reference.is_revoked()
            })
            .map(|reference| {
                reference.failed_attempts = reference.failed_attempts.saturating_add(1);
                if reference.failed_attempts >= max_attempts {
                    reference.expires_at = reference.expires_at.min(now);
                    reference.revoked_at = Some(now);
                }
                reference.clone()
            }))
    }

    async fn purge_expired(
        &self,
        owner_id: Uuid,
        objective: &Objective,
        now: OffsetDateTime,
    ) -> Result<u64> {
        let mut references = self.references.lock().await;
        let before = references.len();
        references.retain(|_, existing| {
            existing.owner_id != owner_id
                || existing.objective != *objective
                || !existing.is_expired_at(now)
        });
        Ok((before - references.len()) as u64)
    }

    async fn delete_by_objective(&self, owner_id: Uuid, objective: &Objective) -> Result<u64> {
        let mut references = self.references.lock().await;
        let before = references.len();
        references.retain(|_, existing| {
            existing.owner_id != owner_id || existing.objective != *objective
        });
        Ok((before - references.len()) as u64)
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        Ok(self.references.lock().await.remove(&id).is_some())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}
