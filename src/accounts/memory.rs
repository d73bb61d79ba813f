use super::{Role, UserAccount, UserAccountStore, UserStatus};
use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

/// In-process account store for tests and local runs.
#[derive(Debug, Default)]
pub struct MemoryUserAccountStore {
    accounts: Mutex<HashMap<Uuid, UserAccount>>,
}

impl MemoryUserAccountStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserAccountStore for MemoryUserAccountStore {
    async fn get_by_id(&self, id: Uuid) -> Result<Option<UserAccount>> {
        Ok(self.accounts.lock().await.get(&id).cloned())
    }

    async fn get_by_username(&self, username: &str) -> Result<Option<UserAccount>> {
        let accounts = self.accounts.lock().await;
        Ok(accounts
            .values()
            .find(|account| account.username == username)
            .cloned())
    }

    async fn create(&self, account: &UserAccount) -> Result<bool> {
        let mut accounts = self.accounts.lock().await;
        if accounts
            .values()
            .any(|existing| existing.username == account.username)
        {
            return Ok(false);
        }
        accounts.insert(account.id, account.clone());
        Ok(true)
    }

    async fn update_password_hash(&self, id: Uuid, password_hash: &str) -> Result<bool> {
        let mut accounts = self.accounts.lock().await;
        Ok(accounts.get_mut(&id).map_or(false, |account| {
            account.password_hash = password_hash.to_string();
            true
        }))
    }

    async fn update_status(&self, id: Uuid, status: UserStatus) -> Result<Option<UserAccount>> {
        let mut accounts = self.accounts.lock().await;
        Ok(accounts.get_mut(&id).map(|account| {
            account.status = status;
            account.clone()
        }))
    }

    async fn update_role(&self, id: Uuid, role: Role) -> Result<Option<UserAccount>> {
        let mut accounts = self.accounts.lock().await;
        Ok(accounts.get_mut(&id).map(|account| {
            account.role = role;
            account.clone()
        }))
    }

    async fn update_contact(
        &self,
        id: Uuid,
        email: Option<&str>,
        phone: Option<&str>,
    ) -> Result<Option<UserAccount>> {
        let mut accounts = self.accounts.lock().await;
        Ok(accounts.get_mut(&id).map(|account| {
            account.email = email.map(str::to_string);
            account.phone = phone.map(str::to_string);
            account.clone()
        }))
    }

    async fn delete(&self, id: Uuid) -> Result<Option<UserAccount>> {
        Ok(self.accounts.lock().await.remove(&id))
    }

    async fn list(&self) -> Result<Vec<UserAccount>> {
        let mut all: Vec<_> = self.accounts.lock().await.values().cloned().collect();
        all.sort_by(|a, b| a.username.cmp(&b.username));
        Ok(all)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::OffsetDateTime;

    fn account(username: &str) -> UserAccount {
        UserAccount {
            id: Uuid::new_v4(),
            username: username.to_string(),
            role: Role::User,
            status: UserStatus::Active,
            password_hash: String::new(),
            email: None,
            phone: None,
            created_at: OffsetDateTime::UNIX_EPOCH,
        }
    }

    #[tokio::test]
    async fn duplicate_username_is_refused() -> Result<()> {
        let store = MemoryUserAccountStore::new();
        assert!(store.create(&account("alice")).await?);
        assert!(!store.create(&account("alice")).await?);
        assert_eq!(store.list().await?.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn updates_return_the_new_state() -> Result<()> {
        let store = MemoryUserAccountStore::new();
        let alice = account("alice");
        store.create(&alice).await?;

        let updated = store.update_role(alice.id, Role::Admin).await?;
        assert_eq!(updated.map(|a| a.role), Some(Role::Admin));

        let updated = store.update_status(alice.id, UserStatus::Inactive).await?;
        assert_eq!(updated.map(|a| a.status), Some(UserStatus::Inactive));

        assert!(store.update_role(Uuid::new_v4(), Role::Admin).await?.is_none());
        assert!(!store.update_password_hash(Uuid::new_v4(), "x").await?);
        Ok(())
    }

    #[tokio::test]
    async fn contact_update_overwrites_both_fields() -> Result<()> {
        let store = MemoryUserAccountStore::new();
        let mut alice = account("alice");
        alice.phone = Some("+15551234567".to_string());
        store.create(&alice).await?;

        let updated = store
            .update_contact(alice.id, Some("alice@example.com"), None)
            .await?;
        assert_eq!(
            updated.map(|a| (a.email, a.phone)),
            Some((Some("alice@example.com".to_string()), None))
        );
        assert!(store
            .update_contact(Uuid::new_v4(), None, None)
            .await?
            .is_none());
        Ok(())
    }

    #[tokio::test]
    async fn delete_returns_the_removed_account() -> Result<()> {
        let store = MemoryUserAccountStore::new();
        let alice = account("alice");
        store.create(&alice).await?;

        assert_eq!(store.delete(alice.id).await?.map(|a| a.id), Some(alice.id));
        assert!(store.get_by_id(alice.id).await?.is_none());
        assert!(store.delete(alice.id).await?.is_none());
        // The username is free again.
        assert!(store.create(&account("alice")).await?);
        Ok(())
    }

    #[tokio::test]
    async fn list_is_sorted_by_username() -> Result<()> {
        let store = MemoryUserAccountStore::new();
        store.create(&account("carol")).await?;
        store.create(&account("alice")).await?;
        store.create(&account("bob")).await?;
        let names: Vec<_> = store
            .list()
            .await?
            .into_iter()
            .map(|a| a.username)
            .collect();
        assert_eq!(names, ["alice", "bob", "carol"]);
        Ok(())
    }
}
