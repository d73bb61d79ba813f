//! User accounts consumed by the verification engine.
//!
//! The engine only needs identity, role, status, the password hash and the
//! contact destinations a code can be delivered to.

mod memory;
mod password;
mod postgres;

pub use self::memory::MemoryUserAccountStore;
pub use self::password::{Argon2PasswordHasher, PasswordHasher};
pub use self::postgres::PgUserAccountStore;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use time::OffsetDateTime;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(ToSchema, Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    User,
    Admin,
}

#[derive(ToSchema, Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserStatus {
    Active,
    Inactive,
}

#[derive(Clone, Debug)]
pub struct UserAccount {
    pub id: Uuid,
    pub username: String,
    pub role: Role,
    pub status: UserStatus,
    pub password_hash: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub created_at: OffsetDateTime,
}

impl UserAccount {
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == UserStatus::Active
    }
}

/// Persistence for user accounts.
#[async_trait]
pub trait UserAccountStore: Send + Sync {
    async fn get_by_id(&self, id: Uuid) -> Result<Option<UserAccount>>;

    async fn get_by_username(&self, username: &str) -> Result<Option<UserAccount>>;

    /// Insert a new account. Returns `false` when the username is taken.
    async fn create(&self, account: &UserAccount) -> Result<bool>;

    /// Returns `false` when no such user exists.
    async fn update_password_hash(&self, id: Uuid, password_hash: &str) -> Result<bool>;

    async fn update_status(&self, id: Uuid, status: UserStatus) -> Result<Option<UserAccount>>;

    async fn update_role(&self, id: Uuid, role: Role) -> Result<Option<UserAccount>>;

    /// Overwrite both contact destinations.
    async fn update_contact(
        &self,
        id: Uuid,
        email: Option<&str>,
        phone: Option<&str>,
    ) -> Result<Option<UserAccount>>;

    /// Remove the account and return it as it was.
    async fn delete(&self, id: Uuid) -> Result<Option<UserAccount>>;

    /// All accounts ordered by username.
    async fn list(&self) -> Result<Vec<UserAccount>>;
}

impl Role {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "USER",
            Self::Admin => "ADMIN",
        }
    }
}

impl FromStr for Role {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value {
            "USER" => Ok(Self::User),
            "ADMIN" => Ok(Self::Admin),
            other => Err(anyhow!("unknown role: {other}")),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl UserStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::Inactive => "INACTIVE",
        }
    }
}

impl FromStr for UserStatus {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value {
            "ACTIVE" => Ok(Self::Active),
            "INACTIVE" => Ok(Self::Inactive),
            other => Err(anyhow!("unknown user status: {other}")),
        }
    }
}

impl fmt::Display for UserStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
