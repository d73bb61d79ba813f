use super::{Role, UserAccount, UserAccountStore, UserStatus};
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{postgres::PgRow, PgPool, Row};
use tracing::Instrument;
use uuid::Uuid;

const SELECT_COLUMNS: &str =
    "id, username, role, status, password_hash, email, phone, created_at";

/// Postgres-backed account store over the `users` table.
#[derive(Clone, Debug)]
pub struct PgUserAccountStore {
    pool: PgPool,
}

impl PgUserAccountStore {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn query_span(operation: &'static str, statement: &str) -> tracing::Span {
    tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = operation,
        db.statement = statement
    )
}

fn map_account(row: &PgRow) -> Result<UserAccount> {
    let role: String = row.try_get("role")?;
    let status: String = row.try_get("status")?;
    Ok(UserAccount {
        id: row.try_get("id")?,
        username: row.try_get("username")?,
        role: role.parse()?,
        status: status.parse()?,
        password_hash: row.try_get("password_hash")?,
        email: row.try_get("email")?,
        phone: row.try_get("phone")?,
        created_at: row.try_get("created_at")?,
    })
}

#[async_trait]
impl UserAccountStore for PgUserAccountStore {
    async fn get_by_id(&self, id: Uuid) -> Result<Option<UserAccount>> {
        let query = format!("SELECT {SELECT_COLUMNS} FROM users WHERE id = $1");
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .instrument(query_span("SELECT", &query))
            .await
            .context("failed to lookup user by id")?;
        row.as_ref().map(map_account).transpose()
    }

    async fn get_by_username(&self, username: &str) -> Result<Option<UserAccount>> {
        let query = format!("SELECT {SELECT_COLUMNS} FROM users WHERE username = $1");
        let row = sqlx::query(&query)
            .bind(username)
            .fetch_optional(&self.pool)
            .instrument(query_span("SELECT", &query))
            .await
            .context("failed to lookup user by username")?;
        row.as_ref().map(map_account).transpose()
    }

    async fn create(&self, account: &UserAccount) -> Result<bool> {
        let query = r"
            INSERT INTO users (id, username, role, status, password_hash, email, phone, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (username) DO NOTHING
        ";
        let result = sqlx::query(query)
            .bind(account.id)
            .bind(&account.username)
            .bind(account.role.as_str())
            .bind(account.status.as_str())
            .bind(&account.password_hash)
            .bind(&account.email)
            .bind(&account.phone)
            .bind(account.created_at)
            .execute(&self.pool)
            .instrument(query_span("INSERT", query))
            .await
            .context("failed to insert user")?;
        Ok(result.rows_affected() == 1)
    }

    async fn update_password_hash(&self, id: Uuid, password_hash: &str) -> Result<bool> {
        let query = "UPDATE users SET password_hash = $2 WHERE id = $1";
        let result = sqlx::query(query)
            .bind(id)
            .bind(password_hash)
            .execute(&self.pool)
            .instrument(query_span("UPDATE", query))
            .await
            .context("failed to update password hash")?;
        Ok(result.rows_affected() == 1)
    }

    async fn update_status(&self, id: Uuid, status: UserStatus) -> Result<Option<UserAccount>> {
        let query = format!("UPDATE users SET status = $2 WHERE id = $1 RETURNING {SELECT_COLUMNS}");
        let row = sqlx::query(&query)
            .bind(id)
            .bind(status.as_str())
            .fetch_optional(&self.pool)
            .instrument(query_span("UPDATE", &query))
            .await
            .context("failed to update user status")?;
        row.as_ref().map(map_account).transpose()
    }

    async fn update_role(&self, id: Uuid, role: Role) -> Result<Option<UserAccount>> {
        let query = format!("UPDATE users SET role = $2 WHERE id = $1 RETURNING {SELECT_COLUMNS}");
        let row = sqlx::query(&query)
            .bind(id)
            .bind(role.as_str())
            .fetch_optional(&self.pool)
            .instrument(query_span("UPDATE", &query))
            .await
            .context("failed to update user role")?;
        row.as_ref().map(map_account).transpose()
    }

    async fn update_contact(
        &self,
        id: Uuid,
        email: Option<&str>,
        phone: Option<&str>,
    ) -> Result<Option<UserAccount>> {
        let query = format!(
            "UPDATE users SET email = $2, phone = $3 WHERE id = $1 RETURNING {SELECT_COLUMNS}"
        );
        let row = sqlx::query(&query)
            .bind(id)
            .bind(email)
            .bind(phone)
            .fetch_optional(&self.pool)
            .instrument(query_span("UPDATE", &query))
            .await
            .context("failed to update user contact")?;
        row.as_ref().map(map_account).transpose()
    }

    async fn delete(&self, id: Uuid) -> Result<Option<UserAccount>> {
        let query = format!("DELETE FROM users WHERE id = $1 RETURNING {SELECT_COLUMNS}");
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .instrument(query_span("DELETE", &query))
            .await
            .context("failed to delete user")?;
        row.as_ref().map(map_account).transpose()
    }

    async fn list(&self) -> Result<Vec<UserAccount>> {
        let query = format!("SELECT {SELECT_COLUMNS} FROM users ORDER BY username");
        let rows = sqlx::query(&query)
            .fetch_all(&self.pool)
            .instrument(query_span("SELECT", &query))
            .await
            .context("failed to list users")?;
        rows.iter().map(map_account).collect()
    }
}
