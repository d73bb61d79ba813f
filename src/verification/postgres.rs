use super::{
    model::{Channel, ChannelBinding, Objective, VerificationReference},
    store::VerificationStore,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{postgres::PgRow, Connection, PgPool, Row};
use time::OffsetDateTime;
use tracing::{info_span, Instrument};
use uuid::Uuid;

const COLUMNS: &str = "id, owner_id, objective, channel, channel_info, correlation_id, code, \
                       status, failed_attempts, created_at, expires_at, revoked_at";

/// Postgres-backed reference store over the `verification_references` table.
#[derive(Clone, Debug)]
pub struct PgVerificationStore {
    pool: PgPool,
}

impl PgVerificationStore {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn query_span(operation: &'static str, statement: &str) -> tracing::Span {
    info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = operation,
        db.statement = statement
    )
}

fn map_reference(row: &PgRow) -> Result<VerificationReference> {
    let objective: String = row.try_get("objective")?;
    let channel: Option<String> = row.try_get("channel")?;
    let status: String = row.try_get("status")?;
    let failed_attempts: i32 = row.try_get("failed_attempts")?;
    Ok(VerificationReference {
        id: row.try_get("id")?,
        owner_id: row.try_get("owner_id")?,
        objective: Objective::parse(&objective)
            .with_context(|| format!("stored objective is invalid: {objective}"))?,
        channel: channel.as_deref().map(str::parse::<Channel>).transpose()?,
        channel_info: row.try_get("channel_info")?,
        correlation_id: row.try_get("correlation_id")?,
        code: row.try_get("code")?,
        status: status.parse()?,
        failed_attempts: u32::try_from(failed_attempts)
            .context("stored failed_attempts is negative")?,
        created_at: row.try_get("created_at")?,
        expires_at: row.try_get("expires_at")?,
        revoked_at: row.try_get("revoked_at")?,
    })
}

fn attempts_param(attempts: u32) -> i32 {
    i32::try_from(attempts).unwrap_or(i32::MAX)
}

async fn insert(
    executor: impl sqlx::PgExecutor<'_>,
    reference: &VerificationReference,
) -> Result<()> {
    let query = format!(
        "INSERT INTO verification_references ({COLUMNS}) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)"
    );
    sqlx::query(&query)
        .bind(reference.id)
        .bind(reference.owner_id)
        .bind(reference.objective.as_str())
        .bind(reference.channel.map(|channel| channel.as_str()))
        .bind(&reference.channel_info)
        .bind(&reference.correlation_id)
        .bind(&reference.code)
        .bind(reference.status.as_str())
        .bind(attempts_param(reference.failed_attempts))
        .bind(reference.created_at)
        .bind(reference.expires_at)
        .bind(reference.revoked_at)
        .execute(executor)
        .instrument(query_span("INSERT", &query))
        .await
        .context("failed to insert verification reference")?;
    Ok(())
}

#[async_trait]
impl VerificationStore for PgVerificationStore {
    async fn create(&self, reference: &VerificationReference) -> Result<()> {
        insert(&self.pool, reference).await
    }

    async fn replace_for_objective(&self, reference: &VerificationReference) -> Result<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("begin replace reference transaction")?;

        // Serializes concurrent requests for the same (owner, objective) until commit.
        let lock = "SELECT pg_advisory_xact_lock(hashtextextended($1::text || ':' || $2, 0))";
        sqlx::query(lock)
            .bind(reference.owner_id)
            .bind(reference.objective.as_str())
            .execute(&mut *tx)
            .instrument(query_span("SELECT", lock))
            .await
            .context("failed to lock owner objective")?;

        let purge = "DELETE FROM verification_references WHERE owner_id = $1 AND objective = $2";
        sqlx::query(purge)
            .bind(reference.owner_id)
            .bind(reference.objective.as_str())
            .execute(&mut *tx)
            .instrument(query_span("DELETE", purge))
            .await
            .context("failed to purge previous references")?;

        insert(&mut *tx, reference).await?;

        tx.commit()
            .await
            .context("commit replace reference transaction")?;
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<VerificationReference>> {
        let query = format!("SELECT {COLUMNS} FROM verification_references WHERE id = $1");
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .instrument(query_span("SELECT", &query))
            .await
            .context("failed to lookup verification reference")?;
        row.as_ref().map(map_reference).transpose()
    }

    async fn set_channel(
        &self,
        id: Uuid,
        binding: &ChannelBinding,
        now: OffsetDateTime,
    ) -> Result<Option<VerificationReference>> {
        let query = format!(
            "UPDATE verification_references \
             SET channel = $2, channel_info = $3, correlation_id = $4, code = $5, expires_at = $6 \
             WHERE id = $1 AND status = 'INACTIVE' AND revoked_at IS NULL AND expires_at > $7 \
             RETURNING {COLUMNS}"
        );
        let row = sqlx::query(&query)
            .bind(id)
            .bind(binding.channel.as_str())
            .bind(&binding.channel_info)
            .bind(&binding.correlation_id)
            .bind(&binding.code)
            .bind(binding.expires_at)
            .bind(now)
            .fetch_optional(&self.pool)
            .instrument(query_span("UPDATE", &query))
            .await
            .context("failed to bind verification channel")?;
        row.as_ref().map(map_reference).transpose()
    }

    async fn activate(
        &self,
        id: Uuid,
        now: OffsetDateTime,
        expires_at: OffsetDateTime,
    ) -> Result<Option<VerificationReference>> {
        let query = format!(
            "UPDATE verification_references SET status = 'ACTIVE', expires_at = $3 \
             WHERE id = $1 AND status = 'INACTIVE' AND revoked_at IS NULL AND expires_at > $2 \
             RETURNING {COLUMNS}"
        );
        let row = sqlx::query(&query)
            .bind(id)
            .bind(now)
            .bind(expires_at)
            .fetch_optional(&self.pool)
            .instrument(query_span("UPDATE", &query))
            .await
            .context("failed to activate verification reference")?;
        row.as_ref().map(map_reference).transpose()
    }

    async fn revoke(&self, id: Uuid, now: OffsetDateTime) -> Result<Option<VerificationReference>> {
        let query = format!(
            "UPDATE verification_references \
             SET expires_at = LEAST(expires_at, $2), revoked_at = COALESCE(revoked_at, $2) \
             WHERE id = $1 RETURNING {COLUMNS}"
        );
        let row = sqlx::query(&query)
            .bind(id)
            .bind(now)
            .fetch_optional(&self.pool)
            .instrument(query_span("UPDATE", &query))
            .await
            .context("failed to revoke verification reference")?;
        row.as_ref().map(map_reference).transpose()
    }

    async fn consume(
        &self,
        id: Uuid,
        objective: &Objective,
        now: OffsetDateTime,
    ) -> Result<Option<VerificationReference>> {
        let query = format!(
            "UPDATE verification_references SET expires_at = $3, revoked_at = $3 \
             WHERE id = $1 AND objective = $2 AND status = 'ACTIVE' \
             AND revoked_at IS NULL AND expires_at > $3 \
             RETURNING {COLUMNS}"
        );
        let row = sqlx::query(&query)
            .bind(id)
            .bind(objective.as_str())
            .bind(now)
            .fetch_optional(&self.pool)
            .instrument(query_span("UPDATE", &query))
            .await
            .context("failed to consume verification reference")?;
        row.as_ref().map(map_reference).transpose()
    }

    async fn record_failed_attempt(
        &self,
        id: Uuid,
        max_attempts: u32,
        now: OffsetDateTime,
    ) -> Result<Option<VerificationReference>> {
        // SET expressions read the pre-update row, so `failed_attempts + 1` is the new count.
        let query = format!(
            "UPDATE verification_references SET failed_attempts = failed_attempts + 1, \
             revoked_at = CASE WHEN failed_attempts + 1 >= $2 THEN $3 ELSE revoked_at END, \
             expires_at = CASE WHEN failed_attempts + 1 >= $2 \
                          THEN LEAST(expires_at, $3) ELSE expires_at END \
             WHERE id = $1 AND status = 'INACTIVE' AND revoked_at IS NULL \
             RETURNING {COLUMNS}"
        );
        let row = sqlx::query(&query)
            .bind(id)
            .bind(attempts_param(max_attempts))
            .bind(now)
            .fetch_optional(&self.pool)
            .instrument(query_span("UPDATE", &query))
            .await
            .context("failed to record failed verification attempt")?;
        row.as_ref().map(map_reference).transpose()
    }

    async fn purge_expired(
        &self,
        owner_id: Uuid,
        objective: &Objective,
        now: OffsetDateTime,
    ) -> Result<u64> {
        let query = "DELETE FROM verification_references \
                     WHERE owner_id = $1 AND objective = $2 AND expires_at <= $3";
        let result = sqlx::query(query)
            .bind(owner_id)
            .bind(objective.as_str())
            .bind(now)
            .execute(&self.pool)
            .instrument(query_span("DELETE", query))
            .await
            .context("failed to purge ended references")?;
        Ok(result.rows_affected())
    }

    async fn delete_by_objective(&self, owner_id: Uuid, objective: &Objective) -> Result<u64> {
        let query = "DELETE FROM verification_references WHERE owner_id = $1 AND objective = $2";
        let result = sqlx::query(query)
            .bind(owner_id)
            .bind(objective.as_str())
            .execute(&self.pool)
            .instrument(query_span("DELETE", query))
            .await
            .context("failed to delete references by objective")?;
        Ok(result.rows_affected())
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        let query = "DELETE FROM verification_references WHERE id = $1";
        let result = sqlx::query(query)
            .bind(id)
            .execute(&self.pool)
            .instrument(query_span("DELETE", query))
            .await
            .context("failed to delete verification reference")?;
        Ok(result.rows_affected() == 1)
    }

    async fn ping(&self) -> Result<()> {
        let acquire_span = info_span!(
            "db.acquire",
            db.system = "postgresql",
            db.operation = "ACQUIRE"
        );
        let mut conn = self
            .pool
            .acquire()
            .instrument(acquire_span)
            .await
            .context("failed to acquire database connection")?;
        let ping_span = info_span!("db.ping", db.system = "postgresql", db.operation = "PING");
        conn.ping()
            .instrument(ping_span)
            .await
            .context("failed to ping database")
    }
}
