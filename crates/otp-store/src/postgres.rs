//! PostgreSQL store implementation.

use crate::error::{StoreError, StoreResult};
use crate::store::{CodeStore, IdentityStore};
use crate::types::{Identity, IssueOutcome, OneTimeCode};
use crate::window::SlidingWindow;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::{debug, info, instrument};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS users (
        id BIGSERIAL PRIMARY KEY,
        phone_number VARCHAR(20) UNIQUE NOT NULL,
        registered_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS otps (
        phone_number VARCHAR(20) PRIMARY KEY,
        code VARCHAR(6) NOT NULL,
        expires_at TIMESTAMPTZ NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS otp_requests (
        id BIGSERIAL PRIMARY KEY,
        phone_number VARCHAR(20) NOT NULL,
        requested_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_otp_requests_phone_time ON otp_requests (phone_number, requested_at)",
];

const IDENTITY_COLUMNS: &str = "id, phone_number, registered_at, created_at, updated_at";

/// Store backed by a PostgreSQL connection pool.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect a pool to `database_url`.
    pub async fn connect(
        database_url: &str,
        max_connections: u32,
        acquire_timeout: Duration,
    ) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(acquire_timeout)
            .connect(database_url)
            .await?;

        info!(max_connections, "Connected to PostgreSQL");
        Ok(Self::new(pool))
    }

    /// Create tables and indexes if they do not exist.
    pub async fn migrate(&self) -> StoreResult<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        info!("Database schema ensured");
        Ok(())
    }
}

/// Escape `%`, `_` and `\` so a search term matches literally inside ILIKE.
pub(crate) fn escape_like(search: &str) -> String {
    let mut escaped = String::with_capacity(search.len());
    for c in search.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn map_unique_violation(err: sqlx::Error, phone_number: &str) -> StoreError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            StoreError::Conflict(phone_number.to_string())
        }
        _ => StoreError::Database(err),
    }
}

#[async_trait]
impl CodeStore for PgStore {
    async fn count_issuances(&self, phone_number: &str, since: DateTime<Utc>) -> StoreResult<u64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM otp_requests WHERE phone_number = $1 AND requested_at >= $2",
        )
        .bind(phone_number)
        .bind(since)
        .fetch_one(&self.pool)
        .await?;

        Ok(count.max(0) as u64)
    }

    async fn upsert_code(&self, code: &OneTimeCode) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO otps (phone_number, code, expires_at, created_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (phone_number)
            DO UPDATE SET code = EXCLUDED.code,
                          expires_at = EXCLUDED.expires_at,
                          created_at = EXCLUDED.created_at
            "#,
        )
        .bind(&code.phone_number)
        .bind(&code.code)
        .bind(code.expires_at)
        .bind(code.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_code(&self, phone_number: &str) -> StoreResult<Option<OneTimeCode>> {
        let code = sqlx::query_as::<_, OneTimeCode>(
            "SELECT phone_number, code, expires_at, created_at FROM otps WHERE phone_number = $1",
        )
        .bind(phone_number)
        .fetch_optional(&self.pool)
        .await?;

        Ok(code)
    }

    #[instrument(skip(self, code))]
    async fn delete_code(&self, phone_number: &str, code: &str) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM otps WHERE phone_number = $1 AND code = $2")
            .bind(phone_number)
            .bind(code)
            .execute(&self.pool)
            .await?;

        debug!(rows = result.rows_affected(), "Delete live code");
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, code, window), fields(phone_number = %code.phone_number))]
    async fn issue(&self, code: &OneTimeCode, window: &SlidingWindow) -> StoreResult<IssueOutcome> {
        // Dropping `tx` without commit rolls everything back.
        let mut tx = self.pool.begin().await?;

        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(&code.phone_number)
            .execute(&mut *tx)
            .await?;

        let recent: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM otp_requests WHERE phone_number = $1 AND requested_at >= $2",
        )
        .bind(&code.phone_number)
        .bind(window.start(code.created_at))
        .fetch_one(&mut *tx)
        .await?;
        let recent = recent.max(0) as u64;

        if !window.admits(recent) {
            tx.rollback().await?;
            debug!(recent, "Issuance window full");
            return Ok(IssueOutcome::Limited { recent });
        }

        sqlx::query("INSERT INTO otp_requests (phone_number, requested_at) VALUES ($1, $2)")
            .bind(&code.phone_number)
            .bind(code.created_at)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO otps (phone_number, code, expires_at, created_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (phone_number)
            DO UPDATE SET code = EXCLUDED.code,
                          expires_at = EXCLUDED.expires_at,
                          created_at = EXCLUDED.created_at
            "#,
        )
        .bind(&code.phone_number)
        .bind(&code.code)
        .bind(code.expires_at)
        .bind(code.created_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        debug!(recent = recent + 1, "Issuance recorded");
        Ok(IssueOutcome::Issued)
    }
}

#[async_trait]
impl IdentityStore for PgStore {
    #[instrument(skip(self))]
    async fn create_identity(
        &self,
        phone_number: &str,
        registered_at: DateTime<Utc>,
    ) -> StoreResult<Identity> {
        let query = format!(
            "INSERT INTO users (phone_number, registered_at) VALUES ($1, $2) RETURNING {}",
            IDENTITY_COLUMNS
        );

        sqlx::query_as::<_, Identity>(&query)
            .bind(phone_number)
            .bind(registered_at)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_unique_violation(e, phone_number))
    }

    async fn get_by_phone(&self, phone_number: &str) -> StoreResult<Option<Identity>> {
        let query = format!("SELECT {} FROM users WHERE phone_number = $1", IDENTITY_COLUMNS);

        let identity = sqlx::query_as::<_, Identity>(&query)
            .bind(phone_number)
            .fetch_optional(&self.pool)
            .await?;

        Ok(identity)
    }

    async fn get_by_key(&self, id: i64) -> StoreResult<Option<Identity>> {
        let query = format!("SELECT {} FROM users WHERE id = $1", IDENTITY_COLUMNS);

        let identity = sqlx::query_as::<_, Identity>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(identity)
    }

    async fn list(&self, page: u32, limit: u32, search: &str) -> StoreResult<(Vec<Identity>, u64)> {
        let pattern = escape_like(search);

        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM users WHERE phone_number ILIKE '%' || $1 || '%'",
        )
        .bind(&pattern)
        .fetch_one(&self.pool)
        .await?;

        let offset = i64::from(page.max(1) - 1) * i64::from(limit);
        let query = format!(
            r#"
            SELECT {}
            FROM users
            WHERE phone_number ILIKE '%' || $1 || '%'
            ORDER BY id
            LIMIT $2 OFFSET $3
            "#,
            IDENTITY_COLUMNS
        );

        let identities = sqlx::query_as::<_, Identity>(&query)
            .bind(&pattern)
            .bind(i64::from(limit))
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;

        Ok((identities, total.max(0) as u64))
    }

    async fn count(&self) -> StoreResult<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as u64)
    }
}
