//! PostgreSQL-backed key-value implementation.

use async_trait::async_trait;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

use super::{Kv, KvEntry, KvError, PutCondition};

/// PostgreSQL-backed [`Kv`] provider.
#[derive(Clone)]
pub struct PostgresKv {
    pool: PgPool,
}

impl PostgresKv {
    /// Create a new provider from an existing pool. The schema must already
    /// be initialized.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect to a PostgreSQL URL and initialize the schema.
    pub async fn connect(url: &str) -> Result<Self, KvError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(url)
            .await
            .map_err(|e| KvError::backend("connect", e))?;

        let kv = Self::new(pool);
        kv.init_schema().await?;
        Ok(kv)
    }

    async fn init_schema(&self) -> Result<(), KvError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS kv_entries (
                key TEXT PRIMARY KEY,
                value BYTEA NOT NULL,
                create_revision BIGINT NOT NULL,
                version BIGINT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| KvError::backend("init_schema", e))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS kv_revision (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                revision BIGINT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| KvError::backend("init_schema", e))?;

        sqlx::query("INSERT INTO kv_revision (id, revision) VALUES (1, 0) ON CONFLICT (id) DO NOTHING")
            .execute(&self.pool)
            .await
            .map_err(|e| KvError::backend("init_schema", e))?;

        Ok(())
    }
}

#[async_trait]
impl Kv for PostgresKv {
    async fn get(&self, key: &str) -> Result<Vec<KvEntry>, KvError> {
        let rows: Vec<(String, Vec<u8>, i64, i64)> = sqlx::query_as(
            r#"
            SELECT key, value, create_revision, version
            FROM kv_entries
            WHERE key = $1
            "#,
        )
        .bind(key)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| KvError::backend("get", e))?;

        Ok(rows
            .into_iter()
            .map(|(key, value, create_revision, version)| KvEntry {
                key,
                value,
                create_revision,
                version,
            })
            .collect())
    }

    async fn put(&self, key: &str, value: &[u8]) -> Result<(), KvError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| KvError::backend("put", e))?;

        let (revision,): (i64,) = sqlx::query_as(
            "UPDATE kv_revision SET revision = revision + 1 WHERE id = 1 RETURNING revision",
        )
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| KvError::backend("put", e))?;

        sqlx::query(
            r#"
            INSERT INTO kv_entries (key, value, create_revision, version)
            VALUES ($1, $2, $3, 1)
            ON CONFLICT (key) DO UPDATE
                SET value = EXCLUDED.value, version = kv_entries.version + 1
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(revision)
        .execute(&mut *tx)
        .await
        .map_err(|e| KvError::backend("put", e))?;

        tx.commit().await.map_err(|e| KvError::backend("put", e))?;
        Ok(())
    }

    async fn put_if(
        &self,
        key: &str,
        value: &[u8],
        condition: PutCondition,
    ) -> Result<bool, KvError> {
        match condition {
            PutCondition::CreateRevision(0) | PutCondition::Version(0) => {
                let mut tx = self
                    .pool
                    .begin()
                    .await
                    .map_err(|e| KvError::backend("put_if", e))?;

                let (revision,): (i64,) = sqlx::query_as(
                    "UPDATE kv_revision SET revision = revision + 1 WHERE id = 1 RETURNING revision",
                )
                .fetch_one(&mut *tx)
                .await
                .map_err(|e| KvError::backend("put_if", e))?;

                let result = sqlx::query(
                    r#"
                    INSERT INTO kv_entries (key, value, create_revision, version)
                    VALUES ($1, $2, $3, 1)
                    ON CONFLICT (key) DO NOTHING
                    "#,
                )
                .bind(key)
                .bind(value)
                .bind(revision)
                .execute(&mut *tx)
                .await
                .map_err(|e| KvError::backend("put_if", e))?;

                if result.rows_affected() == 1 {
                    tx.commit().await.map_err(|e| KvError::backend("put_if", e))?;
                    Ok(true)
                } else {
                    tx.rollback()
                        .await
                        .map_err(|e| KvError::backend("put_if", e))?;
                    Ok(false)
                }
            }
            PutCondition::CreateRevision(expected) => {
                let result = sqlx::query(
                    r#"
                    UPDATE kv_entries
                    SET value = $1, version = version + 1
                    WHERE key = $2 AND create_revision = $3
                    "#,
                )
                .bind(value)
                .bind(key)
                .bind(expected)
                .execute(&self.pool)
                .await
                .map_err(|e| KvError::backend("put_if", e))?;

                Ok(result.rows_affected() == 1)
            }
            PutCondition::Version(expected) => {
                let result = sqlx::query(
                    r#"
                    UPDATE kv_entries
                    SET value = $1, version = version + 1
                    WHERE key = $2 AND version = $3
                    "#,
                )
                .bind(value)
                .bind(key)
                .bind(expected)
                .execute(&self.pool)
                .await
                .map_err(|e| KvError::backend("put_if", e))?;

                Ok(result.rows_affected() == 1)
            }
        }
    }
}
