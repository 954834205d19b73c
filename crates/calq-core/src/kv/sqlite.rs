//! SQLite-backed key-value implementation.

use async_trait::async_trait;
use sqlx::SqlitePool;
use sqlx::sqlite::SqlitePoolOptions;

use super::{Kv, KvEntry, KvError, PutCondition};

/// SQLite-backed [`Kv`] provider.
#[derive(Clone)]
pub struct SqliteKv {
    pool: SqlitePool,
}

impl SqliteKv {
    /// Create a new provider from an existing pool. The schema must already
    /// be initialized.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to a SQLite database URL (e.g. `sqlite:calq.db?mode=rwc` or
    /// `sqlite::memory:`) and initialize the schema.
    pub async fn connect(url: &str) -> Result<Self, KvError> {
        // An in-memory SQLite database exists per connection, so the pool is
        // capped at a single connection. SQLite serializes writers anyway.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
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
                value BLOB NOT NULL,
                create_revision INTEGER NOT NULL,
                version INTEGER NOT NULL
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
                revision INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| KvError::backend("init_schema", e))?;

        sqlx::query("INSERT OR IGNORE INTO kv_revision (id, revision) VALUES (1, 0)")
            .execute(&self.pool)
            .await
            .map_err(|e| KvError::backend("init_schema", e))?;

        Ok(())
    }
}

#[async_trait]
impl Kv for SqliteKv {
    async fn get(&self, key: &str) -> Result<Vec<KvEntry>, KvError> {
        let rows: Vec<(String, Vec<u8>, i64, i64)> = sqlx::query_as(
            r#"
            SELECT key, value, create_revision, version
            FROM kv_entries
            WHERE key = ?
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
            VALUES (?, ?, ?, 1)
            ON CONFLICT(key) DO UPDATE
                SET value = excluded.value, version = kv_entries.version + 1
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
        // A zero guard means "the key must not exist": create it under a
        // fresh create_revision, refusing if some other writer got there
        // first. Non-zero guards can only match an existing row, so a single
        // conditional update suffices.
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
                    VALUES (?, ?, ?, 1)
                    ON CONFLICT(key) DO NOTHING
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
                    SET value = ?, version = version + 1
                    WHERE key = ? AND create_revision = ?
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
                    SET value = ?, version = version + 1
                    WHERE key = ? AND version = ?
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
