// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Revision-guarded key-value abstraction.
//!
//! The operation store does not talk to a concrete database; it depends on
//! this narrow capability trait. Every key carries two monotone counters:
//! `create_revision` is frozen when the key is first written, and `version`
//! increments on each mutation of the key. Conditional writes are expressed
//! as a [`PutCondition`] over those counters, which is enough to build
//! create-if-absent and compare-and-swap on top.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

pub mod memory;
pub mod postgres;
pub mod sqlite;

pub use memory::MemoryKv;
pub use postgres::PostgresKv;
pub use sqlite::SqliteKv;

/// A stored entry together with its revision metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KvEntry {
    pub key: String,
    pub value: Vec<u8>,
    /// Global revision at which the key was created.
    pub create_revision: i64,
    /// Number of mutations of this key; 1 for a freshly created key.
    pub version: i64,
}

/// Guard predicate for a conditional put.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutCondition {
    /// The key's `create_revision` must equal the given value. Zero means
    /// "the key must not exist".
    CreateRevision(i64),
    /// The key's `version` must equal the given value. Zero means "the key
    /// must not exist".
    Version(i64),
}

/// Errors from a key-value backend.
#[derive(Debug, Error)]
pub enum KvError {
    #[error("key-value backend error during {operation}: {details}")]
    Backend {
        operation: &'static str,
        details: String,
    },
}

impl KvError {
    pub(crate) fn backend(operation: &'static str, err: impl std::fmt::Display) -> Self {
        Self::Backend {
            operation,
            details: err.to_string(),
        }
    }
}

/// Ordered key-value storage with revision-guarded transactional writes.
#[async_trait]
pub trait Kv: Send + Sync {
    /// Entries stored under the exact key, with revision metadata. Returns an
    /// empty vector when the key is absent.
    async fn get(&self, key: &str) -> Result<Vec<KvEntry>, KvError>;

    /// Unconditional write: creates the key or replaces its value, bumping
    /// the version.
    async fn put(&self, key: &str, value: &[u8]) -> Result<(), KvError>;

    /// Conditional write applied only when the condition holds against the
    /// current state of the key. Returns whether the write was applied. The
    /// caller decides what a refused write means (already-exists, lost race).
    async fn put_if(
        &self,
        key: &str,
        value: &[u8],
        condition: PutCondition,
    ) -> Result<bool, KvError>;
}

/// Connect to a backend chosen from the URL scheme: `postgres://` (or
/// `postgresql://`) selects PostgreSQL, everything else is treated as a
/// SQLite URL.
pub async fn connect(database_url: &str) -> Result<Arc<dyn Kv>, KvError> {
    if database_url.starts_with("postgres://") || database_url.starts_with("postgresql://") {
        Ok(Arc::new(PostgresKv::connect(database_url).await?))
    } else {
        Ok(Arc::new(SqliteKv::connect(database_url).await?))
    }
}
