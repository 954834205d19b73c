// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Calculation records and the operation store.
//!
//! Records live under `calculations/<operation-id>` and are serialized as
//! JSON. The store layers three ordered primitives over the revision-guarded
//! [`Kv`] trait: create-if-absent, plain reads, and compare-and-swap updates.
//! It never blocks waiting for concurrent writers; it races them and lets the
//! version guard arbitrate, with the loser retrying from a fresh read.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use thiserror::Error;

use calq_protocol::messages::RpcStatus;

use crate::kv::{Kv, KvError, PutCondition};

/// Store key for the calculation with the given operation name.
pub fn calculation_key(name: &str) -> String {
    format!("calculations/{name}")
}

/// Timestamps describing the life of a calculation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalculationMetadata {
    pub created: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started: Option<DateTime<Utc>>,
}

/// A stored calculation record.
///
/// While `done` is false, both `error` and `result` are absent. Once `done`
/// is true, exactly one of them is present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Calculation {
    pub name: String,
    pub metadata: CalculationMetadata,
    #[serde(default)]
    pub done: bool,

    /// Mutually exclusive with `result`; only set when `done` is true.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcStatus>,
    /// Mutually exclusive with `error`; only set when `done` is true. Kept
    /// as opaque JSON so new result types need no schema migration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Box<RawValue>>,
}

impl Calculation {
    /// A fresh, not-yet-started record.
    pub fn new(name: impl Into<String>, created: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            metadata: CalculationMetadata {
                created,
                started: None,
            },
            done: false,
            error: None,
            result: None,
        }
    }
}

/// The typed payload stored under a finished Fibonacci calculation's
/// `result` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FibonacciOfResult {
    pub position: i64,
    pub first: i64,
    pub second: i64,
    pub result: i64,
}

/// Errors from the operation store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("calculation {name:?} already exists")]
    AlreadyExists { name: String },

    #[error("calculation {name:?} not found")]
    NotFound { name: String },

    /// More than one entry matched an exact key. Well-formed keys cannot
    /// collide; this is detected defensively.
    #[error("ambiguous results for key {key:?}: {count} entries")]
    Ambiguous { key: String, count: usize },

    /// A compare-and-swap lost to a concurrent writer; retry from a fresh
    /// read.
    #[error("update of calculation {name:?} was not successful")]
    UpdateUnsuccessful { name: String },

    #[error("error marshaling calculation: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Kv(#[from] KvError),
}

/// Storage interface used by the API server and the worker.
#[async_trait]
pub trait Datastore: Send + Sync {
    /// Write the record iff its key does not exist yet.
    async fn create(&self, calculation: &Calculation) -> Result<(), StoreError>;

    /// Read the record for the given operation name.
    async fn get(&self, name: &str) -> Result<Calculation, StoreError>;

    /// Replace the record, guarded by the version observed in a fresh read.
    async fn save(&self, calculation: &Calculation) -> Result<(), StoreError>;

    /// Record the moment a worker began computing the operation.
    async fn set_started(&self, name: &str, started: DateTime<Utc>) -> Result<(), StoreError>;
}

/// Operation store over a revision-guarded [`Kv`].
pub struct CalculationStore {
    kv: Arc<dyn Kv>,
}

impl CalculationStore {
    pub fn new(kv: Arc<dyn Kv>) -> Self {
        Self { kv }
    }

    /// Read the single entry for the name, returning the parsed record and
    /// the version to guard the next write with.
    async fn read_current(&self, name: &str) -> Result<(Calculation, i64), StoreError> {
        let key = calculation_key(name);
        let entries = self.kv.get(&key).await?;

        let entry = match entries.len() {
            0 => {
                return Err(StoreError::NotFound {
                    name: name.to_string(),
                })
            }
            1 => &entries[0],
            count => return Err(StoreError::Ambiguous { key, count }),
        };

        let calculation = serde_json::from_slice(&entry.value)?;
        Ok((calculation, entry.version))
    }
}

#[async_trait]
impl Datastore for CalculationStore {
    async fn create(&self, calculation: &Calculation) -> Result<(), StoreError> {
        let key = calculation_key(&calculation.name);
        let value = serde_json::to_vec(calculation)?;

        let applied = self
            .kv
            .put_if(&key, &value, PutCondition::CreateRevision(0))
            .await?;
        if !applied {
            return Err(StoreError::AlreadyExists {
                name: calculation.name.clone(),
            });
        }

        Ok(())
    }

    async fn get(&self, name: &str) -> Result<Calculation, StoreError> {
        let (calculation, _) = self.read_current(name).await?;
        Ok(calculation)
    }

    async fn save(&self, calculation: &Calculation) -> Result<(), StoreError> {
        let (_, version) = self.read_current(&calculation.name).await?;

        let key = calculation_key(&calculation.name);
        let value = serde_json::to_vec(calculation)?;

        let applied = self
            .kv
            .put_if(&key, &value, PutCondition::Version(version))
            .await?;
        if !applied {
            return Err(StoreError::UpdateUnsuccessful {
                name: calculation.name.clone(),
            });
        }

        Ok(())
    }

    async fn set_started(&self, name: &str, started: DateTime<Utc>) -> Result<(), StoreError> {
        let (mut calculation, version) = self.read_current(name).await?;
        calculation.metadata.started = Some(started);

        let key = calculation_key(name);
        let value = serde_json::to_vec(&calculation)?;

        let applied = self
            .kv
            .put_if(&key, &value, PutCondition::Version(version))
            .await?;
        if !applied {
            return Err(StoreError::UpdateUnsuccessful {
                name: name.to_string(),
            });
        }

        Ok(())
    }
}
