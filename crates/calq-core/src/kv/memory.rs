//! In-memory key-value backend.
//!
//! A deterministic, fully functional implementation over an ordered map,
//! suitable for tests and embedded single-process runs. Revision semantics
//! match the durable backends exactly.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;

use super::{Kv, KvEntry, KvError, PutCondition};

#[derive(Debug, Default)]
struct StoredEntry {
    value: Vec<u8>,
    create_revision: i64,
    version: i64,
}

#[derive(Debug, Default)]
struct Inner {
    entries: BTreeMap<String, StoredEntry>,
    revision: i64,
}

impl Inner {
    fn write(&mut self, key: &str, value: &[u8]) {
        self.revision += 1;
        match self.entries.get_mut(key) {
            Some(entry) => {
                entry.value = value.to_vec();
                entry.version += 1;
            }
            None => {
                self.entries.insert(
                    key.to_string(),
                    StoredEntry {
                        value: value.to_vec(),
                        create_revision: self.revision,
                        version: 1,
                    },
                );
            }
        }
    }
}

/// In-memory [`Kv`] backend.
#[derive(Debug, Default)]
pub struct MemoryKv {
    inner: Mutex<Inner>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[async_trait]
impl Kv for MemoryKv {
    async fn get(&self, key: &str) -> Result<Vec<KvEntry>, KvError> {
        let inner = self.lock();
        Ok(inner
            .entries
            .get(key)
            .map(|entry| KvEntry {
                key: key.to_string(),
                value: entry.value.clone(),
                create_revision: entry.create_revision,
                version: entry.version,
            })
            .into_iter()
            .collect())
    }

    async fn put(&self, key: &str, value: &[u8]) -> Result<(), KvError> {
        self.lock().write(key, value);
        Ok(())
    }

    async fn put_if(
        &self,
        key: &str,
        value: &[u8],
        condition: PutCondition,
    ) -> Result<bool, KvError> {
        let mut inner = self.lock();
        let entry = inner.entries.get(key);
        let holds = match condition {
            PutCondition::CreateRevision(expected) => {
                entry.map(|e| e.create_revision).unwrap_or(0) == expected
            }
            PutCondition::Version(expected) => entry.map(|e| e.version).unwrap_or(0) == expected,
        };
        if !holds {
            return Ok(false);
        }
        inner.write(key, value);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_get_absent_key_is_empty() {
        let kv = MemoryKv::new();
        assert!(kv.get("missing").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_put_assigns_revisions() {
        let kv = MemoryKv::new();
        kv.put("a", b"one").await.unwrap();
        kv.put("b", b"two").await.unwrap();

        let a = &kv.get("a").await.unwrap()[0];
        let b = &kv.get("b").await.unwrap()[0];
        assert_eq!(a.version, 1);
        assert_eq!(b.version, 1);
        assert!(b.create_revision > a.create_revision);
    }

    #[tokio::test]
    async fn test_put_bumps_version_but_not_create_revision() {
        let kv = MemoryKv::new();
        kv.put("a", b"one").await.unwrap();
        let created = kv.get("a").await.unwrap()[0].create_revision;

        kv.put("a", b"two").await.unwrap();
        let entry = &kv.get("a").await.unwrap()[0];
        assert_eq!(entry.version, 2);
        assert_eq!(entry.create_revision, created);
        assert_eq!(entry.value, b"two");
    }

    #[tokio::test]
    async fn test_put_if_absent_guard() {
        let kv = MemoryKv::new();

        let applied = kv
            .put_if("a", b"one", PutCondition::CreateRevision(0))
            .await
            .unwrap();
        assert!(applied);

        let applied = kv
            .put_if("a", b"other", PutCondition::CreateRevision(0))
            .await
            .unwrap();
        assert!(!applied);
        assert_eq!(kv.get("a").await.unwrap()[0].value, b"one");
    }

    #[tokio::test]
    async fn test_put_if_version_guard() {
        let kv = MemoryKv::new();
        kv.put("a", b"one").await.unwrap();

        let applied = kv.put_if("a", b"two", PutCondition::Version(1)).await.unwrap();
        assert!(applied);

        // Stale guard loses.
        let applied = kv.put_if("a", b"three", PutCondition::Version(1)).await.unwrap();
        assert!(!applied);

        let entry = &kv.get("a").await.unwrap()[0];
        assert_eq!(entry.value, b"two");
        assert_eq!(entry.version, 2);
    }
}
