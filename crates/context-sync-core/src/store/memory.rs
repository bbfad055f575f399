//! In-memory [`KvStore`] implementation for testing and WASM targets.
//!
//! Uses a `BTreeMap` behind `std::sync::RwLock`, so `list_keys` comes back
//! sorted without extra work.

use std::collections::BTreeMap;
use std::sync::RwLock;

use anyhow::Result;
use async_trait::async_trait;

use super::KvStore;

/// In-memory key-value store.
pub struct InMemoryKvStore {
    entries: RwLock<BTreeMap<String, String>>,
}

impl InMemoryKvStore {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
        }
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.entries.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryKvStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KvStore for InMemoryKvStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.read().unwrap().get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries
            .write()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries.write().unwrap().remove(key);
        Ok(())
    }

    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>> {
        let entries = self.entries.read().unwrap();
        Ok(entries
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_get_delete() {
        let store = InMemoryKvStore::new();
        assert_eq!(store.get("a").await.unwrap(), None);

        store.set("a", "1").await.unwrap();
        store.set("a", "2").await.unwrap();
        assert_eq!(store.get("a").await.unwrap().as_deref(), Some("2"));

        store.delete("a").await.unwrap();
        store.delete("a").await.unwrap();
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_list_keys_by_prefix() {
        let store = InMemoryKvStore::new();
        store.set("jobs:handle:b", "{}").await.unwrap();
        store.set("jobs:handle:a", "{}").await.unwrap();
        store.set("jobs:index", "[]").await.unwrap();
        store.set("other", "x").await.unwrap();

        let keys = store.list_keys("jobs:handle:").await.unwrap();
        assert_eq!(keys, vec!["jobs:handle:a", "jobs:handle:b"]);
        assert_eq!(store.list_keys("").await.unwrap().len(), 4);
    }
}
