//! Durable mirror of active job handles.
//!
//! Layout in the [`KvStore`]:
//!
//! | Key | Value |
//! |-----|-------|
//! | `jobs:index` | JSON array of active progress ids |
//! | `jobs:handle:{progress_id}` | JSON-serialized [`JobHandle`] |
//!
//! A handle is written before its id enters the index and leaves the index
//! before it is deleted, so the index never names a handle that was never
//! written. Handles not named by the index are orphans and are swept during
//! recovery.
//!
//! Index updates are read-modify-write sequences spanning several awaits;
//! they run under one async lock shared by every clone of the store.

use std::sync::Arc;

use anyhow::{Context, Result};
use context_sync_core::models::JobHandle;
use context_sync_core::store::KvStore;
use tokio::sync::Mutex;
use tracing::warn;

pub const INDEX_KEY: &str = "jobs:index";
pub const HANDLE_PREFIX: &str = "jobs:handle:";

pub fn handle_key(progress_id: &str) -> String {
    format!("{}{}", HANDLE_PREFIX, progress_id)
}

#[derive(Clone)]
pub struct HandleStore {
    kv: Arc<dyn KvStore>,
    index_lock: Arc<Mutex<()>>,
}

impl HandleStore {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self {
            kv,
            index_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Write (or overwrite) a handle and make sure the index names it.
    pub async fn save(&self, handle: &JobHandle) -> Result<()> {
        let json = serde_json::to_string(handle).context("Failed to serialize job handle")?;
        let _guard = self.index_lock.lock().await;
        self.kv
            .set(&handle_key(&handle.progress_id), &json)
            .await
            .with_context(|| format!("Failed to persist job {}", handle.progress_id))?;

        let mut ids = self.index().await?;
        if !ids.iter().any(|id| id == &handle.progress_id) {
            ids.push(handle.progress_id.clone());
            self.write_index(&ids).await?;
        }
        Ok(())
    }

    /// Load one handle. An unreadable record is treated as absent.
    pub async fn load(&self, progress_id: &str) -> Result<Option<JobHandle>> {
        let raw = match self.kv.get(&handle_key(progress_id)).await? {
            Some(raw) => raw,
            None => return Ok(None),
        };
        match serde_json::from_str(&raw) {
            Ok(handle) => Ok(Some(handle)),
            Err(e) => {
                warn!(progress_id, error = %e, "discarding unreadable job handle");
                Ok(None)
            }
        }
    }

    /// Forget a handle: drop it from the index, then delete the record.
    pub async fn remove(&self, progress_id: &str) -> Result<()> {
        let _guard = self.index_lock.lock().await;
        let mut ids = self.index().await?;
        let before = ids.len();
        ids.retain(|id| id != progress_id);
        if ids.len() != before {
            self.write_index(&ids).await?;
        }
        self.kv
            .delete(&handle_key(progress_id))
            .await
            .with_context(|| format!("Failed to delete job {}", progress_id))
    }

    /// Active ids in start order. A corrupt index reads as empty.
    pub async fn index(&self) -> Result<Vec<String>> {
        let raw = match self.kv.get(INDEX_KEY).await? {
            Some(raw) => raw,
            None => return Ok(Vec::new()),
        };
        match serde_json::from_str(&raw) {
            Ok(ids) => Ok(ids),
            Err(e) => {
                warn!(error = %e, "job index is unreadable; starting empty");
                Ok(Vec::new())
            }
        }
    }

    /// Delete handle records the index does not name. Returns their ids.
    pub async fn sweep_orphans(&self) -> Result<Vec<String>> {
        let _guard = self.index_lock.lock().await;
        let ids = self.index().await?;
        let mut swept = Vec::new();
        for key in self.kv.list_keys(HANDLE_PREFIX).await? {
            let id = &key[HANDLE_PREFIX.len()..];
            if !ids.iter().any(|known| known == id) {
                self.kv.delete(&key).await?;
                swept.push(id.to_string());
            }
        }
        Ok(swept)
    }

    async fn write_index(&self, ids: &[String]) -> Result<()> {
        let json = serde_json::to_string(ids)?;
        self.kv
            .set(INDEX_KEY, &json)
            .await
            .context("Failed to write job index")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use context_sync_core::models::StartParams;
    use context_sync_core::store::memory::InMemoryKvStore;

    fn handle(id: &str) -> JobHandle {
        JobHandle::new(
            id.to_string(),
            StartParams::Refresh {
                source_id: "src-1".to_string(),
            },
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn test_save_load_remove() {
        let kv = Arc::new(InMemoryKvStore::new());
        let store = HandleStore::new(kv.clone());

        store.save(&handle("a")).await.unwrap();
        store.save(&handle("b")).await.unwrap();
        store.save(&handle("a")).await.unwrap();
        assert_eq!(store.index().await.unwrap(), vec!["a", "b"]);
        assert_eq!(store.load("a").await.unwrap().unwrap().progress_id, "a");

        store.remove("a").await.unwrap();
        assert_eq!(store.index().await.unwrap(), vec!["b"]);
        assert!(store.load("a").await.unwrap().is_none());
        assert!(kv.get("jobs:handle:a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_corrupt_records_read_as_absent() {
        let kv = Arc::new(InMemoryKvStore::new());
        kv.set(INDEX_KEY, "not json").await.unwrap();
        kv.set("jobs:handle:x", "{broken").await.unwrap();
        let store = HandleStore::new(kv);

        assert!(store.index().await.unwrap().is_empty());
        assert!(store.load("x").await.unwrap().is_none());
    }

    /// Yields before every operation so concurrent callers interleave.
    struct YieldingKv(InMemoryKvStore);

    #[async_trait::async_trait]
    impl KvStore for YieldingKv {
        async fn get(&self, key: &str) -> Result<Option<String>> {
            tokio::task::yield_now().await;
            self.0.get(key).await
        }

        async fn set(&self, key: &str, value: &str) -> Result<()> {
            tokio::task::yield_now().await;
            self.0.set(key, value).await
        }

        async fn delete(&self, key: &str) -> Result<()> {
            tokio::task::yield_now().await;
            self.0.delete(key).await
        }

        async fn list_keys(&self, prefix: &str) -> Result<Vec<String>> {
            tokio::task::yield_now().await;
            self.0.list_keys(prefix).await
        }
    }

    #[tokio::test]
    async fn test_interleaved_save_and_remove_keep_index_whole() {
        let store = HandleStore::new(Arc::new(YieldingKv(InMemoryKvStore::new())));
        store.save(&handle("a")).await.unwrap();
        store.save(&handle("b")).await.unwrap();

        let other = store.clone();
        let c = handle("c");
        let d = handle("d");
        let (removed, saved_c, saved_d) =
            tokio::join!(store.remove("a"), other.save(&c), store.save(&d));
        removed.unwrap();
        saved_c.unwrap();
        saved_d.unwrap();

        let mut ids = store.index().await.unwrap();
        ids.sort();
        assert_eq!(ids, vec!["b", "c", "d"]);
        assert!(store.sweep_orphans().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sweep_orphans() {
        let kv = Arc::new(InMemoryKvStore::new());
        let store = HandleStore::new(kv.clone());
        store.save(&handle("kept")).await.unwrap();
        kv.set("jobs:handle:orphan", "{}").await.unwrap();

        assert_eq!(store.sweep_orphans().await.unwrap(), vec!["orphan"]);
        assert!(kv.get("jobs:handle:kept").await.unwrap().is_some());
        assert!(kv.get("jobs:handle:orphan").await.unwrap().is_none());
    }
}
