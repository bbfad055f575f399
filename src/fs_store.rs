//! Directory-backed [`KvStore`].
//!
//! Each key is one JSON file named by the SHA-256 of the key, so arbitrary
//! keys (`jobs:handle:...`) map to safe file names. The original key is kept
//! inside the file for `list_keys`. Writes go to a temporary file first and
//! are renamed into place.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use context_sync_core::store::KvStore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

#[derive(Serialize, Deserialize)]
struct Record {
    key: String,
    value: String,
}

pub struct FileKvStore {
    dir: PathBuf,
}

impl FileKvStore {
    /// Open (and create if needed) a store rooted at `dir`.
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("Failed to create storage directory: {}", dir.display()))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let digest = hex::encode(Sha256::digest(key.as_bytes()));
        self.dir.join(format!("{}.json", digest))
    }

    async fn read_record(path: &Path) -> Result<Option<Record>> {
        match tokio::fs::read_to_string(path).await {
            Ok(raw) => {
                let record = serde_json::from_str(&raw)
                    .with_context(|| format!("Corrupt storage record: {}", path.display()))?;
                Ok(Some(record))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("Failed to read {}", path.display())),
        }
    }
}

#[async_trait]
impl KvStore for FileKvStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(Self::read_record(&self.path_for(key))
            .await?
            .map(|record| record.value))
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        let record = Record {
            key: key.to_string(),
            value: value.to_string(),
        };
        tokio::fs::write(&tmp, serde_json::to_vec(&record)?)
            .await
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .with_context(|| format!("Failed to move {} into place", path.display()))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let path = self.path_for(key);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("Failed to delete {}", path.display())),
        }
    }

    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>> {
        let mut entries = tokio::fs::read_dir(&self.dir)
            .await
            .with_context(|| format!("Failed to list {}", self.dir.display()))?;
        let mut keys = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            // Skip files that vanish or fail to parse mid-listing.
            if let Ok(Some(record)) = Self::read_record(&path).await {
                if record.key.starts_with(prefix) {
                    keys.push(record.key);
                }
            }
        }
        keys.sort();
        Ok(keys)
    }
}
