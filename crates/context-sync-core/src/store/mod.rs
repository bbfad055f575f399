//! Durable key-value storage abstraction.
//!
//! The [`KvStore`] trait is the small `get/set/delete/list_keys` surface the
//! job tracker persists its handles through. It mirrors what a browser's
//! `localStorage` offers, so the tracker is portable to any persistent
//! key-value backend (a directory of files, an embedded database, or the
//! in-memory store used in tests).
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

/// Abstract persistent key-value backend.
///
/// All operations are async (via `async-trait`) so file- or network-backed
/// stores can suspend. In-memory implementations return immediately-ready
/// futures.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`get`](KvStore::get) | Read the value stored under a key |
/// | [`set`](KvStore::set) | Insert or overwrite a value |
/// | [`delete`](KvStore::delete) | Remove a key (no-op when absent) |
/// | [`list_keys`](KvStore::list_keys) | List keys starting with a prefix |
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Read the value stored under `key`, if any.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Store `value` under `key`, replacing any previous value.
    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Remove `key`. Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<()>;

    /// List every key that starts with `prefix`, sorted.
    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>>;
}
