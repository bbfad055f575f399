//! Keyed in-memory store of query results.
//!
//! The [`EntityCache`] is what views read from. Values are kept as JSON so
//! one cache can hold every collection type; typed access goes through
//! [`EntityCache::get_as`] / [`EntityCache::set_as`]. Invalidation marks an
//! entry stale (the data stays readable) and notifies subscribers so the
//! owner of the query can re-fetch.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use anyhow::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Hierarchical cache key, e.g. `["projects", "p1", "tasks"]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueryKey(Vec<String>);

impl QueryKey {
    pub fn new<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(parts.into_iter().map(Into::into).collect())
    }

    pub fn parts(&self) -> &[String] {
        &self.0
    }

    /// Whether `prefix` is a leading segment run of this key.
    pub fn starts_with(&self, prefix: &QueryKey) -> bool {
        self.0.len() >= prefix.0.len() && self.0[..prefix.0.len()] == prefix.0[..]
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.0.join(", "))
    }
}

/// Well-known keys.
pub mod keys {
    use super::QueryKey;

    pub fn projects() -> QueryKey {
        QueryKey::new(["projects"])
    }

    pub fn project_tasks(project_id: &str) -> QueryKey {
        QueryKey::new(["projects", project_id, "tasks"])
    }

    /// Root of everything derived from the knowledge base (listing,
    /// summaries, per-source documents).
    pub fn knowledge_items() -> QueryKey {
        QueryKey::new(["knowledge-items"])
    }
}

/// Change notification delivered to subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheEvent {
    Updated(QueryKey),
    Invalidated(QueryKey),
    Removed(QueryKey),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CachedQuery {
    pub value: serde_json::Value,
    pub stale: bool,
}

pub type Listener = Arc<dyn Fn(&CacheEvent) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

pub struct EntityCache {
    slots: RwLock<HashMap<QueryKey, CachedQuery>>,
    listeners: RwLock<Vec<(SubscriptionId, Listener)>>,
    next_id: AtomicU64,
}

impl EntityCache {
    pub fn new() -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
            listeners: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn get(&self, key: &QueryKey) -> Option<CachedQuery> {
        self.slots.read().unwrap().get(key).cloned()
    }

    pub fn get_as<T: DeserializeOwned>(&self, key: &QueryKey) -> Result<Option<T>> {
        match self.get(key) {
            Some(q) => Ok(Some(serde_json::from_value(q.value)?)),
            None => Ok(None),
        }
    }

    /// Store a fresh value. Clears the stale flag.
    pub fn set(&self, key: QueryKey, value: serde_json::Value) {
        self.slots.write().unwrap().insert(
            key.clone(),
            CachedQuery {
                value,
                stale: false,
            },
        );
        self.emit(CacheEvent::Updated(key));
    }

    pub fn set_as<T: Serialize>(&self, key: QueryKey, value: &T) -> Result<()> {
        self.set(key, serde_json::to_value(value)?);
        Ok(())
    }

    pub fn is_stale(&self, key: &QueryKey) -> bool {
        self.slots
            .read()
            .unwrap()
            .get(key)
            .map(|q| q.stale)
            .unwrap_or(true)
    }

    /// Mark one key stale. Returns `false` if nothing was cached under it.
    pub fn invalidate(&self, key: &QueryKey) -> bool {
        let hit = match self.slots.write().unwrap().get_mut(key) {
            Some(q) => {
                q.stale = true;
                true
            }
            None => false,
        };
        // Subscribers hear about it either way: a view may be waiting for
        // its first load under this key.
        self.emit(CacheEvent::Invalidated(key.clone()));
        hit
    }

    /// Mark every key under `prefix` stale, including `prefix` itself.
    pub fn invalidate_prefix(&self, prefix: &QueryKey) -> usize {
        let touched: Vec<QueryKey> = {
            let mut slots = self.slots.write().unwrap();
            slots
                .iter_mut()
                .filter(|(k, _)| k.starts_with(prefix))
                .map(|(k, q)| {
                    q.stale = true;
                    k.clone()
                })
                .collect()
        };
        if touched.is_empty() {
            self.emit(CacheEvent::Invalidated(prefix.clone()));
        }
        for key in &touched {
            self.emit(CacheEvent::Invalidated(key.clone()));
        }
        touched.len()
    }

    pub fn remove(&self, key: &QueryKey) -> bool {
        let removed = self.slots.write().unwrap().remove(key).is_some();
        if removed {
            self.emit(CacheEvent::Removed(key.clone()));
        }
        removed
    }

    pub fn subscribe(&self, listener: Listener) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.write().unwrap().push((id, listener));
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.listeners.write().unwrap().retain(|(sid, _)| *sid != id);
    }

    fn emit(&self, event: CacheEvent) {
        // Call outside the lock so listeners may read the cache.
        let listeners: Vec<Listener> = self
            .listeners
            .read()
            .unwrap()
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();
        for listener in listeners {
            listener(&event);
        }
    }
}

impl Default for EntityCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    #[test]
    fn test_set_and_typed_get() {
        let cache = EntityCache::new();
        cache.set_as(keys::projects(), &vec!["a", "b"]).unwrap();
        let got: Vec<String> = cache.get_as(&keys::projects()).unwrap().unwrap();
        assert_eq!(got, vec!["a", "b"]);
        assert!(!cache.is_stale(&keys::projects()));
        assert!(cache.is_stale(&keys::knowledge_items()));
    }

    #[test]
    fn test_prefix_invalidation_marks_children_stale() {
        let cache = EntityCache::new();
        cache.set(keys::knowledge_items(), json!([]));
        cache.set(QueryKey::new(["knowledge-items", "summary"]), json!({}));
        cache.set(keys::projects(), json!([]));

        assert_eq!(cache.invalidate_prefix(&keys::knowledge_items()), 2);
        assert!(cache.is_stale(&keys::knowledge_items()));
        assert!(!cache.is_stale(&keys::projects()));
        // Stale data stays readable until re-fetched.
        assert_eq!(cache.get(&keys::knowledge_items()).unwrap().value, json!([]));
    }

    #[test]
    fn test_subscribers_see_events() {
        let cache = EntityCache::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let id = cache.subscribe(Arc::new(move |e: &CacheEvent| {
            sink.lock().unwrap().push(e.clone());
        }));

        cache.set(keys::projects(), json!([]));
        cache.invalidate(&keys::projects());
        cache.unsubscribe(id);
        cache.remove(&keys::projects());

        let seen = seen.lock().unwrap();
        assert_eq!(
            *seen,
            vec![
                CacheEvent::Updated(keys::projects()),
                CacheEvent::Invalidated(keys::projects()),
            ]
        );
    }

    #[test]
    fn test_key_prefix() {
        let tasks = keys::project_tasks("p1");
        assert!(tasks.starts_with(&keys::projects()));
        assert!(!keys::projects().starts_with(&tasks));
        assert_eq!(tasks.to_string(), "[projects, p1, tasks]");
    }
}
