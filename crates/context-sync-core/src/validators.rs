//! Validator cache backing conditional requests.
//!
//! Each slot is keyed by `(method, url)` and remembers the last validator
//! (`ETag`) together with the body it validated. Only idempotent reads ever
//! get a slot; [`ValidatorCache::store`] refuses everything else.
//!
//! URLs are canonicalized with [`url::Url`] before they key a slot, so
//! `http://h:80/a` and `http://h/a` share one.
//!
//! When a resource changes or disappears, [`ValidatorCache::invalidate_resource`]
//! clears the slot for the resource itself, every listing above it
//! (`/api/projects` for `/api/projects/42`) and every sub-resource below it.

use std::collections::HashMap;

use url::Url;

use crate::models::Method;

/// One remembered response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub validator: String,
    pub body: Vec<u8>,
}

#[derive(Debug, Default)]
pub struct ValidatorCache {
    entries: HashMap<(Method, String), CacheEntry>,
}

impl ValidatorCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, method: Method, url: &str) -> Option<&CacheEntry> {
        if !method.is_read() {
            return None;
        }
        self.entries.get(&(method, slot_key(url)))
    }

    /// Remember `body` under `validator`. Returns `false` (and stores
    /// nothing) for non-idempotent methods.
    pub fn store(&mut self, method: Method, url: &str, validator: &str, body: Vec<u8>) -> bool {
        if !method.is_read() {
            return false;
        }
        self.entries.insert(
            (method, slot_key(url)),
            CacheEntry {
                validator: validator.to_string(),
                body,
            },
        );
        true
    }

    pub fn remove(&mut self, method: Method, url: &str) -> Option<CacheEntry> {
        self.entries.remove(&(method, slot_key(url)))
    }

    /// Drop every slot that could contain a stale copy of `url`: the
    /// resource, its ancestors (listings) and its descendants. Query strings
    /// are ignored for the comparison. Returns the number of slots removed.
    pub fn invalidate_resource(&mut self, url: &str) -> usize {
        let (origin, target) = locate(url);
        let ancestors = ancestors(&target);

        let before = self.entries.len();
        self.entries.retain(|(_, cached), _| {
            let (cached_origin, cached_path) = locate(cached);
            if cached_origin != origin {
                return true;
            }
            let related = cached_path == target
                || ancestors.iter().any(|a| *a == cached_path)
                || cached_path.starts_with(&format!("{}/", target));
            !related
        });
        before - self.entries.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

fn slot_key(url: &str) -> String {
    match Url::parse(url) {
        Ok(parsed) => parsed.to_string(),
        Err(_) => url.to_string(),
    }
}

/// Origin and normalized path of `url`. Relative URLs have an empty origin.
fn locate(url: &str) -> (String, String) {
    match Url::parse(url) {
        Ok(parsed) => (parsed.origin().ascii_serialization(), normalize(parsed.path())),
        Err(_) => (String::new(), normalize(url)),
    }
}

fn normalize(path: &str) -> String {
    let path = path.split(['?', '#']).next().unwrap_or("");
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        trimmed.to_string()
    }
}

/// `/api/projects/42` → `["/api/projects", "/api"]`. The root is excluded.
fn ancestors(path: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = path;
    while let Some(idx) = current.rfind('/') {
        if idx == 0 {
            break;
        }
        current = &current[..idx];
        out.push(current.to_string());
    }
    out
}
