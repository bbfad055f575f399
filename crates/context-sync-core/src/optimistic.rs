//! Optimistic list engine.
//!
//! An [`OptimisticList`] holds the client's view of one collection (a
//! project list, a project's tasks, ...). Mutations are applied locally
//! before the network call is issued and later settled:
//!
//! ```text
//!   begin_create ──▶ provisional entry at head ──┬─▶ promote  (server copy, local id dropped)
//!   begin_update ──▶ provisional entry in place ─┤
//!   begin_delete ──▶ entry hidden                └─▶ discard  (rollback)
//! ```
//!
//! Every operation touches only the entry that belongs to its own
//! [`LocalId`], so mutations that settle out of order never disturb each
//! other or unrelated entries. Full re-fetches are merged through
//! [`OptimisticList::reconcile`], and [`dedupe`] guarantees that a logical
//! entity is visible at most once.

use std::collections::{HashMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::Entity;

/// Prefix of every client-generated identifier. Server identities are
/// UUIDs or numeric strings, so the namespaces never overlap.
pub const LOCAL_ID_PREFIX: &str = "local-";

/// Client-generated identifier of a provisional record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LocalId(String);

impl LocalId {
    pub fn generate() -> Self {
        Self(format!("{}{}", LOCAL_ID_PREFIX, Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether an identifier was drawn from the local namespace.
    pub fn is_local(id: &str) -> bool {
        id.starts_with(LOCAL_ID_PREFIX)
    }
}

impl fmt::Display for LocalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One entry of a collection as the UI sees it.
///
/// Serialized with the entity's own fields plus `_localId` and
/// `_optimistic`, so renderers can show a pending affordance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tracked<T> {
    #[serde(flatten)]
    pub entity: T,
    #[serde(rename = "_localId", default, skip_serializing_if = "Option::is_none")]
    pub local_id: Option<LocalId>,
    #[serde(rename = "_optimistic", default)]
    pub is_optimistic: bool,
    /// Server copy replaced by a pending update, restored on rollback.
    #[serde(skip)]
    previous: Option<T>,
}

impl<T> Tracked<T> {
    pub fn confirmed(entity: T) -> Self {
        Self {
            entity,
            local_id: None,
            is_optimistic: false,
            previous: None,
        }
    }

    fn provisional(entity: T, previous: Option<T>) -> Self {
        Self {
            entity,
            local_id: Some(LocalId::generate()),
            is_optimistic: true,
            previous,
        }
    }

    fn owned_by(&self, local_id: &LocalId) -> bool {
        self.local_id.as_ref() == Some(local_id)
    }
}

/// Where [`OptimisticList::begin`] places a provisional entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placement {
    /// New records are surfaced first.
    Head,
    /// Replace the entry with this server id in place. Falls back to the
    /// head when the entity is not part of the current view.
    Replace(String),
}

/// A confirmed entry hidden by a pending delete.
#[derive(Debug, Clone)]
struct PendingDelete<T> {
    local_id: LocalId,
    index: usize,
    /// Identity of the entry that preceded the hidden one.
    after: Option<String>,
    item: Tracked<T>,
}

/// Client-side view of a collection with optimistic mutations applied.
#[derive(Debug, Clone)]
pub struct OptimisticList<T> {
    items: Vec<Tracked<T>>,
    deletes: Vec<PendingDelete<T>>,
}

impl<T: Entity> Default for OptimisticList<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Entity> OptimisticList<T> {
    pub fn new() -> Self {
        Self {
            items: Vec::new(),
            deletes: Vec::new(),
        }
    }

    /// Start from a server listing.
    pub fn from_confirmed(entities: Vec<T>) -> Self {
        let mut list = Self::new();
        list.items = dedupe(entities.into_iter().map(Tracked::confirmed).collect());
        list
    }

    pub fn items(&self) -> &[Tracked<T>] {
        &self.items
    }

    pub fn entities(&self) -> Vec<T> {
        self.items.iter().map(|t| t.entity.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Number of mutations that have not settled yet.
    pub fn pending(&self) -> usize {
        self.items.iter().filter(|t| t.is_optimistic).count() + self.deletes.len()
    }

    /// Insert a provisional entity and return it.
    pub fn begin(&mut self, draft: T, placement: Placement) -> Tracked<T> {
        let position = match &placement {
            Placement::Head => None,
            Placement::Replace(id) => self.position_of_id(id),
        };
        match position {
            Some(idx) => {
                let current = &self.items[idx];
                // Stacked updates keep the original server copy for rollback.
                let previous = if current.is_optimistic {
                    current.previous.clone()
                } else {
                    Some(current.entity.clone())
                };
                let tracked = Tracked::provisional(draft, previous);
                self.items[idx] = tracked.clone();
                tracked
            }
            None => {
                let tracked = Tracked::provisional(draft, None);
                self.items.insert(0, tracked.clone());
                tracked
            }
        }
    }

    pub fn begin_create(&mut self, draft: T) -> Tracked<T> {
        self.begin(draft, Placement::Head)
    }

    pub fn begin_update(&mut self, id: &str, draft: T) -> Tracked<T> {
        self.begin(draft, Placement::Replace(id.to_string()))
    }

    /// Hide the entity with server id `id`. Returns `None` when it is not
    /// part of the view.
    pub fn begin_delete(&mut self, id: &str) -> Option<LocalId> {
        let index = self.position_of_id(id)?;
        let after = index
            .checked_sub(1)
            .and_then(|i| self.items[i].entity.id().map(str::to_string));
        let item = self.items.remove(index);
        let local_id = LocalId::generate();
        self.deletes.push(PendingDelete {
            local_id: local_id.clone(),
            index,
            after,
            item,
        });
        Some(local_id)
    }

    /// Swap the provisional entry owned by `local_id` for the server copy.
    ///
    /// When the provisional entry is already gone (a concurrent refresh
    /// replaced it), the server copy replaces the confirmed entry with the
    /// same identity instead. Promoting twice is the same as promoting once.
    pub fn promote(&mut self, local_id: &LocalId, server: T) -> bool {
        if let Some(idx) = self.items.iter().position(|t| t.owned_by(local_id)) {
            self.items[idx] = Tracked::confirmed(server);
            self.dedupe();
            return true;
        }
        // The entry may be hidden by a delete issued while it was pending.
        if let Some(pending) = self.deletes.iter_mut().find(|d| d.item.owned_by(local_id)) {
            pending.item = Tracked::confirmed(server);
            return true;
        }
        let Some(id) = server.id().map(str::to_string) else {
            return false;
        };
        if let Some(idx) = self.position_of_id(&id) {
            let current = &mut self.items[idx];
            if current.is_optimistic {
                // A later update stacked on this one now rolls back to the
                // copy the server just confirmed.
                if current.previous.is_some() {
                    current.previous = Some(server);
                }
            } else if is_fresher(&server, &current.entity) {
                *current = Tracked::confirmed(server);
            }
        } else if let Some(pending) = self
            .deletes
            .iter_mut()
            .find(|d| d.item.entity.id() == Some(id.as_str()))
        {
            if pending.item.is_optimistic {
                if pending.item.previous.is_some() {
                    pending.item.previous = Some(server);
                }
            } else if is_fresher(&server, &pending.item.entity) {
                pending.item = Tracked::confirmed(server);
            }
        }
        false
    }

    /// Settle a pending delete after the server confirmed it.
    pub fn confirm_delete(&mut self, local_id: &LocalId) -> bool {
        let before = self.deletes.len();
        self.deletes.retain(|d| &d.local_id != local_id);
        before != self.deletes.len()
    }

    /// Roll back the mutation owned by `local_id`.
    ///
    /// Creates are removed, updates restore the server copy they replaced,
    /// deletes bring the hidden entity back at its old position. Calling it
    /// again is a no-op.
    pub fn discard(&mut self, local_id: &LocalId) -> bool {
        if let Some(idx) = self.items.iter().position(|t| t.owned_by(local_id)) {
            let tracked = self.items.remove(idx);
            if let Some(previous) = tracked.previous {
                self.items.insert(idx, Tracked::confirmed(previous));
            }
            return true;
        }
        if let Some(pos) = self.deletes.iter().position(|d| d.item.owned_by(local_id)) {
            let tracked = self.deletes[pos].item.clone();
            match tracked.previous {
                Some(previous) => self.deletes[pos].item = Tracked::confirmed(previous),
                // A create that never existed on the server has nothing to restore.
                None => {
                    self.deletes.remove(pos);
                }
            }
            return true;
        }
        if let Some(pos) = self.deletes.iter().position(|d| &d.local_id == local_id) {
            let pending = self.deletes.remove(pos);
            let already_back = pending
                .item
                .entity
                .id()
                .is_some_and(|id| self.position_of_id(id).is_some());
            if !already_back {
                let index = match pending.after.as_deref() {
                    Some(after) => self
                        .position_of_id(after)
                        .map(|i| i + 1)
                        .unwrap_or(pending.index),
                    None => pending.index,
                };
                let index = index.min(self.items.len());
                self.items.insert(index, pending.item);
            }
            return true;
        }
        false
    }

    /// Merge a full server re-fetch with the mutations still in flight.
    ///
    /// Pending creates stay at the head in their current order, pending
    /// updates keep overlaying their entity (and now roll back to the fresh
    /// copy), pending deletes stay hidden.
    pub fn reconcile(&mut self, fresh: Vec<T>) {
        let hidden: HashSet<String> = self
            .deletes
            .iter()
            .filter_map(|d| d.item.entity.id().map(str::to_string))
            .collect();

        let mut creates = Vec::new();
        let mut updates: HashMap<String, Tracked<T>> = HashMap::new();
        for tracked in self.items.drain(..) {
            if !tracked.is_optimistic {
                continue;
            }
            match (&tracked.previous, tracked.entity.id()) {
                (Some(_), Some(id)) => {
                    updates.insert(id.to_string(), tracked);
                }
                _ => creates.push(tracked),
            }
        }

        let mut merged = creates;
        for entity in fresh {
            let id = entity.id().map(str::to_string);
            if let Some(id) = id.as_deref() {
                if hidden.contains(id) {
                    continue;
                }
                if let Some(mut pending) = updates.remove(id) {
                    pending.previous = Some(entity);
                    merged.push(pending);
                    continue;
                }
            }
            merged.push(Tracked::confirmed(entity));
        }
        self.items = dedupe(merged);
    }

    /// Remove duplicate identities in place. See [`dedupe`].
    pub fn dedupe(&mut self) {
        let items = std::mem::take(&mut self.items);
        self.items = dedupe(items);
    }

    fn position_of_id(&self, id: &str) -> Option<usize> {
        self.items.iter().position(|t| t.entity.id() == Some(id))
    }
}

/// Collapse entries that share a server identity into one.
///
/// The survivor takes the position of the first occurrence. A confirmed
/// copy beats a provisional one; between confirmed copies the one with the
/// newest `updated_at` wins, ties going to the earlier entry. Entries
/// without a server identity (pending creates) are never merged.
pub fn dedupe<T: Entity>(items: Vec<Tracked<T>>) -> Vec<Tracked<T>> {
    let mut out: Vec<Tracked<T>> = Vec::with_capacity(items.len());
    let mut seen: HashMap<String, usize> = HashMap::new();

    for item in items {
        let Some(id) = item.entity.id().map(str::to_string) else {
            out.push(item);
            continue;
        };
        match seen.get(&id) {
            None => {
                seen.insert(id, out.len());
                out.push(item);
            }
            Some(&idx) => {
                let kept = &out[idx];
                let replace = match (kept.is_optimistic, item.is_optimistic) {
                    (true, false) => true,
                    (false, true) => false,
                    _ => is_fresher(&item.entity, &kept.entity) && !same_stamp(&item.entity, &kept.entity),
                };
                if replace {
                    out[idx] = item;
                }
            }
        }
    }
    out
}

fn is_fresher<T: Entity>(candidate: &T, current: &T) -> bool {
    match (candidate.updated_at(), current.updated_at()) {
        (Some(a), Some(b)) => a >= b,
        (Some(_), None) => true,
        (None, Some(_)) => false,
        (None, None) => true,
    }
}

fn same_stamp<T: Entity>(a: &T, b: &T) -> bool {
    a.updated_at() == b.updated_at()
}
