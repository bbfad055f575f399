//! Optimistic collections over the server API.
//!
//! A [`Collection`] owns the client view of one server collection (all
//! projects, or the tasks of one project). Every mutation follows the same
//! path:
//!
//! 1. validate the draft locally; a rejected draft never reaches the network;
//! 2. insert the provisional entity and publish the view to the
//!    [`EntityCache`], before the request is issued;
//! 3. on success promote the server copy, on any failure (including a
//!    malformed success payload) discard the provisional entry.
//!
//! The published value is the list of [`Tracked`] entries, so renderers see
//! `_localId` / `_optimistic` on pending rows.

use std::sync::{Arc, Mutex, MutexGuard};

use context_sync_core::entity_cache::{keys, EntityCache, QueryKey};
use context_sync_core::models::{Entity, Method, Project, Task};
use context_sync_core::optimistic::{LocalId, OptimisticList, Tracked};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::api::ListEnvelope;
use crate::error::{SyncError, SyncResult};
use crate::revalidate::{RequestOptions, RevalidatingClient};

/// Where a collection lives on the server and in the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionSpec {
    pub key: QueryKey,
    pub list_path: String,
    pub create_path: String,
    /// Item paths are `{item_base}/{id}`.
    pub item_base: String,
}

impl CollectionSpec {
    pub fn projects() -> Self {
        Self {
            key: keys::projects(),
            list_path: "/api/projects".to_string(),
            create_path: "/api/projects".to_string(),
            item_base: "/api/projects".to_string(),
        }
    }

    pub fn project_tasks(project_id: &str) -> Self {
        Self {
            key: keys::project_tasks(project_id),
            list_path: format!("/api/projects/{}/tasks", project_id),
            create_path: "/api/tasks".to_string(),
            item_base: "/api/tasks".to_string(),
        }
    }

    pub fn item_path(&self, id: &str) -> String {
        format!("{}/{}", self.item_base, id)
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ItemEnvelope<T> {
    Bare(T),
    Wrapped {
        #[serde(alias = "project", alias = "task", alias = "item")]
        item: T,
    },
}

impl<T> ItemEnvelope<T> {
    fn into_item(self) -> T {
        match self {
            ItemEnvelope::Bare(item) => item,
            ItemEnvelope::Wrapped { item } => item,
        }
    }
}

pub type ProjectCollection = Collection<Project>;
pub type TaskCollection = Collection<Task>;

pub struct Collection<T> {
    spec: CollectionSpec,
    client: Arc<RevalidatingClient>,
    cache: Arc<EntityCache>,
    list: Mutex<OptimisticList<T>>,
    teardown: CancellationToken,
}

impl<T> Collection<T>
where
    T: Entity + Serialize + DeserializeOwned,
{
    pub fn new(spec: CollectionSpec, client: Arc<RevalidatingClient>, cache: Arc<EntityCache>) -> Self {
        Self {
            spec,
            client,
            cache,
            list: Mutex::new(OptimisticList::new()),
            teardown: CancellationToken::new(),
        }
    }

    pub fn spec(&self) -> &CollectionSpec {
        &self.spec
    }

    /// Current view, pending entries included.
    pub fn snapshot(&self) -> Vec<Tracked<T>> {
        self.lock().items().to_vec()
    }

    pub fn pending(&self) -> usize {
        self.lock().pending()
    }

    /// Abort every in-flight call. Their mutations roll back and late
    /// responses are dropped.
    pub fn close(&self) {
        self.teardown.cancel();
    }

    /// Re-fetch the collection and merge it with mutations still in flight.
    pub async fn refresh(&self) -> SyncResult<Vec<Tracked<T>>> {
        let bytes = self
            .client
            .request(&self.spec.list_path, self.options(Method::Get))
            .await?;
        let fresh = serde_json::from_slice::<ListEnvelope<T>>(&bytes)
            .map_err(|e| SyncError::InvalidResponse(e.to_string()))?
            .into_items();
        debug!(key = %self.spec.key, count = fresh.len(), "collection refreshed");

        let mut list = self.lock();
        list.reconcile(fresh);
        self.publish(&list);
        Ok(list.items().to_vec())
    }

    pub async fn create(&self, draft: T) -> SyncResult<T> {
        draft.validate().map_err(SyncError::Validation)?;
        let body = to_body(&draft)?;
        let local_id = self.begin(|list| list.begin_create(draft).local_id)?;

        let result = self
            .client
            .request(
                &self.spec.create_path,
                self.options(Method::Post).json(body),
            )
            .await;
        self.settle(&local_id, result)
    }

    pub async fn update(&self, id: &str, draft: T) -> SyncResult<T> {
        draft.validate().map_err(SyncError::Validation)?;
        let body = to_body(&draft)?;
        let local_id = self.begin(|list| list.begin_update(id, draft).local_id)?;

        let result = self
            .client
            .request(
                &self.spec.item_path(id),
                self.options(Method::Put).json(body),
            )
            .await;
        self.settle(&local_id, result)
    }

    /// Delete by server id. A `404` counts as success: the entity is gone
    /// either way.
    pub async fn delete(&self, id: &str) -> SyncResult<()> {
        let local_id = {
            let mut list = self.lock();
            let local_id = list.begin_delete(id);
            self.publish(&list);
            local_id
        };
        let result = self
            .client
            .request(&self.spec.item_path(id), self.options(Method::Delete))
            .await;

        let mut list = self.lock();
        match result {
            Ok(_) => {
                if let Some(local_id) = &local_id {
                    list.confirm_delete(local_id);
                }
                self.publish(&list);
                Ok(())
            }
            Err(e) if e.is_not_found() => {
                if let Some(local_id) = &local_id {
                    list.confirm_delete(local_id);
                }
                self.publish(&list);
                debug!(key = %self.spec.key, id, "delete target already gone");
                Ok(())
            }
            Err(e) => {
                if let Some(local_id) = &local_id {
                    list.discard(local_id);
                }
                self.publish(&list);
                warn!(key = %self.spec.key, id, error = %e, "delete rolled back");
                Err(e)
            }
        }
    }

    fn begin<F>(&self, insert: F) -> SyncResult<LocalId>
    where
        F: FnOnce(&mut OptimisticList<T>) -> Option<LocalId>,
    {
        let mut list = self.lock();
        let local_id = insert(&mut list)
            .ok_or_else(|| SyncError::Validation("provisional entry without local id".into()))?;
        self.publish(&list);
        Ok(local_id)
    }

    fn settle(&self, local_id: &LocalId, result: SyncResult<Vec<u8>>) -> SyncResult<T> {
        let parsed = result.and_then(|bytes| {
            let item = serde_json::from_slice::<ItemEnvelope<T>>(&bytes)
                .map_err(|e| SyncError::InvalidResponse(e.to_string()))?
                .into_item();
            if item.id().is_none() {
                return Err(SyncError::InvalidResponse(
                    "server entity has no id".to_string(),
                ));
            }
            Ok(item)
        });

        let mut list = self.lock();
        match parsed {
            Ok(server) => {
                list.promote(local_id, server.clone());
                self.publish(&list);
                Ok(server)
            }
            Err(e) => {
                list.discard(local_id);
                self.publish(&list);
                warn!(key = %self.spec.key, local_id = %local_id, error = %e, "mutation rolled back");
                Err(e)
            }
        }
    }

    fn publish(&self, list: &OptimisticList<T>) {
        if let Err(e) = self.cache.set_as(self.spec.key.clone(), &list.items()) {
            warn!(key = %self.spec.key, error = ?e, "failed to publish collection");
        }
    }

    fn options(&self, method: Method) -> RequestOptions {
        let options = RequestOptions::method(method).abort_on(self.teardown.clone());
        if method.is_read() {
            options
        } else {
            options.invalidating(self.spec.list_path.clone())
        }
    }

    fn lock(&self) -> MutexGuard<'_, OptimisticList<T>> {
        self.list.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn to_body<T: Serialize>(draft: &T) -> SyncResult<serde_json::Value> {
    serde_json::to_value(draft)
        .map_err(|e| SyncError::Validation(format!("unserializable entity: {}", e)))
}
