//! Typed server API.
//!
//! [`JobApi`] is the narrow start/poll/stop contract the job tracker drives;
//! [`KnowledgeApi`] implements it (plus the knowledge listing) on top of
//! the [`RevalidatingClient`].

use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use context_sync_core::models::{KnowledgeItem, Method, ProgressPayload, StartParams};
use serde::Deserialize;
use serde_json::json;

use crate::error::{SyncError, SyncResult};
use crate::revalidate::RevalidatingClient;

/// Start/poll/stop contract for long-running server jobs.
#[async_trait]
pub trait JobApi: Send + Sync {
    /// Issue the start call and return the server-issued progress id.
    async fn start(&self, params: &StartParams) -> SyncResult<String>;

    /// Read the latest progress. A job the server does not know is
    /// [`SyncError::NotFound`].
    async fn progress(&self, progress_id: &str) -> SyncResult<ProgressPayload>;

    /// Ask the server to stop a job.
    async fn stop(&self, progress_id: &str) -> SyncResult<()>;
}

#[derive(Debug, Deserialize)]
struct StartResponse {
    #[serde(rename = "progressId", alias = "progress_id")]
    progress_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum ListEnvelope<T> {
    Bare(Vec<T>),
    Wrapped {
        #[serde(alias = "items", alias = "projects", alias = "tasks")]
        items: Vec<T>,
    },
}

impl<T> ListEnvelope<T> {
    pub(crate) fn into_items(self) -> Vec<T> {
        match self {
            ListEnvelope::Bare(items) => items,
            ListEnvelope::Wrapped { items } => items,
        }
    }
}

pub mod paths {
    pub const KNOWLEDGE_ITEMS: &str = "/api/knowledge-items";
    pub const CRAWL: &str = "/api/knowledge-items/crawl";
    pub const UPLOAD: &str = "/api/documents/upload";

    pub fn refresh(source_id: &str) -> String {
        format!("/api/knowledge-items/{}/refresh", source_id)
    }

    pub fn progress(progress_id: &str) -> String {
        format!("/api/progress/{}", progress_id)
    }

    pub fn stop(progress_id: &str) -> String {
        format!("/api/knowledge-items/stop/{}", progress_id)
    }
}

pub struct KnowledgeApi {
    client: Arc<RevalidatingClient>,
}

impl KnowledgeApi {
    pub fn new(client: Arc<RevalidatingClient>) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &Arc<RevalidatingClient> {
        &self.client
    }

    pub async fn list_items(&self) -> SyncResult<Vec<KnowledgeItem>> {
        let envelope: ListEnvelope<KnowledgeItem> =
            self.client.get_json(paths::KNOWLEDGE_ITEMS).await?;
        Ok(envelope.into_items())
    }

    async fn upload_body(
        path: &str,
        knowledge_type: &context_sync_core::models::KnowledgeType,
        tags: &[String],
    ) -> SyncResult<serde_json::Value> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| SyncError::Validation(format!("cannot read {}: {}", path, e)))?;
        let filename = std::path::Path::new(path)
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.to_string());
        Ok(json!({
            "filename": filename,
            "content_base64": base64::engine::general_purpose::STANDARD.encode(&bytes),
            "knowledge_type": knowledge_type,
            "tags": tags,
        }))
    }
}

#[async_trait]
impl JobApi for KnowledgeApi {
    async fn start(&self, params: &StartParams) -> SyncResult<String> {
        let response: StartResponse = match params {
            StartParams::Crawl {
                url,
                knowledge_type,
                tags,
                max_depth,
            } => {
                let body = json!({
                    "url": url,
                    "knowledge_type": knowledge_type,
                    "tags": tags,
                    "max_depth": max_depth,
                });
                self.client.send_json(Method::Post, paths::CRAWL, &body).await?
            }
            StartParams::Refresh { source_id } => {
                self.client
                    .send_json(Method::Post, &paths::refresh(source_id), &json!({}))
                    .await?
            }
            StartParams::Upload {
                path,
                knowledge_type,
                tags,
            } => {
                let body = Self::upload_body(path, knowledge_type, tags).await?;
                self.client.send_json(Method::Post, paths::UPLOAD, &body).await?
            }
        };
        if response.progress_id.trim().is_empty() {
            return Err(SyncError::InvalidResponse(
                "start call returned an empty progressId".to_string(),
            ));
        }
        Ok(response.progress_id)
    }

    async fn progress(&self, progress_id: &str) -> SyncResult<ProgressPayload> {
        self.client.get_json(&paths::progress(progress_id)).await
    }

    async fn stop(&self, progress_id: &str) -> SyncResult<()> {
        self.client.send(Method::Post, &paths::stop(progress_id)).await
    }
}
