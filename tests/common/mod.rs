//! Scripted collaborators shared by the integration suites.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use context_sync::api::JobApi;
use context_sync::error::{SyncError, SyncResult};
use context_sync::transport::{HttpRequest, HttpResponse, Transport};
use context_sync_core::models::{JobStatus, KnowledgeType, ProgressPayload, StartParams};
use context_sync_core::store::memory::InMemoryKvStore;
use context_sync_core::store::KvStore;
use tokio::sync::Notify;

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
}

pub fn crawl_params(url: &str) -> StartParams {
    StartParams::Crawl {
        url: url.to_string(),
        knowledge_type: KnowledgeType::Technical,
        tags: vec!["docs".to_string()],
        max_depth: 2,
    }
}

pub fn progress(status: JobStatus, percent: f64) -> ProgressPayload {
    ProgressPayload::new(status, percent)
}

pub fn not_found(id: &str) -> SyncError {
    SyncError::NotFound {
        resource: format!("/api/progress/{}", id),
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Transport
// ═══════════════════════════════════════════════════════════════════════

pub enum Step {
    Respond(HttpResponse),
    Fail(SyncError),
    /// Respond once the notify fires.
    Gated(Arc<Notify>, HttpResponse),
    /// Never respond.
    Hang,
}

/// Transport that answers requests from a FIFO script and records them.
#[derive(Default)]
pub struct ScriptedTransport {
    steps: Mutex<VecDeque<Step>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push(&self, step: Step) {
        self.steps.lock().unwrap().push_back(step);
    }

    pub fn respond(&self, status: u16, body: &str) {
        self.push(Step::Respond(HttpResponse::new(status, body.as_bytes().to_vec())));
    }

    pub fn respond_with_etag(&self, body: &str, etag: &str) {
        self.push(Step::Respond(
            HttpResponse::new(200, body.as_bytes().to_vec()).with_header("ETag", etag),
        ));
    }

    /// Queue a gated `200` and return the gate.
    pub fn gated(&self, status: u16, body: &str) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.push(Step::Gated(
            gate.clone(),
            HttpResponse::new(status, body.as_bytes().to_vec()),
        ));
        gate
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: HttpRequest) -> SyncResult<HttpResponse> {
        self.requests.lock().unwrap().push(request);
        let step = self.steps.lock().unwrap().pop_front();
        match step {
            Some(Step::Respond(response)) => Ok(response),
            Some(Step::Fail(err)) => Err(err),
            Some(Step::Gated(gate, response)) => {
                gate.notified().await;
                Ok(response)
            }
            Some(Step::Hang) => std::future::pending().await,
            None => Err(SyncError::network("unscripted request")),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Job API
// ═══════════════════════════════════════════════════════════════════════

/// [`JobApi`] with scripted progress results per job.
#[derive(Default)]
pub struct FakeJobApi {
    next_ids: Mutex<VecDeque<String>>,
    started: Mutex<Vec<StartParams>>,
    script: Mutex<HashMap<String, VecDeque<SyncResult<ProgressPayload>>>>,
    polls: Mutex<HashMap<String, usize>>,
    stopped: Mutex<Vec<String>>,
    fail_stop: Mutex<bool>,
}

impl FakeJobApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn issue_ids(&self, ids: &[&str]) {
        self.next_ids
            .lock()
            .unwrap()
            .extend(ids.iter().map(|s| s.to_string()));
    }

    pub fn script(&self, id: &str, result: SyncResult<ProgressPayload>) {
        self.script
            .lock()
            .unwrap()
            .entry(id.to_string())
            .or_default()
            .push_back(result);
    }

    pub fn fail_stop(&self) {
        *self.fail_stop.lock().unwrap() = true;
    }

    pub fn polls(&self, id: &str) -> usize {
        self.polls.lock().unwrap().get(id).copied().unwrap_or(0)
    }

    pub fn total_polls(&self) -> usize {
        self.polls.lock().unwrap().values().sum()
    }

    pub fn started(&self) -> Vec<StartParams> {
        self.started.lock().unwrap().clone()
    }

    pub fn stopped(&self) -> Vec<String> {
        self.stopped.lock().unwrap().clone()
    }
}

#[async_trait]
impl JobApi for FakeJobApi {
    async fn start(&self, params: &StartParams) -> SyncResult<String> {
        self.started.lock().unwrap().push(params.clone());
        self.next_ids
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| SyncError::network("no progress id scripted"))
    }

    async fn progress(&self, progress_id: &str) -> SyncResult<ProgressPayload> {
        *self
            .polls
            .lock()
            .unwrap()
            .entry(progress_id.to_string())
            .or_default() += 1;
        // Suspend once so concurrent polls overlap.
        tokio::task::yield_now().await;
        self.script
            .lock()
            .unwrap()
            .get_mut(progress_id)
            .and_then(|q| q.pop_front())
            .unwrap_or_else(|| Err(SyncError::network("no progress scripted")))
    }

    async fn stop(&self, progress_id: &str) -> SyncResult<()> {
        self.stopped.lock().unwrap().push(progress_id.to_string());
        if *self.fail_stop.lock().unwrap() {
            return Err(SyncError::network("connection reset"));
        }
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Stores
// ═══════════════════════════════════════════════════════════════════════

/// Yields before every operation so concurrent callers interleave.
#[derive(Default)]
pub struct YieldingKv {
    pub inner: InMemoryKvStore,
}

#[async_trait]
impl KvStore for YieldingKv {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        tokio::task::yield_now().await;
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        tokio::task::yield_now().await;
        self.inner.set(key, value).await
    }

    async fn delete(&self, key: &str) -> anyhow::Result<()> {
        tokio::task::yield_now().await;
        self.inner.delete(key).await
    }

    async fn list_keys(&self, prefix: &str) -> anyhow::Result<Vec<String>> {
        tokio::task::yield_now().await;
        self.inner.list_keys(prefix).await
    }
}

/// Store whose reads of selected keys fail with an I/O error.
#[derive(Default)]
pub struct BrokenReadsKv {
    pub inner: InMemoryKvStore,
    broken: Mutex<Vec<String>>,
}

impl BrokenReadsKv {
    pub fn break_key(&self, key: &str) {
        self.broken.lock().unwrap().push(key.to_string());
    }
}

#[async_trait]
impl KvStore for BrokenReadsKv {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        if self.broken.lock().unwrap().iter().any(|k| k == key) {
            anyhow::bail!("disk I/O error reading {}", key);
        }
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        self.inner.set(key, value).await
    }

    async fn delete(&self, key: &str) -> anyhow::Result<()> {
        self.inner.delete(key).await
    }

    async fn list_keys(&self, prefix: &str) -> anyhow::Result<Vec<String>> {
        self.inner.list_keys(prefix).await
    }
}
