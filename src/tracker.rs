//! Background job tracker.
//!
//! The [`JobTracker`] owns every crawl, refresh and upload the client has
//! started. It persists each handle through [`HandleStore`] before the first
//! poll, polls the progress endpoint, applies the per-job
//! [`JobMachine`] and performs the side effects of a terminal state:
//!
//! - the handle leaves storage and the active set immediately;
//! - a completed job invalidates the cached knowledge listing, exactly once;
//! - a failed or cancelled job stays in the `finished` list for a short
//!   linger so it can be read, dismissed or retried;
//! - a job the server forgot (`Gone`) is dropped without a banner.
//!
//! On start-up [`JobTracker::recover`] rebuilds the active set from storage.
//! Until it has finished, [`TrackerSnapshot::ready`] is `false`.
//!
//! State lives behind a `std::sync::Mutex` that is never held across an
//! `.await`; network and storage calls happen between short critical
//! sections, so every step re-checks that the job is still active.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};
use context_sync_core::clock::Clock;
use context_sync_core::entity_cache::{keys, EntityCache, QueryKey};
use context_sync_core::job::{abandoned, Abandoned, JobMachine, Termination, Transition};
use context_sync_core::models::{JobHandle, JobKind, JobStatus, ProgressPayload, StartParams};
use context_sync_core::store::KvStore;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use crate::api::JobApi;
use crate::config::Config;
use crate::error::{SyncError, SyncResult};
use crate::persistence::HandleStore;
use crate::progress::{JobEvent, JobProgressReporter, NoProgress};

/// Crawls deeper than this are rejected before the start call.
pub const MAX_CRAWL_DEPTH: u32 = 5;

// ═══════════════════════════════════════════════════════════════════════
// Settings & views
// ═══════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
pub struct TrackerSettings {
    pub poll_interval: std::time::Duration,
    pub not_found_threshold: u32,
    pub stale_after: Duration,
    pub failure_linger: Duration,
    pub completion_linger: Duration,
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl TrackerSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            not_found_threshold: config.polling.not_found_threshold,
            stale_after: config.stale_after(),
            failure_linger: Duration::seconds(config.jobs.failure_linger_secs as i64),
            completion_linger: Duration::seconds(config.jobs.completion_linger_secs as i64),
        }
    }

    fn linger_for(&self, termination: Option<&Termination>) -> Duration {
        match termination {
            Some(Termination::Failed { .. }) => self.failure_linger,
            _ => self.completion_linger,
        }
    }
}

/// Render-ready view of one job.
#[derive(Debug, Clone, PartialEq)]
pub struct JobView {
    pub progress_id: String,
    pub kind: JobKind,
    pub label: String,
    pub status: JobStatus,
    pub percent: f64,
    pub message: Option<String>,
    pub termination: Option<Termination>,
    pub started_at: DateTime<Utc>,
}

impl JobView {
    fn of(machine: &JobMachine) -> Self {
        let handle = machine.handle();
        Self {
            progress_id: handle.progress_id.clone(),
            kind: handle.kind,
            label: handle.original_params.label().to_string(),
            status: handle.status,
            percent: handle.percent(),
            message: handle.last_progress.as_ref().and_then(|p| p.message.clone()),
            termination: machine.termination().cloned(),
            started_at: handle.started_at,
        }
    }

    /// Failed and cancelled jobs can be re-issued while on display.
    pub fn retryable(&self) -> bool {
        matches!(
            self.termination,
            Some(Termination::Failed { .. }) | Some(Termination::Cancelled)
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrackerSnapshot {
    /// `false` until reload recovery has finished.
    pub ready: bool,
    pub active: Vec<JobView>,
    pub finished: Vec<JobView>,
}

impl TrackerSnapshot {
    /// Whether an "in progress" indicator should be shown.
    pub fn shows_in_progress(&self) -> bool {
        self.ready && !self.active.is_empty()
    }
}

/// Result of one poll.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    Progress(JobStatus),
    NotFoundTolerated { streak: u32 },
    Finished(Termination),
    /// The id is not (or no longer) active.
    NotTracked,
}

/// What [`JobTracker::recover`] did with each persisted handle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecoveryReport {
    pub resumed: Vec<String>,
    pub evicted_terminal: Vec<String>,
    pub evicted_stale: Vec<String>,
    /// The server no longer knows the job.
    pub gone: Vec<String>,
    /// The job reached a terminal state while the client was away.
    pub finished: Vec<String>,
    /// Verification failed transiently; kept and polled normally.
    pub unverified: Vec<String>,
    /// Indexed ids without a readable handle, and unindexed handles.
    pub dropped: Vec<String>,
}

// ═══════════════════════════════════════════════════════════════════════
// Tracker
// ═══════════════════════════════════════════════════════════════════════

struct TrackerState {
    ready: bool,
    visible: bool,
    active: Vec<JobMachine>,
    finished: Vec<JobMachine>,
}

enum Observation {
    Progress(ProgressPayload),
    NotFound,
}

pub struct JobTracker {
    api: Arc<dyn JobApi>,
    store: HandleStore,
    cache: Arc<EntityCache>,
    clock: Arc<dyn Clock>,
    settings: TrackerSettings,
    reporter: Arc<dyn JobProgressReporter>,
    state: Mutex<TrackerState>,
    wake: Notify,
}

impl JobTracker {
    pub fn new(
        api: Arc<dyn JobApi>,
        kv: Arc<dyn KvStore>,
        cache: Arc<EntityCache>,
        clock: Arc<dyn Clock>,
        settings: TrackerSettings,
    ) -> Self {
        Self {
            api,
            store: HandleStore::new(kv),
            cache,
            clock,
            settings,
            reporter: Arc::new(NoProgress),
            state: Mutex::new(TrackerState {
                ready: false,
                visible: true,
                active: Vec::new(),
                finished: Vec::new(),
            }),
            wake: Notify::new(),
        }
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn JobProgressReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn settings(&self) -> &TrackerSettings {
        &self.settings
    }

    // ── Lifecycle ──────────────────────────────────────────────────────

    /// Start a job: validate, issue the start call, persist the handle and
    /// register it as active.
    pub async fn start(&self, params: StartParams) -> SyncResult<JobHandle> {
        validate_params(&params).await?;
        let progress_id = self.api.start(&params).await?;
        let handle = JobHandle::new(progress_id, params, self.clock.now());
        self.store
            .save(&handle)
            .await
            .map_err(SyncError::storage)?;

        self.lock().active.push(JobMachine::new(handle.clone()));
        info!(
            progress_id = %handle.progress_id,
            kind = %handle.kind,
            label = handle.original_params.label(),
            "job started"
        );
        self.reporter.report(&JobEvent::Started {
            progress_id: handle.progress_id.clone(),
            kind: handle.kind,
            label: handle.original_params.label().to_string(),
        });
        self.wake.notify_one();
        Ok(handle)
    }

    /// Poll one job once. Transient errors are returned and the job stays
    /// active.
    pub async fn poll(&self, progress_id: &str) -> SyncResult<PollOutcome> {
        if !self.is_active(progress_id) {
            return Ok(PollOutcome::NotTracked);
        }
        match self.api.progress(progress_id).await {
            Ok(payload) => self.observe(progress_id, Observation::Progress(payload)).await,
            Err(e) if e.is_not_found() => self.observe(progress_id, Observation::NotFound).await,
            Err(e) => {
                warn!(progress_id, error = %e, "transient poll failure");
                Err(e)
            }
        }
    }

    /// Poll every active job once, in start order. Also expires lingering
    /// finished jobs. Returns the number of jobs polled.
    pub async fn tick(&self) -> usize {
        self.prune_finished();
        let ids = self.active_ids();
        for id in &ids {
            // Transient failures are already logged by `poll`.
            let _ = self.poll(id).await;
        }
        ids.len()
    }

    /// Cancel a job. The local handle moves to `cancelled` at once; a
    /// failing server-side stop is only logged.
    pub async fn stop(&self, progress_id: &str) -> SyncResult<()> {
        {
            let mut state = self.lock();
            let idx = state
                .active
                .iter()
                .position(|m| m.progress_id() == progress_id)
                .ok_or_else(|| SyncError::NotFound {
                    resource: format!("job {}", progress_id),
                })?;
            let mut machine = state.active.remove(idx);
            machine.cancel(self.clock.now());
            state.finished.push(machine);
        }
        self.forget_persisted(progress_id).await;
        info!(progress_id, "job cancelled locally");
        self.reporter.report(&JobEvent::Finished {
            progress_id: progress_id.to_string(),
            termination: Termination::Cancelled,
        });

        if let Err(e) = self.api.stop(progress_id).await {
            warn!(progress_id, error = %e, "server-side stop failed");
        }
        Ok(())
    }

    /// Re-issue a job with its original parameters. The old handle is
    /// discarded first.
    pub async fn retry(&self, progress_id: &str) -> SyncResult<JobHandle> {
        let params = {
            let mut state = self.lock();
            let taken = match state
                .active
                .iter()
                .position(|m| m.progress_id() == progress_id)
            {
                Some(idx) => Some(state.active.remove(idx)),
                None => state
                    .finished
                    .iter()
                    .position(|m| m.progress_id() == progress_id)
                    .map(|idx| state.finished.remove(idx)),
            };
            match taken {
                Some(machine) => machine.into_handle().original_params,
                None => {
                    return Err(SyncError::NotFound {
                        resource: format!("job {}", progress_id),
                    })
                }
            }
        };
        self.forget_persisted(progress_id).await;
        info!(progress_id, "retrying job");
        self.start(params).await
    }

    /// Retry a job known only from storage, e.g. from a fresh CLI process.
    pub async fn retry_persisted(&self, progress_id: &str) -> SyncResult<JobHandle> {
        if self.is_known(progress_id) {
            return self.retry(progress_id).await;
        }
        let handle = self
            .store
            .load(progress_id)
            .await
            .map_err(SyncError::storage)?
            .ok_or_else(|| SyncError::NotFound {
                resource: format!("job {}", progress_id),
            })?;
        self.forget_persisted(progress_id).await;
        self.start(handle.original_params).await
    }

    /// Remove a finished job from display before its linger ends.
    pub fn dismiss(&self, progress_id: &str) -> bool {
        let mut state = self.lock();
        let before = state.finished.len();
        state.finished.retain(|m| m.progress_id() != progress_id);
        before != state.finished.len()
    }

    /// Drop finished jobs whose linger has elapsed.
    pub fn prune_finished(&self) -> usize {
        let now = self.clock.now();
        let mut state = self.lock();
        let before = state.finished.len();
        let settings = &self.settings;
        state
            .finished
            .retain(|m| !m.linger_elapsed(now, settings.linger_for(m.termination())));
        before - state.finished.len()
    }

    // ── Reload recovery ────────────────────────────────────────────────

    /// Rebuild the active set from storage.
    ///
    /// Terminal and stale handles are evicted without a network call. Each
    /// survivor gets one verification read, sequentially; a not-found drops
    /// it silently. Handles that cannot be read are dropped. The tracker
    /// reports itself ready only afterwards, even when storage fails.
    pub async fn recover(&self) -> SyncResult<RecoveryReport> {
        let mut report = RecoveryReport::default();
        let ids = match self.store.index().await {
            Ok(ids) => ids,
            Err(e) => {
                warn!(error = ?e, "job index unreadable; recovering nothing");
                Vec::new()
            }
        };
        let now = self.clock.now();

        for id in ids {
            if self.is_active(&id) {
                continue;
            }
            let handle = match self.store.load(&id).await {
                Ok(Some(handle)) => handle,
                Ok(None) => {
                    self.forget_persisted(&id).await;
                    report.dropped.push(id);
                    continue;
                }
                Err(e) => {
                    warn!(progress_id = %id, error = ?e, "persisted job unreadable; dropping it");
                    self.forget_persisted(&id).await;
                    report.dropped.push(id);
                    continue;
                }
            };

            match abandoned(&handle, now, self.settings.stale_after) {
                Some(Abandoned::Terminal) => {
                    self.forget_persisted(&id).await;
                    report.evicted_terminal.push(id);
                    continue;
                }
                Some(Abandoned::Stale) => {
                    self.forget_persisted(&id).await;
                    report.evicted_stale.push(id);
                    continue;
                }
                None => {}
            }

            let mut machine = JobMachine::new(handle);
            match self.api.progress(&id).await {
                Ok(payload) => match machine.apply_progress(payload, self.clock.now()) {
                    Transition::Terminated(termination) => {
                        self.conclude(machine, termination).await;
                        report.finished.push(id);
                    }
                    _ => {
                        self.persist_progress(machine.handle()).await;
                        self.lock().active.push(machine);
                        report.resumed.push(id);
                    }
                },
                Err(e) if e.is_not_found() => {
                    debug!(progress_id = %id, "persisted job no longer exists on the server");
                    self.forget_persisted(&id).await;
                    report.gone.push(id);
                }
                Err(e) => {
                    warn!(progress_id = %id, error = %e, "could not verify persisted job; keeping it");
                    self.lock().active.push(machine);
                    report.unverified.push(id);
                }
            }
        }

        match self.store.sweep_orphans().await {
            Ok(swept) => report.dropped.extend(swept),
            Err(e) => warn!(error = ?e, "failed to sweep orphaned job handles"),
        }

        self.lock().ready = true;
        info!(
            resumed = report.resumed.len(),
            evicted = report.evicted_terminal.len() + report.evicted_stale.len(),
            gone = report.gone.len(),
            "job recovery finished"
        );
        self.wake.notify_one();
        Ok(report)
    }

    // ── Views ──────────────────────────────────────────────────────────

    pub fn snapshot(&self) -> TrackerSnapshot {
        let state = self.lock();
        TrackerSnapshot {
            ready: state.ready,
            active: state.active.iter().map(JobView::of).collect(),
            finished: state.finished.iter().map(JobView::of).collect(),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.lock().ready
    }

    pub fn active_ids(&self) -> Vec<String> {
        self.lock()
            .active
            .iter()
            .map(|m| m.progress_id().to_string())
            .collect()
    }

    pub fn is_active(&self, progress_id: &str) -> bool {
        self.lock()
            .active
            .iter()
            .any(|m| m.progress_id() == progress_id)
    }

    fn is_known(&self, progress_id: &str) -> bool {
        let state = self.lock();
        state
            .active
            .iter()
            .chain(state.finished.iter())
            .any(|m| m.progress_id() == progress_id)
    }

    // ── Polling loop ───────────────────────────────────────────────────

    /// Pause or resume polling, e.g. when the view is hidden.
    pub fn set_visible(&self, visible: bool) {
        self.lock().visible = visible;
        if visible {
            self.wake.notify_one();
        }
    }

    /// Self-scheduling polling loop. Each tick awaits the previous one.
    /// Sleeps while nothing is active, the tracker is not ready, or the
    /// view is hidden. Returns when `shutdown` fires.
    pub async fn run(&self, shutdown: CancellationToken) {
        loop {
            if shutdown.is_cancelled() {
                break;
            }
            let should_poll = {
                let state = self.lock();
                state.ready && state.visible && !state.active.is_empty()
            };
            if should_poll {
                self.tick().await;
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(self.settings.poll_interval) => {}
                }
            } else {
                self.prune_finished();
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = self.wake.notified() => {}
                    _ = tokio::time::sleep(self.settings.poll_interval) => {}
                }
            }
        }
        debug!("job polling loop stopped");
    }

    /// Poll until no job is active or `shutdown` fires.
    pub async fn run_until_idle(&self, shutdown: CancellationToken) {
        while !shutdown.is_cancelled() && !self.active_ids().is_empty() {
            self.tick().await;
            if self.active_ids().is_empty() {
                break;
            }
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.settings.poll_interval) => {}
            }
        }
    }

    // ── Internals ──────────────────────────────────────────────────────

    async fn observe(&self, progress_id: &str, observation: Observation) -> SyncResult<PollOutcome> {
        let now = self.clock.now();
        let threshold = self.settings.not_found_threshold;

        let (transition, snapshot) = {
            let mut state = self.lock();
            let idx = match state
                .active
                .iter()
                .position(|m| m.progress_id() == progress_id)
            {
                Some(idx) => idx,
                None => return Ok(PollOutcome::NotTracked),
            };
            let machine = &mut state.active[idx];
            let transition = match observation {
                Observation::Progress(payload) => machine.apply_progress(payload, now),
                Observation::NotFound => machine.record_not_found(threshold, now),
            };
            let snapshot = match transition {
                Transition::Terminated(_) => Some(state.active.remove(idx)),
                Transition::Progressed(_) => Some(state.active[idx].clone()),
                _ => None,
            };
            (transition, snapshot)
        };

        match (transition, snapshot) {
            (Transition::Progressed(status), Some(machine)) => {
                debug!(progress_id, status = %status, percent = machine.handle().percent(), "job progress");
                self.persist_progress(machine.handle()).await;
                self.report_progress(machine.handle());
                Ok(PollOutcome::Progress(status))
            }
            (Transition::Terminated(termination), Some(machine)) => {
                self.conclude(machine, termination.clone()).await;
                Ok(PollOutcome::Finished(termination))
            }
            (Transition::NotFoundTolerated { streak }, _) => {
                debug!(progress_id, streak, threshold, "progress not found; tolerating");
                Ok(PollOutcome::NotFoundTolerated { streak })
            }
            _ => Ok(PollOutcome::NotTracked),
        }
    }

    /// Terminal side effects for a machine already removed from `active`.
    async fn conclude(&self, mut machine: JobMachine, termination: Termination) {
        let progress_id = machine.progress_id().to_string();
        self.forget_persisted(&progress_id).await;

        if machine.claim_completion() {
            for key in output_keys(machine.handle().kind) {
                let touched = self.cache.invalidate_prefix(&key);
                debug!(progress_id = %progress_id, key = %key, touched, "invalidated job output");
            }
        }

        match &termination {
            Termination::Gone => {
                info!(progress_id = %progress_id, "job no longer exists on the server; dropped");
            }
            Termination::Failed { message } => {
                warn!(progress_id = %progress_id, message = %message, "job failed");
            }
            other => info!(progress_id = %progress_id, outcome = other.label(), "job finished"),
        }
        self.reporter.report(&JobEvent::Finished {
            progress_id: progress_id.clone(),
            termination: termination.clone(),
        });

        if termination != Termination::Gone {
            self.lock().finished.push(machine);
        }
    }

    async fn persist_progress(&self, handle: &JobHandle) {
        if let Err(e) = self.store.save(handle).await {
            warn!(progress_id = %handle.progress_id, error = ?e, "failed to persist job progress");
            return;
        }
        // A concurrent poll may have finished the job while we were writing.
        if !self.is_active(&handle.progress_id) {
            self.forget_persisted(&handle.progress_id).await;
        }
    }

    async fn forget_persisted(&self, progress_id: &str) {
        if let Err(e) = self.store.remove(progress_id).await {
            warn!(progress_id, error = ?e, "failed to remove persisted job");
        }
    }

    fn report_progress(&self, handle: &JobHandle) {
        let progress = handle.last_progress.as_ref();
        self.reporter.report(&JobEvent::Progress {
            progress_id: handle.progress_id.clone(),
            status: handle.status,
            percent: handle.percent(),
            counts: progress.and_then(counts),
            message: progress.and_then(|p| p.message.clone()),
        });
    }

    fn lock(&self) -> MutexGuard<'_, TrackerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Cache keys a finished job of `kind` makes stale.
pub fn output_keys(kind: JobKind) -> Vec<QueryKey> {
    match kind {
        JobKind::Crawl | JobKind::Refresh | JobKind::Upload => vec![keys::knowledge_items()],
    }
}

fn counts(payload: &ProgressPayload) -> Option<(u64, u64)> {
    [
        ("processed_pages", "total_pages"),
        ("completed_documents", "total_documents"),
        ("chunks_stored", "total_chunks"),
    ]
    .iter()
    .find_map(|(n, total)| Some((payload.counter(n)?, payload.counter(total)?)))
}

/// Reject parameters the server would refuse, before any network call.
pub async fn validate_params(params: &StartParams) -> SyncResult<()> {
    match params {
        StartParams::Crawl {
            url, max_depth, tags, ..
        } => {
            let parsed = Url::parse(url)
                .map_err(|e| SyncError::Validation(format!("invalid crawl url '{}': {}", url, e)))?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(SyncError::Validation(format!(
                    "crawl url must be http(s): '{}'",
                    url
                )));
            }
            if parsed.host_str().map_or(true, str::is_empty) {
                return Err(SyncError::Validation(format!(
                    "crawl url has no host: '{}'",
                    url
                )));
            }
            if *max_depth == 0 || *max_depth > MAX_CRAWL_DEPTH {
                return Err(SyncError::Validation(format!(
                    "max_depth must be between 1 and {}, got {}",
                    MAX_CRAWL_DEPTH, max_depth
                )));
            }
            validate_tags(tags)
        }
        StartParams::Refresh { source_id } => {
            if source_id.trim().is_empty() {
                return Err(SyncError::Validation("source id must not be empty".to_string()));
            }
            Ok(())
        }
        StartParams::Upload { path, tags, .. } => {
            let meta = tokio::fs::metadata(path).await.map_err(|e| {
                SyncError::Validation(format!("cannot upload '{}': {}", path, e))
            })?;
            if !meta.is_file() {
                return Err(SyncError::Validation(format!("'{}' is not a file", path)));
            }
            if meta.len() == 0 {
                return Err(SyncError::Validation(format!("'{}' is empty", path)));
            }
            validate_tags(tags)
        }
    }
}

fn validate_tags(tags: &[String]) -> SyncResult<()> {
    if tags.iter().any(|t| t.trim().is_empty()) {
        return Err(SyncError::Validation("tags must not be blank".to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use context_sync_core::models::KnowledgeType;

    fn crawl(url: &str, depth: u32) -> StartParams {
        StartParams::Crawl {
            url: url.to_string(),
            knowledge_type: KnowledgeType::Technical,
            tags: vec![],
            max_depth: depth,
        }
    }

    #[tokio::test]
    async fn test_validate_crawl_params() {
        assert!(validate_params(&crawl("https://docs.example.com/guide", 2))
            .await
            .is_ok());
        assert!(validate_params(&crawl("ftp://example.com", 2)).await.is_err());
        assert!(validate_params(&crawl("https://:80/x", 2)).await.is_err());
        assert!(validate_params(&crawl("docs.example.com", 2)).await.is_err());
        assert!(validate_params(&crawl("https://user@docs.example.com:8443/a%20b", 2))
            .await
            .is_ok());
        assert!(validate_params(&crawl("https://example.com", 0)).await.is_err());
        assert!(validate_params(&crawl("https://example.com", 9)).await.is_err());
    }

    #[tokio::test]
    async fn test_validate_upload_requires_readable_file() {
        let tmp = tempfile::TempDir::new().unwrap();
        let empty = tmp.path().join("empty.md");
        std::fs::write(&empty, "").unwrap();
        let doc = tmp.path().join("doc.md");
        std::fs::write(&doc, "# hello").unwrap();

        let upload = |p: &std::path::Path| StartParams::Upload {
            path: p.display().to_string(),
            knowledge_type: KnowledgeType::Technical,
            tags: vec!["notes".to_string()],
        };
        assert!(validate_params(&upload(&doc)).await.is_ok());
        assert!(validate_params(&upload(&empty)).await.is_err());
        assert!(validate_params(&upload(&tmp.path().join("missing.md")))
            .await
            .is_err());
        assert!(validate_params(&upload(tmp.path())).await.is_err());
    }

    #[test]
    fn test_counts_prefers_pages() {
        let mut p = ProgressPayload::new(JobStatus::Crawling, 40.0);
        assert_eq!(counts(&p), None);
        p.counters.insert("processed_pages".into(), 4.into());
        p.counters.insert("total_pages".into(), 10.into());
        assert_eq!(counts(&p), Some((4, 10)));
    }
}
