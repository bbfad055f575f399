//! CLI command implementations.
//!
//! Each `run_*` function backs one `csync` subcommand. Data goes to stdout,
//! progress and logs to stderr.

use std::sync::Arc;

use anyhow::{Context, Result};
use context_sync_core::clock::SystemClock;
use context_sync_core::entity_cache::EntityCache;
use context_sync_core::models::{KnowledgeType, Project, StartParams, Task, TaskStatus};
use context_sync_core::optimistic::Tracked;
use tokio_util::sync::CancellationToken;

use crate::api::KnowledgeApi;
use crate::config::Config;
use crate::fs_store::FileKvStore;
use crate::mutation::{Collection, CollectionSpec};
use crate::progress::ProgressMode;
use crate::revalidate::RevalidatingClient;
use crate::tracker::{JobTracker, JobView, RecoveryReport, TrackerSettings};
use crate::transport::ReqwestTransport;

/// Everything a command needs, wired from the configuration.
pub struct App {
    pub config: Config,
    pub client: Arc<RevalidatingClient>,
    pub api: Arc<KnowledgeApi>,
    pub cache: Arc<EntityCache>,
    pub tracker: JobTracker,
}

impl App {
    pub async fn open(config: Config, progress: ProgressMode) -> Result<Self> {
        let transport = ReqwestTransport::new(config.request_timeout())
            .context("Failed to build HTTP client")?;
        let client = Arc::new(RevalidatingClient::new(
            Arc::new(transport),
            &config.server.base_url,
            config.request_timeout(),
        ));
        let api = Arc::new(KnowledgeApi::new(client.clone()));
        let cache = Arc::new(EntityCache::new());
        let kv = FileKvStore::open(&config.storage.dir).await?;
        let tracker = JobTracker::new(
            api.clone(),
            Arc::new(kv),
            cache.clone(),
            Arc::new(SystemClock),
            TrackerSettings::from_config(&config),
        )
        .with_reporter(progress.reporter());

        Ok(Self {
            config,
            client,
            api,
            cache,
            tracker,
        })
    }

    /// Reload persisted jobs. Every job command starts here.
    pub async fn recover(&self) -> Result<RecoveryReport> {
        let report = self
            .tracker
            .recover()
            .await
            .context("Failed to recover persisted jobs")?;
        Ok(report)
    }

    fn projects(&self) -> Collection<Project> {
        Collection::new(CollectionSpec::projects(), self.client.clone(), self.cache.clone())
    }

    fn tasks(&self, project_id: &str) -> Collection<Task> {
        Collection::new(
            CollectionSpec::project_tasks(project_id),
            self.client.clone(),
            self.cache.clone(),
        )
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Jobs
// ═══════════════════════════════════════════════════════════════════════

pub async fn run_crawl(
    app: &App,
    url: String,
    knowledge_type: KnowledgeType,
    tags: Vec<String>,
    max_depth: u32,
    wait: bool,
) -> Result<()> {
    let params = StartParams::Crawl {
        url,
        knowledge_type,
        tags,
        max_depth,
    };
    start_job(app, params, wait).await
}

pub async fn run_refresh(app: &App, source_id: String, wait: bool) -> Result<()> {
    start_job(app, StartParams::Refresh { source_id }, wait).await
}

pub async fn run_upload(
    app: &App,
    path: String,
    knowledge_type: KnowledgeType,
    tags: Vec<String>,
    wait: bool,
) -> Result<()> {
    let params = StartParams::Upload {
        path,
        knowledge_type,
        tags,
    };
    start_job(app, params, wait).await
}

async fn start_job(app: &App, params: StartParams, wait: bool) -> Result<()> {
    app.recover().await?;
    let handle = app.tracker.start(params).await?;
    println!("{}", handle.progress_id);
    if wait {
        wait_for_jobs(app).await;
        print_finished(app);
    }
    Ok(())
}

/// List persisted jobs, after recovery has evicted dead ones. With `watch`,
/// poll until every job has finished.
pub async fn run_jobs(app: &App, watch: bool) -> Result<()> {
    let report = app.recover().await?;
    let evicted = report.evicted_terminal.len() + report.evicted_stale.len() + report.gone.len();
    if evicted > 0 {
        eprintln!("Removed {} finished or stale job(s).", evicted);
    }

    let snapshot = app.tracker.snapshot();
    if snapshot.active.is_empty() && snapshot.finished.is_empty() {
        println!("No active jobs.");
        return Ok(());
    }
    print_jobs(&snapshot.active, &snapshot.finished);

    if watch && !snapshot.active.is_empty() {
        wait_for_jobs(app).await;
        print_finished(app);
    }
    Ok(())
}

pub async fn run_stop(app: &App, progress_id: &str) -> Result<()> {
    app.recover().await?;
    app.tracker
        .stop(progress_id)
        .await
        .with_context(|| format!("Cannot stop job {}", progress_id))?;
    println!("Cancelled {}", progress_id);
    Ok(())
}

pub async fn run_retry(app: &App, progress_id: &str, wait: bool) -> Result<()> {
    app.recover().await?;
    let handle = app
        .tracker
        .retry_persisted(progress_id)
        .await
        .with_context(|| format!("Cannot retry job {}", progress_id))?;
    println!("{}", handle.progress_id);
    if wait {
        wait_for_jobs(app).await;
        print_finished(app);
    }
    Ok(())
}

async fn wait_for_jobs(app: &App) {
    let shutdown = CancellationToken::new();
    let on_signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_signal.cancel();
        }
    });
    app.tracker.run_until_idle(shutdown).await;
}

fn print_jobs(active: &[JobView], finished: &[JobView]) {
    println!(
        "{:<38} {:<8} {:<16} {:>5}  LABEL",
        "PROGRESS ID", "KIND", "STATUS", "%"
    );
    for view in active.iter().chain(finished.iter()) {
        let status = match &view.termination {
            Some(t) => t.label().to_string(),
            None => view.status.to_string(),
        };
        println!(
            "{:<38} {:<8} {:<16} {:>5.0}  {}",
            view.progress_id,
            view.kind.to_string(),
            status,
            view.percent,
            view.label
        );
    }
}

fn print_finished(app: &App) {
    for view in app.tracker.snapshot().finished {
        match &view.termination {
            Some(context_sync_core::job::Termination::Failed { message }) => {
                println!("{}  failed: {}", view.progress_id, message)
            }
            Some(t) => println!("{}  {}", view.progress_id, t.label()),
            None => {}
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Projects & tasks
// ═══════════════════════════════════════════════════════════════════════

pub async fn run_projects_list(app: &App) -> Result<()> {
    let projects = app.projects().refresh().await?;
    println!("{:<38} {:<6} TITLE", "ID", "PINNED");
    for tracked in &projects {
        let p = &tracked.entity;
        println!(
            "{:<38} {:<6} {}",
            display_id(tracked),
            if p.pinned { "yes" } else { "" },
            p.title
        );
    }
    Ok(())
}

pub async fn run_projects_create(app: &App, title: String, description: Option<String>) -> Result<()> {
    let mut draft = Project::draft(title);
    draft.description = description.unwrap_or_default();
    let created = app.projects().create(draft).await?;
    println!("{}", created.id.unwrap_or_default());
    Ok(())
}

pub async fn run_projects_delete(app: &App, id: &str) -> Result<()> {
    app.projects().delete(id).await?;
    println!("Deleted project {}", id);
    Ok(())
}

pub async fn run_tasks_list(app: &App, project_id: &str) -> Result<()> {
    let tasks = app.tasks(project_id).refresh().await?;
    println!("{:<38} {:<7} TITLE", "ID", "STATUS");
    for tracked in &tasks {
        let t = &tracked.entity;
        let status = serde_json::to_value(t.status)?;
        println!(
            "{:<38} {:<7} {}",
            display_id(tracked),
            status.as_str().unwrap_or_default(),
            t.title
        );
    }
    Ok(())
}

pub async fn run_tasks_create(
    app: &App,
    project_id: &str,
    title: String,
    description: Option<String>,
) -> Result<()> {
    let mut draft = Task::draft(project_id, title);
    draft.description = description.unwrap_or_default();
    let created = app.tasks(project_id).create(draft).await?;
    println!("{}", created.id.unwrap_or_default());
    Ok(())
}

pub async fn run_tasks_set_status(
    app: &App,
    project_id: &str,
    task_id: &str,
    status: TaskStatus,
) -> Result<()> {
    let tasks = app.tasks(project_id);
    let current = tasks
        .refresh()
        .await?
        .into_iter()
        .find(|t| t.entity.id.as_deref() == Some(task_id))
        .with_context(|| format!("Task {} not found in project {}", task_id, project_id))?;
    let mut draft = current.entity;
    draft.status = status;
    tasks.update(task_id, draft).await?;
    println!("Updated task {}", task_id);
    Ok(())
}

pub async fn run_tasks_delete(app: &App, project_id: &str, task_id: &str) -> Result<()> {
    app.tasks(project_id).delete(task_id).await?;
    println!("Deleted task {}", task_id);
    Ok(())
}

pub async fn run_knowledge_list(app: &App) -> Result<()> {
    let items = app.api.list_items().await?;
    println!("{:<38} {:<10} TITLE", "SOURCE ID", "TYPE");
    for item in items {
        let kind = serde_json::to_value(item.knowledge_type)?;
        println!(
            "{:<38} {:<10} {}",
            item.source_id,
            kind.as_str().unwrap_or_default(),
            item.title
        );
    }
    Ok(())
}

fn display_id<T: context_sync_core::models::Entity>(tracked: &Tracked<T>) -> String {
    match (tracked.entity.id(), &tracked.local_id) {
        (Some(id), _) => id.to_string(),
        (None, Some(local)) => local.to_string(),
        (None, None) => "-".to_string(),
    }
}
