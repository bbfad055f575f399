//! Core data models shared by the mutation engine, job tracker and caches.
//!
//! Entities are server-owned records mirrored on the client. Job types
//! describe long-running server operations (crawls and uploads) observed
//! through the progress endpoint.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A server-owned record that can live in an optimistic collection.
///
/// `id` is `None` until the server has confirmed the record.
pub trait Entity: Clone + Send + Sync + 'static {
    /// Server identity, absent on drafts.
    fn id(&self) -> Option<&str>;

    /// Last server-side modification, used to pick the freshest copy when
    /// two confirmed copies of one entity meet.
    fn updated_at(&self) -> Option<DateTime<Utc>> {
        None
    }

    /// Client-side validation run before any network call.
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}

/// A project in the dashboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub pinned: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Project {
    pub fn draft(title: impl Into<String>) -> Self {
        Self {
            id: None,
            title: title.into(),
            description: String::new(),
            pinned: false,
            created_at: None,
            updated_at: None,
        }
    }
}

impl Entity for Project {
    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    fn validate(&self) -> Result<(), String> {
        if self.title.trim().is_empty() {
            return Err("project title must not be empty".to_string());
        }
        Ok(())
    }
}

/// Workflow column of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    #[default]
    Todo,
    Doing,
    Review,
    Done,
}

impl std::str::FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "todo" => Ok(Self::Todo),
            "doing" => Ok(Self::Doing),
            "review" => Ok(Self::Review),
            "done" => Ok(Self::Done),
            other => Err(format!(
                "unknown task status '{}': expected todo, doing, review, or done",
                other
            )),
        }
    }
}

/// A task belonging to a project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub project_id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee: Option<String>,
    #[serde(default)]
    pub task_order: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Task {
    pub fn draft(project_id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: None,
            project_id: project_id.into(),
            title: title.into(),
            description: String::new(),
            status: TaskStatus::Todo,
            assignee: None,
            task_order: 0,
            updated_at: None,
        }
    }
}

impl Entity for Task {
    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    fn validate(&self) -> Result<(), String> {
        if self.title.trim().is_empty() {
            return Err("task title must not be empty".to_string());
        }
        if self.project_id.trim().is_empty() {
            return Err("task must belong to a project".to_string());
        }
        Ok(())
    }
}

/// A knowledge source produced by a crawl or an upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeItem {
    pub source_id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default)]
    pub knowledge_type: KnowledgeType,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Entity for KnowledgeItem {
    fn id(&self) -> Option<&str> {
        Some(&self.source_id)
    }

    fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }
}

/// Classification attached to ingested knowledge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum KnowledgeType {
    #[default]
    Technical,
    Business,
}

impl std::str::FromStr for KnowledgeType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "technical" => Ok(Self::Technical),
            "business" => Ok(Self::Business),
            other => Err(format!(
                "unknown knowledge type '{}': expected technical or business",
                other
            )),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Jobs
// ═══════════════════════════════════════════════════════════════════════

/// Which kind of background job a handle tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    /// Crawl a new URL into the knowledge base.
    Crawl,
    /// Re-crawl an existing knowledge source.
    Refresh,
    /// Upload and ingest a document.
    Upload,
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobKind::Crawl => "crawl",
            JobKind::Refresh => "refresh",
            JobKind::Upload => "upload",
        };
        f.write_str(s)
    }
}

/// Server-reported job status.
///
/// `Starting` is the only initial state. `Completed`, `Failed` and
/// `Cancelled` are terminal. Any status string the client does not know is
/// kept as `Working` so new server phases never break polling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Starting,
    Analyzing,
    Crawling,
    Reading,
    Processing,
    SourceCreation,
    DocumentStorage,
    CodeExtraction,
    Finalization,
    Completed,
    Failed,
    Cancelled,
    Working,
}

impl JobStatus {
    /// Parse a server status string. `error` is the server's spelling of a
    /// failure and `stopping`/`stopped` of a cancellation.
    pub fn parse(s: &str) -> Self {
        match s {
            "starting" | "pending" => JobStatus::Starting,
            "analyzing" => JobStatus::Analyzing,
            "crawling" => JobStatus::Crawling,
            "reading" => JobStatus::Reading,
            "processing" => JobStatus::Processing,
            "source_creation" => JobStatus::SourceCreation,
            "document_storage" => JobStatus::DocumentStorage,
            "code_extraction" => JobStatus::CodeExtraction,
            "finalization" => JobStatus::Finalization,
            "completed" | "complete" => JobStatus::Completed,
            "failed" | "error" => JobStatus::Failed,
            "cancelled" | "stopping" | "stopped" => JobStatus::Cancelled,
            _ => JobStatus::Working,
        }
    }
}

impl Serialize for JobStatus {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for JobStatus {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(JobStatus::parse(&s))
    }
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Starting => "starting",
            JobStatus::Analyzing => "analyzing",
            JobStatus::Crawling => "crawling",
            JobStatus::Reading => "reading",
            JobStatus::Processing => "processing",
            JobStatus::SourceCreation => "source_creation",
            JobStatus::DocumentStorage => "document_storage",
            JobStatus::CodeExtraction => "code_extraction",
            JobStatus::Finalization => "finalization",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
            JobStatus::Working => "working",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One progress report from `GET /api/progress/{id}`.
///
/// Domain-specific counters (`processed_pages`, `total_pages`,
/// `chunks_stored`, ...) are kept verbatim in `counters`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressPayload {
    pub status: JobStatus,
    #[serde(default)]
    pub progress: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default)]
    pub logs: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(flatten)]
    pub counters: serde_json::Map<String, serde_json::Value>,
}

impl ProgressPayload {
    pub fn new(status: JobStatus, progress: f64) -> Self {
        Self {
            status,
            progress,
            message: None,
            logs: Vec::new(),
            error: None,
            counters: serde_json::Map::new(),
        }
    }

    /// Progress clamped to `0..=100`.
    pub fn percent(&self) -> f64 {
        if self.progress.is_nan() {
            0.0
        } else {
            self.progress.clamp(0.0, 100.0)
        }
    }

    /// Read an integer counter such as `processed_pages`.
    pub fn counter(&self, name: &str) -> Option<u64> {
        self.counters.get(name).and_then(|v| v.as_u64())
    }
}

/// The request that started a job, kept so the job can be retried.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StartParams {
    Crawl {
        url: String,
        #[serde(default)]
        knowledge_type: KnowledgeType,
        #[serde(default)]
        tags: Vec<String>,
        max_depth: u32,
    },
    Refresh {
        source_id: String,
    },
    Upload {
        /// Local path of the file; re-read on retry.
        path: String,
        #[serde(default)]
        knowledge_type: KnowledgeType,
        #[serde(default)]
        tags: Vec<String>,
    },
}

impl StartParams {
    pub fn kind(&self) -> JobKind {
        match self {
            StartParams::Crawl { .. } => JobKind::Crawl,
            StartParams::Refresh { .. } => JobKind::Refresh,
            StartParams::Upload { .. } => JobKind::Upload,
        }
    }

    /// Short human label: the URL, the source id, or the file name.
    pub fn label(&self) -> &str {
        match self {
            StartParams::Crawl { url, .. } => url,
            StartParams::Refresh { source_id } => source_id,
            StartParams::Upload { path, .. } => path
                .rsplit(['/', '\\'])
                .next()
                .unwrap_or(path.as_str()),
        }
    }
}

/// Client-side record of one in-flight background job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobHandle {
    pub progress_id: String,
    pub kind: JobKind,
    pub status: JobStatus,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_progress: Option<ProgressPayload>,
    pub original_params: StartParams,
}

impl JobHandle {
    pub fn new(progress_id: String, params: StartParams, started_at: DateTime<Utc>) -> Self {
        Self {
            progress_id,
            kind: params.kind(),
            status: JobStatus::Starting,
            started_at,
            last_progress: None,
            original_params: params,
        }
    }

    pub fn percent(&self) -> f64 {
        self.last_progress
            .as_ref()
            .map(|p| p.percent())
            .unwrap_or(0.0)
    }
}

/// HTTP method, as far as the caches care about it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Method {
    Get,
    Head,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    /// Idempotent reads are the only calls that use validators.
    pub fn is_read(self) -> bool {
        matches!(self, Method::Get | Method::Head)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
