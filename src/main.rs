//! # Context Sync CLI (`csync`)
//!
//! Drives the synchronization layer from a terminal: start and follow
//! crawl, refresh and upload jobs, and edit projects and tasks with
//! optimistic updates.
//!
//! ## Usage
//!
//! ```bash
//! csync --config ./config/csync.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `csync crawl <url>` | Start a crawl job |
//! | `csync refresh <source-id>` | Re-crawl an existing knowledge source |
//! | `csync upload <path>` | Upload a document for ingestion |
//! | `csync jobs [--watch]` | List (and follow) tracked jobs |
//! | `csync stop <id>` | Cancel a job |
//! | `csync retry <id>` | Re-issue a job with its original parameters |
//! | `csync projects ...` | List, create or delete projects |
//! | `csync tasks ...` | List, create, move or delete tasks |
//! | `csync knowledge list` | List knowledge sources |

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use context_sync::commands::{self, App};
use context_sync::config;
use context_sync::logging;
use context_sync::progress::ProgressMode;
use context_sync_core::models::{KnowledgeType, TaskStatus};

/// Context Sync CLI: client-side state sync for the knowledge base.
#[derive(Parser)]
#[command(
    name = "csync",
    about = "Context Sync: optimistic edits and background job tracking for the knowledge base",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/csync.toml")]
    config: PathBuf,

    /// Progress output on stderr: `human`, `json`, or `off`.
    /// Defaults to `human` when stderr is a terminal.
    #[arg(long, global = true)]
    progress: Option<String>,

    /// Default log level when `CSYNC_LOG` is unset.
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start crawling a URL into the knowledge base.
    Crawl {
        url: String,
        /// `technical` or `business`.
        #[arg(long, default_value = "technical")]
        knowledge_type: KnowledgeType,
        /// Tag to attach; repeatable.
        #[arg(long = "tag")]
        tags: Vec<String>,
        /// Link depth to follow (1-5).
        #[arg(long, default_value_t = 2)]
        max_depth: u32,
        /// Follow the job until it finishes.
        #[arg(long)]
        wait: bool,
    },

    /// Re-crawl an existing knowledge source.
    Refresh {
        source_id: String,
        #[arg(long)]
        wait: bool,
    },

    /// Upload a document for ingestion.
    Upload {
        path: String,
        #[arg(long, default_value = "technical")]
        knowledge_type: KnowledgeType,
        #[arg(long = "tag")]
        tags: Vec<String>,
        #[arg(long)]
        wait: bool,
    },

    /// List tracked jobs. Stale and finished jobs are evicted first.
    Jobs {
        /// Poll until every job has finished.
        #[arg(long)]
        watch: bool,
    },

    /// Cancel a running job.
    Stop { progress_id: String },

    /// Re-issue a job with its original parameters.
    Retry {
        progress_id: String,
        #[arg(long)]
        wait: bool,
    },

    /// Manage projects.
    Projects {
        #[command(subcommand)]
        action: ProjectAction,
    },

    /// Manage the tasks of a project.
    Tasks {
        #[command(subcommand)]
        action: TaskAction,
    },

    /// Inspect the knowledge base.
    Knowledge {
        #[command(subcommand)]
        action: KnowledgeAction,
    },
}

#[derive(Subcommand)]
enum ProjectAction {
    List,
    Create {
        title: String,
        #[arg(long)]
        description: Option<String>,
    },
    Delete {
        id: String,
    },
}

#[derive(Subcommand)]
enum TaskAction {
    List {
        project_id: String,
    },
    Create {
        project_id: String,
        title: String,
        #[arg(long)]
        description: Option<String>,
    },
    /// Move a task to `todo`, `doing`, `review` or `done`.
    SetStatus {
        project_id: String,
        task_id: String,
        status: TaskStatus,
    },
    Delete {
        project_id: String,
        task_id: String,
    },
}

#[derive(Subcommand)]
enum KnowledgeAction {
    List,
}

fn parse_progress(value: Option<&str>) -> anyhow::Result<ProgressMode> {
    match value {
        None => Ok(ProgressMode::default_for_tty()),
        Some("human") => Ok(ProgressMode::Human),
        Some("json") => Ok(ProgressMode::Json),
        Some("off") => Ok(ProgressMode::Off),
        Some(other) => anyhow::bail!("unknown progress mode '{}': expected human, json or off", other),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(&cli.log_level);

    let progress = parse_progress(cli.progress.as_deref())?;
    let cfg = config::load_config(&cli.config)?;
    let app = App::open(cfg, progress).await?;

    match cli.command {
        Commands::Crawl {
            url,
            knowledge_type,
            tags,
            max_depth,
            wait,
        } => {
            commands::run_crawl(&app, url, knowledge_type, tags, max_depth, wait).await?;
        }
        Commands::Refresh { source_id, wait } => {
            commands::run_refresh(&app, source_id, wait).await?;
        }
        Commands::Upload {
            path,
            knowledge_type,
            tags,
            wait,
        } => {
            commands::run_upload(&app, path, knowledge_type, tags, wait).await?;
        }
        Commands::Jobs { watch } => {
            commands::run_jobs(&app, watch).await?;
        }
        Commands::Stop { progress_id } => {
            commands::run_stop(&app, &progress_id).await?;
        }
        Commands::Retry { progress_id, wait } => {
            commands::run_retry(&app, &progress_id, wait).await?;
        }
        Commands::Projects { action } => match action {
            ProjectAction::List => commands::run_projects_list(&app).await?,
            ProjectAction::Create { title, description } => {
                commands::run_projects_create(&app, title, description).await?
            }
            ProjectAction::Delete { id } => commands::run_projects_delete(&app, &id).await?,
        },
        Commands::Tasks { action } => match action {
            TaskAction::List { project_id } => commands::run_tasks_list(&app, &project_id).await?,
            TaskAction::Create {
                project_id,
                title,
                description,
            } => commands::run_tasks_create(&app, &project_id, title, description).await?,
            TaskAction::SetStatus {
                project_id,
                task_id,
                status,
            } => commands::run_tasks_set_status(&app, &project_id, &task_id, status).await?,
            TaskAction::Delete {
                project_id,
                task_id,
            } => commands::run_tasks_delete(&app, &project_id, &task_id).await?,
        },
        Commands::Knowledge { action } => match action {
            KnowledgeAction::List => commands::run_knowledge_list(&app).await?,
        },
    }

    Ok(())
}
