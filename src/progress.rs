//! Job progress reporting.
//!
//! Reports observable job progress while `csync` waits on crawls, refreshes
//! and uploads. Progress is emitted on **stderr** so stdout remains parseable
//! for scripts.

use std::io::Write;

use context_sync_core::job::Termination;
use context_sync_core::models::{JobKind, JobStatus};

/// A single progress event for a tracked job.
#[derive(Clone, Debug, PartialEq)]
pub enum JobEvent {
    /// The start call returned and the job is being tracked.
    Started {
        progress_id: String,
        kind: JobKind,
        label: String,
    },
    /// A poll returned a non-terminal status.
    Progress {
        progress_id: String,
        status: JobStatus,
        percent: f64,
        /// `(processed, total)` when the server reports page counters.
        counts: Option<(u64, u64)>,
        message: Option<String>,
    },
    /// The job left the active set.
    Finished {
        progress_id: String,
        termination: Termination,
    },
}

/// Reports job progress. Implementations write to stderr (human or JSON).
pub trait JobProgressReporter: Send + Sync {
    fn report(&self, event: &JobEvent);
}

/// Human-friendly progress on stderr: "job p1  crawling  40%  1,234 / 5,000".
pub struct StderrProgress;

impl JobProgressReporter for StderrProgress {
    fn report(&self, event: &JobEvent) {
        let line = match event {
            JobEvent::Started {
                progress_id,
                kind,
                label,
            } => format!("job {}  started {} {}\n", progress_id, kind, label),
            JobEvent::Progress {
                progress_id,
                status,
                percent,
                counts,
                message,
            } => {
                let mut line = format!("job {}  {}  {:.0}%", progress_id, status, percent);
                if let Some((n, total)) = counts {
                    line.push_str(&format!("  {} / {}", format_number(*n), format_number(*total)));
                }
                if let Some(message) = message {
                    line.push_str("  ");
                    line.push_str(message);
                }
                line.push('\n');
                line
            }
            JobEvent::Finished {
                progress_id,
                termination,
            } => match termination {
                Termination::Failed { message } => {
                    format!("job {}  failed: {}\n", progress_id, message)
                }
                other => format!("job {}  {}\n", progress_id, other.label()),
            },
        };
        let mut stderr = std::io::stderr().lock();
        let _ = stderr.write_all(line.as_bytes());
        let _ = stderr.flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl JobProgressReporter for JsonProgress {
    fn report(&self, event: &JobEvent) {
        if let Ok(line) = serde_json::to_string(&event_json(event)) {
            let mut stderr = std::io::stderr().lock();
            let _ = writeln!(stderr, "{}", line);
            let _ = stderr.flush();
        }
    }
}

fn event_json(event: &JobEvent) -> serde_json::Value {
    match event {
        JobEvent::Started {
            progress_id,
            kind,
            label,
        } => serde_json::json!({
            "event": "started",
            "progress_id": progress_id,
            "kind": kind,
            "label": label,
        }),
        JobEvent::Progress {
            progress_id,
            status,
            percent,
            counts,
            message,
        } => serde_json::json!({
            "event": "progress",
            "progress_id": progress_id,
            "status": status,
            "percent": percent,
            "n": counts.map(|c| c.0),
            "total": counts.map(|c| c.1),
            "message": message,
        }),
        JobEvent::Finished {
            progress_id,
            termination,
        } => {
            let message = match termination {
                Termination::Failed { message } => Some(message.as_str()),
                _ => None,
            };
            serde_json::json!({
                "event": "finished",
                "progress_id": progress_id,
                "outcome": termination.label(),
                "message": message,
            })
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl JobProgressReporter for NoProgress {
    fn report(&self, _event: &JobEvent) {}
}

pub(crate) fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn reporter(&self) -> std::sync::Arc<dyn JobProgressReporter> {
        match self {
            ProgressMode::Off => std::sync::Arc::new(NoProgress),
            ProgressMode::Human => std::sync::Arc::new(StderrProgress),
            ProgressMode::Json => std::sync::Arc::new(JsonProgress),
        }
    }
}
