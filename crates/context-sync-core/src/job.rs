//! Per-job state machine.
//!
//! A [`JobMachine`] wraps one [`JobHandle`] together with the bookkeeping
//! the tracker needs to decide when a job is over:
//!
//! ```text
//!            progress                    terminal status
//! starting ───────────▶ crawling/... ─────────────────────▶ completed | failed | cancelled
//!     │                      │
//!     └──── not found × N ───┴──────────────────────────────▶ gone
//! ```
//!
//! Not-found responses only count when they arrive back to back; any
//! successful progress read resets the streak. Transient errors neither
//! count nor reset.

use chrono::{DateTime, Duration, Utc};

use crate::models::{JobHandle, JobStatus, ProgressPayload};

/// How a job left the active set.
#[derive(Debug, Clone, PartialEq)]
pub enum Termination {
    Completed,
    Failed { message: String },
    Cancelled,
    /// The server no longer knows the job. Not a domain failure.
    Gone,
}

impl Termination {
    pub fn label(&self) -> &'static str {
        match self {
            Termination::Completed => "completed",
            Termination::Failed { .. } => "failed",
            Termination::Cancelled => "cancelled",
            Termination::Gone => "gone",
        }
    }
}

/// Result of feeding one observation into the machine.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// Still running; progress merged.
    Progressed(JobStatus),
    /// Another not-found inside the grace window.
    NotFoundTolerated { streak: u32 },
    /// Reached a terminal state for the first time.
    Terminated(Termination),
    /// The machine was already terminal; nothing changed.
    Ignored,
}

/// Why a persisted handle is not worth resuming.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Abandoned {
    Terminal,
    Stale,
}

#[derive(Debug, Clone)]
pub struct JobMachine {
    handle: JobHandle,
    not_found_streak: u32,
    termination: Option<Termination>,
    terminated_at: Option<DateTime<Utc>>,
    completion_handled: bool,
}

impl JobMachine {
    pub fn new(handle: JobHandle) -> Self {
        Self {
            handle,
            not_found_streak: 0,
            termination: None,
            terminated_at: None,
            completion_handled: false,
        }
    }

    pub fn handle(&self) -> &JobHandle {
        &self.handle
    }

    pub fn into_handle(self) -> JobHandle {
        self.handle
    }

    pub fn progress_id(&self) -> &str {
        &self.handle.progress_id
    }

    pub fn not_found_streak(&self) -> u32 {
        self.not_found_streak
    }

    pub fn termination(&self) -> Option<&Termination> {
        self.termination.as_ref()
    }

    pub fn terminated_at(&self) -> Option<DateTime<Utc>> {
        self.terminated_at
    }

    pub fn is_terminal(&self) -> bool {
        self.termination.is_some()
    }

    /// Merge a progress payload into the handle.
    pub fn apply_progress(&mut self, payload: ProgressPayload, now: DateTime<Utc>) -> Transition {
        if self.is_terminal() {
            return Transition::Ignored;
        }
        self.not_found_streak = 0;
        let status = payload.status;
        let failure = payload
            .error
            .clone()
            .or_else(|| payload.message.clone())
            .unwrap_or_else(|| "job failed".to_string());
        self.handle.status = status;
        self.handle.last_progress = Some(payload);

        match status {
            JobStatus::Completed => self.terminate(Termination::Completed, now),
            JobStatus::Failed => self.terminate(Termination::Failed { message: failure }, now),
            JobStatus::Cancelled => self.terminate(Termination::Cancelled, now),
            other => Transition::Progressed(other),
        }
    }

    /// Count a not-found response. The job is force-terminated as
    /// [`Termination::Gone`] on exactly the `threshold`-th consecutive one.
    pub fn record_not_found(&mut self, threshold: u32, now: DateTime<Utc>) -> Transition {
        if self.is_terminal() {
            return Transition::Ignored;
        }
        self.not_found_streak += 1;
        if self.not_found_streak >= threshold.max(1) {
            self.terminate(Termination::Gone, now)
        } else {
            Transition::NotFoundTolerated {
                streak: self.not_found_streak,
            }
        }
    }

    /// Local, optimistic cancellation.
    pub fn cancel(&mut self, now: DateTime<Utc>) -> Transition {
        if self.is_terminal() {
            return Transition::Ignored;
        }
        self.handle.status = JobStatus::Cancelled;
        self.terminate(Termination::Cancelled, now)
    }

    /// Claim the completion side effects. Returns `true` only for the first
    /// caller after the job completed.
    pub fn claim_completion(&mut self) -> bool {
        if self.termination != Some(Termination::Completed) || self.completion_handled {
            return false;
        }
        self.completion_handled = true;
        true
    }

    /// Whether a finished job has been on display for longer than `linger`.
    pub fn linger_elapsed(&self, now: DateTime<Utc>, linger: Duration) -> bool {
        match self.terminated_at {
            Some(at) => now - at >= linger,
            None => false,
        }
    }

    fn terminate(&mut self, termination: Termination, now: DateTime<Utc>) -> Transition {
        self.termination = Some(termination.clone());
        self.terminated_at = Some(now);
        Transition::Terminated(termination)
    }
}

/// Decide whether a handle loaded from storage should be dropped without
/// contacting the server.
pub fn abandoned(handle: &JobHandle, now: DateTime<Utc>, stale_after: Duration) -> Option<Abandoned> {
    if handle.status.is_terminal() {
        return Some(Abandoned::Terminal);
    }
    if now - handle.started_at > stale_after {
        return Some(Abandoned::Stale);
    }
    None
}
