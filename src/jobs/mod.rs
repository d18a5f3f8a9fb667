//! Background job primitives: kinds, lifecycle states, and the handler
//! registry the runner dispatches through.

pub mod runner;
pub mod status;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::errors::ErrorStage;
use crate::models::job::Model as Job;

/// Kind of work a job represents. Kinds unknown to this build are carried
/// through as [`JobKind::Other`] so new producers don't break consumers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum JobKind {
    Normalize,
    Embed,
    Insight,
    SyncGmail,
    SyncCalendar,
    GoogleGmailSync,
    Other(String),
}

impl JobKind {
    /// Canonical string representation, as stored in the jobs table.
    pub fn as_str(&self) -> &str {
        match self {
            JobKind::Normalize => "normalize",
            JobKind::Embed => "embed",
            JobKind::Insight => "insight",
            JobKind::SyncGmail => "sync_gmail",
            JobKind::SyncCalendar => "sync_calendar",
            JobKind::GoogleGmailSync => "google_gmail_sync",
            JobKind::Other(kind) => kind,
        }
    }

    /// Parse a stored kind string; never fails.
    pub fn parse(raw: &str) -> Self {
        match raw {
            "normalize" => JobKind::Normalize,
            "embed" => JobKind::Embed,
            "insight" => JobKind::Insight,
            "sync_gmail" => JobKind::SyncGmail,
            "sync_calendar" => JobKind::SyncCalendar,
            "google_gmail_sync" => JobKind::GoogleGmailSync,
            other => JobKind::Other(other.to_string()),
        }
    }

    /// Estimated duration in seconds, used only for ETA computation, never
    /// for scheduling. Unknown kinds default to 5s.
    pub fn estimated_duration_secs(&self) -> i64 {
        match self {
            JobKind::Normalize => 2,
            JobKind::Embed => 5,
            JobKind::Insight => 10,
            JobKind::SyncCalendar => 20,
            JobKind::SyncGmail => 30,
            JobKind::GoogleGmailSync => 30,
            JobKind::Other(_) => 5,
        }
    }

    /// Pipeline stage reported to the error tracker when a job of this kind
    /// fails.
    pub fn error_stage(&self) -> ErrorStage {
        match self {
            JobKind::Normalize => ErrorStage::Normalization,
            JobKind::SyncGmail | JobKind::SyncCalendar | JobKind::GoogleGmailSync => {
                ErrorStage::Ingestion
            }
            _ => ErrorStage::Processing,
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of a job.
///
/// `queued → processing → {completed | failed | retrying}` with
/// `retrying → processing` re-entry. `completed` and `failed` are terminal
/// (a failed job re-enters only via an explicit operator retry decision).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
    Retrying,
}

impl JobStatus {
    pub const ALL: [JobStatus; 5] = [
        JobStatus::Queued,
        JobStatus::Processing,
        JobStatus::Completed,
        JobStatus::Failed,
        JobStatus::Retrying,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Retrying => "retrying",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "queued" => Some(JobStatus::Queued),
            "processing" => Some(JobStatus::Processing),
            "completed" => Some(JobStatus::Completed),
            "failed" => Some(JobStatus::Failed),
            "retrying" => Some(JobStatus::Retrying),
            _ => None,
        }
    }

    /// States eligible for dequeue by the runner.
    pub fn is_dequeue_eligible(self) -> bool {
        matches!(self, JobStatus::Queued | JobStatus::Retrying)
    }

    /// Pending means not yet terminal: queued, processing, or retrying.
    pub fn is_pending(self) -> bool {
        matches!(
            self,
            JobStatus::Queued | JobStatus::Processing | JobStatus::Retrying
        )
    }

    /// Whether a transition from `self` to `next` follows the state machine.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Queued, JobStatus::Processing)
                | (JobStatus::Retrying, JobStatus::Processing)
                | (JobStatus::Processing, JobStatus::Completed)
                | (JobStatus::Processing, JobStatus::Failed)
                | (JobStatus::Processing, JobStatus::Retrying)
                | (JobStatus::Failed, JobStatus::Retrying)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error surfaced by a job handler.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("{0}")]
    Handler(String),
    #[error(transparent)]
    Db(#[from] sea_orm::DbErr),
}

impl JobError {
    pub fn handler<S: Into<String>>(message: S) -> Self {
        JobError::Handler(message.into())
    }
}

/// Kind-specific job execution logic. One handler per kind; failures are
/// signalled by returning an error.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn execute(&self, job: &Job) -> Result<(), JobError>;
}

/// Registry mapping job kinds to their handlers.
#[derive(Default, Clone)]
pub struct HandlerRegistry {
    handlers: BTreeMap<String, Arc<dyn JobHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for the given kind, replacing any existing one.
    pub fn register(&mut self, kind: JobKind, handler: Arc<dyn JobHandler>) {
        self.handlers.insert(kind.as_str().to_string(), handler);
    }

    /// Look up the handler for a kind.
    pub fn get(&self, kind: &JobKind) -> Option<Arc<dyn JobHandler>> {
        self.handlers.get(kind.as_str()).cloned()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
