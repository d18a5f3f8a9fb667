//! # Job Runner
//!
//! Drains a user's eligible jobs sequentially in FIFO order. Each job is
//! claimed atomically, dispatched to its registered handler, and marked
//! terminal; a failing job is recorded with the error tracker and does not
//! stop the drain.

use std::sync::Arc;

use metrics::counter;
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::config::JobsConfig;
use crate::errors::tracker::{ErrorReport, ErrorTracker};
use crate::errors::ErrorProvider;
use crate::jobs::{HandlerRegistry, JobError, JobKind};
use crate::models::job::Model as Job;
use crate::repositories::JobRepository;

/// Outcome of one drain pass.
#[derive(Debug, Clone, Default, Serialize, ToSchema)]
pub struct ProcessOutcome {
    /// Jobs that completed successfully
    pub succeeded: u64,
    /// Jobs that failed terminally
    pub failed: u64,
    /// One message per failed job
    pub errors: Vec<String>,
}

impl ProcessOutcome {
    pub fn processed(&self) -> u64 {
        self.succeeded + self.failed
    }
}

/// Sequential per-user job processor.
#[derive(Clone)]
pub struct JobRunner {
    jobs: JobRepository,
    registry: Arc<HandlerRegistry>,
    tracker: ErrorTracker,
    config: JobsConfig,
}

impl JobRunner {
    pub fn new(
        jobs: JobRepository,
        registry: Arc<HandlerRegistry>,
        tracker: ErrorTracker,
        config: JobsConfig,
    ) -> Self {
        Self {
            jobs,
            registry,
            tracker,
            config,
        }
    }

    /// Claim and execute up to `max_jobs` eligible jobs for the user
    /// (falling back to the configured per-run limit). Jobs run one at a
    /// time in creation order; a failure is recorded and the drain moves on.
    pub async fn process_user_jobs(
        &self,
        user_id: Uuid,
        max_jobs: Option<u64>,
    ) -> Result<ProcessOutcome, sea_orm::DbErr> {
        let limit = max_jobs.unwrap_or(self.config.max_per_run);
        let claimed = self.jobs.claim_eligible(user_id, limit).await?;

        let mut outcome = ProcessOutcome::default();
        if claimed.is_empty() {
            return Ok(outcome);
        }

        tracing::info!(user_id = %user_id, claimed = claimed.len(), "Processing jobs");

        for job in claimed {
            let kind = JobKind::parse(&job.kind);
            match self.execute_one(&job, &kind).await {
                Ok(()) => {
                    if let Err(e) = self.jobs.mark_completed(&job).await {
                        tracing::error!(job_id = %job.id, "Failed to mark job completed: {}", e);
                    }
                    counter!("wellsync_jobs_processed_total", "outcome" => "completed")
                        .increment(1);
                    outcome.succeeded += 1;
                }
                Err(error) => {
                    let message = error.to_string();
                    if let Err(e) = self.jobs.mark_failed(&job, &message).await {
                        tracing::error!(job_id = %job.id, "Failed to mark job failed: {}", e);
                    }
                    counter!("wellsync_jobs_processed_total", "outcome" => "failed").increment(1);

                    tracing::warn!(
                        user_id = %user_id,
                        job_id = %job.id,
                        kind = %kind,
                        "Job failed: {}",
                        message
                    );

                    self.tracker
                        .record_error(
                            user_id,
                            ErrorReport::new(
                                job_provider(&job, &kind),
                                kind.error_stage(),
                                message.clone(),
                            )
                            .with_operation(kind.as_str())
                            .with_batch(job.batch_id),
                        )
                        .await;

                    outcome.errors.push(format!("{} ({}): {}", kind, job.id, message));
                    outcome.failed += 1;
                }
            }
        }

        tracing::info!(
            user_id = %user_id,
            succeeded = outcome.succeeded,
            failed = outcome.failed,
            "Job drain finished"
        );

        Ok(outcome)
    }

    async fn execute_one(&self, job: &Job, kind: &JobKind) -> Result<(), JobError> {
        let Some(handler) = self.registry.get(kind) else {
            return Err(JobError::handler(format!(
                "No handler registered for job kind '{}'",
                kind
            )));
        };

        handler.execute(job).await
    }
}

/// Provider attributed to a failed job: the payload's `provider` field when
/// present, otherwise inferred from the kind.
fn job_provider(job: &Job, kind: &JobKind) -> ErrorProvider {
    if let Some(provider) = job
        .payload
        .get("provider")
        .and_then(|v| v.as_str())
        .and_then(ErrorProvider::parse)
    {
        return provider;
    }

    match kind {
        JobKind::SyncCalendar => ErrorProvider::Calendar,
        _ => ErrorProvider::Gmail,
    }
}
