//! # Jobs API Handlers
//!
//! Handlers for processing a user's job queue and reading its status.

use crate::error::{ApiError, validation_error};
use crate::jobs::runner::ProcessOutcome;
use crate::jobs::status::{JobStatusReport, StatusOptions};
use crate::server::AppState;
use axum::{
    extract::{Path, Query, State},
    response::Json,
};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

const MAX_JOBS_LIMIT: u64 = 100;

/// Query parameters for the process endpoint
#[derive(Debug, Deserialize)]
pub struct ProcessJobsQuery {
    /// Maximum number of jobs to process in this call (1-100, default: 10)
    pub max_jobs: Option<u64>,
}

/// Query parameters for the status endpoint
#[derive(Debug, Deserialize)]
pub struct JobStatusQuery {
    /// Restrict counts and the pending view to one batch
    pub batch_id: Option<Uuid>,
    /// Include the recent-jobs history in the report
    #[serde(default)]
    pub include_history: bool,
    /// Include the data-freshness view in the report
    #[serde(default)]
    pub include_freshness: bool,
}

/// Process up to `max_jobs` pending jobs for the user
#[utoipa::path(
    post,
    path = "/users/{user_id}/jobs/process",
    params(
        ("user_id" = Uuid, Path, description = "User whose queue to drain"),
        ("max_jobs" = Option<u64>, Query, description = "Maximum jobs to process (1-100)")
    ),
    responses(
        (status = 200, description = "Drain outcome", body = ProcessOutcome),
        (status = 400, description = "Invalid max_jobs", body = ApiError)
    ),
    tag = "jobs"
)]
pub async fn process_jobs(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Query(query): Query<ProcessJobsQuery>,
) -> Result<Json<ProcessOutcome>, ApiError> {
    if let Some(max_jobs) = query.max_jobs
        && !(1..=MAX_JOBS_LIMIT).contains(&max_jobs)
    {
        return Err(validation_error(
            "Invalid max_jobs parameter",
            json!({"max_jobs": format!("Must be between 1 and {}", MAX_JOBS_LIMIT)}),
        ));
    }

    let outcome = state.runner.process_user_jobs(user_id, query.max_jobs).await?;

    // A drain invalidates any cached status for the user.
    state.invalidate_status_cache(user_id);

    Ok(Json(outcome))
}

/// Comprehensive job queue status for the user
#[utoipa::path(
    get,
    path = "/users/{user_id}/jobs/status",
    params(
        ("user_id" = Uuid, Path, description = "User to report on"),
        ("batch_id" = Option<Uuid>, Query, description = "Restrict to one batch"),
        ("include_history" = Option<bool>, Query, description = "Include recent jobs"),
        ("include_freshness" = Option<bool>, Query, description = "Include data freshness")
    ),
    responses(
        (status = 200, description = "Status report", body = JobStatusReport)
    ),
    tag = "jobs"
)]
pub async fn job_status(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Query(query): Query<JobStatusQuery>,
) -> Json<JobStatusReport> {
    let options = StatusOptions {
        batch_id: query.batch_id,
        include_history: query.include_history,
        include_freshness: query.include_freshness,
    };

    // Only the plain per-user report is cached; parameterized variants go
    // straight to the aggregator.
    let cacheable =
        options.batch_id.is_none() && !options.include_history && !options.include_freshness;

    if cacheable && let Some(report) = state.status_cache.get(&user_id) {
        return Json(report);
    }

    let report = state.aggregator.comprehensive_status(user_id, options).await;
    if cacheable {
        state.status_cache.insert(user_id, report.clone());
    }

    Json(report)
}
