//! # Errors API Handlers
//!
//! Handlers over the error tracker: summary, retryables, acknowledge,
//! resolve, retry recording, and retention cleanup.

use crate::error::{ApiError, validation_error};
use crate::errors::tracker::{ErrorSummary, ErrorSummaryEntry, ErrorTracker};
use crate::errors::{ErrorProvider, ErrorStage};
use crate::repositories::ErrorSummaryFilter;
use crate::server::AppState;
use axum::{
    extract::{Path, Query, State},
    response::Json,
};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use utoipa::ToSchema;
use uuid::Uuid;

const SUMMARY_SCAN_LIMIT: u64 = 500;
const RETRYABLE_LIMIT: u64 = 50;

/// Query parameters for the error summary endpoint
#[derive(Debug, Deserialize)]
pub struct ErrorSummaryQuery {
    /// Include resolved and acknowledged records
    #[serde(default)]
    pub include_resolved: bool,
    /// Only records created within the last N hours
    pub time_range_hours: Option<i64>,
    /// Filter by provider (gmail, calendar, drive)
    pub provider: Option<String>,
    /// Filter by stage (ingestion, normalization, processing)
    pub stage: Option<String>,
}

/// Query parameters for the retryable errors endpoint
#[derive(Debug, Deserialize)]
pub struct RetryableQuery {
    /// Filter by provider (gmail, calendar, drive)
    pub provider: Option<String>,
}

/// Request body for resolving an error
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct ResolveRequest {
    /// How the error was resolved (free-form label)
    pub resolution_method: Option<String>,
}

/// Request body for recording a retry attempt
#[derive(Debug, Deserialize, ToSchema)]
pub struct RetryAttemptRequest {
    /// Whether the retry succeeded
    pub success: bool,
    /// Failure details when it did not
    pub details: Option<String>,
}

/// Query parameters for the cleanup endpoint
#[derive(Debug, Deserialize)]
pub struct CleanupQuery {
    /// Override the configured retention window in days
    pub retention_days: Option<i64>,
}

/// Outcome of a single-record mutation
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorUpdateResponse {
    /// Whether the record was updated
    pub updated: bool,
}

/// Outcome of a cleanup run
#[derive(Debug, Serialize, ToSchema)]
pub struct CleanupResponse {
    /// Number of records deleted
    pub deleted: u64,
}

/// One retryable error record
#[derive(Debug, Serialize, ToSchema)]
pub struct RetryableResponse {
    pub errors: Vec<ErrorSummaryEntry>,
}

fn parse_provider(raw: &Option<String>) -> Result<Option<ErrorProvider>, ApiError> {
    match raw {
        None => Ok(None),
        Some(value) => ErrorProvider::parse(value).map(Some).ok_or_else(|| {
            validation_error(
                "Invalid provider",
                json!({"provider": "Must be one of: gmail, calendar, drive"}),
            )
        }),
    }
}

/// Aggregated error summary for the user
#[utoipa::path(
    get,
    path = "/users/{user_id}/errors/summary",
    params(
        ("user_id" = Uuid, Path, description = "User to report on"),
        ("include_resolved" = Option<bool>, Query, description = "Include closed records"),
        ("time_range_hours" = Option<i64>, Query, description = "Only the last N hours"),
        ("provider" = Option<String>, Query, description = "Filter by provider"),
        ("stage" = Option<String>, Query, description = "Filter by stage")
    ),
    responses(
        (status = 200, description = "Error summary", body = ErrorSummary),
        (status = 400, description = "Invalid filter", body = ApiError)
    ),
    tag = "errors"
)]
pub async fn error_summary(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Query(query): Query<ErrorSummaryQuery>,
) -> Result<Json<ErrorSummary>, ApiError> {
    let provider = parse_provider(&query.provider)?;
    let stage = match &query.stage {
        None => None,
        Some(value) => Some(ErrorStage::parse(value).ok_or_else(|| {
            validation_error(
                "Invalid stage",
                json!({"stage": "Must be one of: ingestion, normalization, processing"}),
            )
        })?),
    };

    let filter = ErrorSummaryFilter {
        include_resolved: query.include_resolved,
        since: query
            .time_range_hours
            .map(|hours| Utc::now() - Duration::hours(hours.max(0))),
        provider,
        stage,
    };

    let summary = state
        .tracker
        .get_error_summary(user_id, &filter, SUMMARY_SCAN_LIMIT)
        .await;

    Ok(Json(summary))
}

/// Errors currently eligible for automated retry
#[utoipa::path(
    get,
    path = "/users/{user_id}/errors/retryable",
    params(
        ("user_id" = Uuid, Path, description = "User to report on"),
        ("provider" = Option<String>, Query, description = "Filter by provider")
    ),
    responses(
        (status = 200, description = "Retryable errors", body = RetryableResponse),
        (status = 400, description = "Invalid filter", body = ApiError)
    ),
    tag = "errors"
)]
pub async fn retryable_errors(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Query(query): Query<RetryableQuery>,
) -> Result<Json<RetryableResponse>, ApiError> {
    let provider = parse_provider(&query.provider)?;

    let records = state
        .tracker
        .get_retryable_errors(user_id, provider, RETRYABLE_LIMIT)
        .await;

    let errors = records.iter().map(ErrorTracker::entry_for).collect();

    Ok(Json(RetryableResponse { errors }))
}

/// Acknowledge (dismiss) an error
#[utoipa::path(
    post,
    path = "/users/{user_id}/errors/{error_id}/acknowledge",
    params(
        ("user_id" = Uuid, Path, description = "Owning user"),
        ("error_id" = Uuid, Path, description = "Error record to acknowledge")
    ),
    responses(
        (status = 200, description = "Acknowledge outcome", body = ErrorUpdateResponse)
    ),
    tag = "errors"
)]
pub async fn acknowledge_error(
    State(state): State<AppState>,
    Path((user_id, error_id)): Path<(Uuid, Uuid)>,
) -> Json<ErrorUpdateResponse> {
    let updated = state.tracker.acknowledge_error(user_id, error_id).await;
    Json(ErrorUpdateResponse { updated })
}

/// Resolve an error
#[utoipa::path(
    post,
    path = "/users/{user_id}/errors/{error_id}/resolve",
    params(
        ("user_id" = Uuid, Path, description = "Owning user"),
        ("error_id" = Uuid, Path, description = "Error record to resolve")
    ),
    request_body = ResolveRequest,
    responses(
        (status = 200, description = "Resolve outcome", body = ErrorUpdateResponse)
    ),
    tag = "errors"
)]
pub async fn resolve_error(
    State(state): State<AppState>,
    Path((user_id, error_id)): Path<(Uuid, Uuid)>,
    body: Option<Json<ResolveRequest>>,
) -> Json<ErrorUpdateResponse> {
    let request = body.map(|Json(request)| request).unwrap_or_default();
    let updated = state
        .tracker
        .resolve_error(user_id, error_id, request.resolution_method.as_deref())
        .await;
    Json(ErrorUpdateResponse { updated })
}

/// Record the outcome of a retry attempt for an error
#[utoipa::path(
    post,
    path = "/users/{user_id}/errors/{error_id}/retry",
    params(
        ("user_id" = Uuid, Path, description = "Owning user"),
        ("error_id" = Uuid, Path, description = "Error record retried")
    ),
    request_body = RetryAttemptRequest,
    responses(
        (status = 200, description = "Retry-recording outcome", body = ErrorUpdateResponse)
    ),
    tag = "errors"
)]
pub async fn record_retry(
    State(state): State<AppState>,
    Path((user_id, error_id)): Path<(Uuid, Uuid)>,
    Json(request): Json<RetryAttemptRequest>,
) -> Json<ErrorUpdateResponse> {
    let updated = state
        .tracker
        .record_retry_attempt(user_id, error_id, request.success, request.details.as_deref())
        .await;
    Json(ErrorUpdateResponse { updated })
}

/// Purge old resolved or acknowledged error records
#[utoipa::path(
    post,
    path = "/admin/errors/cleanup",
    params(
        ("retention_days" = Option<i64>, Query, description = "Override retention window")
    ),
    responses(
        (status = 200, description = "Cleanup outcome", body = CleanupResponse),
        (status = 400, description = "Invalid retention", body = ApiError)
    ),
    tag = "errors"
)]
pub async fn cleanup_errors(
    State(state): State<AppState>,
    Query(query): Query<CleanupQuery>,
) -> Result<Json<CleanupResponse>, ApiError> {
    if let Some(days) = query.retention_days
        && days < 1
    {
        return Err(validation_error(
            "Invalid retention_days parameter",
            json!({"retention_days": "Must be at least 1"}),
        ));
    }

    let deleted = match query.retention_days {
        Some(days) => state.tracker.cleanup_with_retention(days).await,
        None => state.tracker.cleanup_old_errors().await,
    };

    Ok(Json(CleanupResponse { deleted }))
}
