//! # Sync API Handlers
//!
//! Handler for the blocking sync endpoint. The call returns only after the
//! provider import and the inline normalization drain have finished.

use crate::error::{ApiError, validation_error};
use crate::errors::ErrorProvider;
use crate::server::AppState;
use crate::sync::{BlockingSyncResult, SyncError, SyncOptions};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use serde_json::json;
use uuid::Uuid;

impl From<SyncError> for ApiError {
    fn from(error: SyncError) -> Self {
        match error {
            SyncError::MissingIntegration { service } => ApiError::new(
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                &format!("No {} integration found for this user", service),
            ),
            SyncError::Provider(message) => {
                ApiError::new(StatusCode::BAD_GATEWAY, "PROVIDER_ERROR", &message)
            }
            SyncError::Db(db_error) => db_error.into(),
            SyncError::Other(other) => other.into(),
        }
    }
}

/// Run a blocking sync for the user against one service
#[utoipa::path(
    post,
    path = "/users/{user_id}/sync/{service}",
    params(
        ("user_id" = Uuid, Path, description = "User to sync"),
        ("service" = String, Path, description = "Service to sync (gmail, calendar, drive)")
    ),
    request_body = SyncOptions,
    responses(
        (status = 200, description = "Sync result", body = BlockingSyncResult),
        (status = 400, description = "Unknown service", body = ApiError),
        (status = 404, description = "No integration for the service", body = ApiError),
        (status = 502, description = "Provider sync failed", body = ApiError)
    ),
    tag = "sync"
)]
pub async fn blocking_sync(
    State(state): State<AppState>,
    Path((user_id, service)): Path<(Uuid, String)>,
    body: Option<Json<SyncOptions>>,
) -> Result<Json<BlockingSyncResult>, ApiError> {
    let Some(service) = ErrorProvider::parse(&service) else {
        return Err(validation_error(
            "Unknown service",
            json!({"service": "Must be one of: gmail, calendar, drive"}),
        ));
    };

    let options = body.map(|Json(options)| options).unwrap_or_default();

    let result = state
        .orchestrator
        .sync_blocking(user_id, service, options)
        .await?;

    // The sync enqueued and drained jobs; cached status is stale now.
    state.invalidate_status_cache(user_id);

    Ok(Json(result))
}
