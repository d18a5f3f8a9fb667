//! Blocking sync coordination: collaborator contracts for the provider
//! client and integration directory, plus the orchestrator that drives one
//! user-facing sync session end to end.

pub mod orchestrator;
pub mod stub;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::config::SyncConfig;
use crate::errors::ErrorProvider;

pub use orchestrator::{BlockingSyncResult, SyncOrchestrator, SyncStats};

/// Effective time-window parameters for one sync run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct SyncWindow {
    pub days_past: i64,
    pub days_future: i64,
    pub max_results: u32,
}

impl SyncWindow {
    pub fn from_defaults(config: &SyncConfig) -> Self {
        Self {
            days_past: config.default_days_past,
            days_future: config.default_days_future,
            max_results: config.default_max_results,
        }
    }
}

/// Caller-supplied overrides; anything unset falls back to stored
/// preferences, then to configured defaults.
#[derive(Debug, Clone, Copy, Default, Deserialize, ToSchema)]
pub struct SyncOptions {
    pub days_past: Option<i64>,
    pub days_future: Option<i64>,
    pub max_results: Option<u32>,
}

impl SyncOptions {
    /// Layer these options over a base window.
    pub fn apply_to(&self, base: SyncWindow) -> SyncWindow {
        SyncWindow {
            days_past: self.days_past.unwrap_or(base.days_past),
            days_future: self.days_future.unwrap_or(base.days_future),
            max_results: self.max_results.unwrap_or(base.max_results),
        }
    }
}

/// One live progress update emitted by a provider during sync.
#[derive(Debug, Clone)]
pub struct SyncProgress {
    pub current_step: String,
    pub progress_percentage: i32,
    pub total_items: Option<i32>,
    pub imported_items: Option<i32>,
    pub failed_items: Option<i32>,
}

/// Everything a provider needs for one sync invocation.
pub struct SyncParams {
    pub window: SyncWindow,
    pub batch_id: Uuid,
    pub session_id: Uuid,
    /// Providers send zero or more updates; the orchestrator applies them
    /// to the session row.
    pub progress: mpsc::UnboundedSender<SyncProgress>,
}

/// Final item counts reported by a successful provider sync.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProviderSyncOutcome {
    pub total_items: i32,
    pub imported_items: i32,
    pub failed_items: i32,
}

/// Failures surfaced by the blocking sync flow.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("No {service} integration found for this user")]
    MissingIntegration { service: String },
    #[error("Provider sync failed: {0}")]
    Provider(String),
    #[error(transparent)]
    Db(#[from] sea_orm::DbErr),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Provider-side sync client. External collaborator contract; the real
/// implementations wrap the Gmail/Calendar/Drive APIs.
#[async_trait]
pub trait ProviderSync: Send + Sync {
    async fn sync(
        &self,
        user_id: Uuid,
        params: SyncParams,
    ) -> Result<ProviderSyncOutcome, SyncError>;
}

/// Lookup of a user's connected integrations and stored sync preferences.
#[async_trait]
pub trait IntegrationDirectory: Send + Sync {
    async fn has_integration(
        &self,
        user_id: Uuid,
        service: ErrorProvider,
    ) -> anyhow::Result<bool>;

    async fn sync_preferences(&self, user_id: Uuid) -> anyhow::Result<Option<SyncWindow>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_layer_over_base() {
        let base = SyncWindow {
            days_past: 30,
            days_future: 60,
            max_results: 500,
        };

        let options = SyncOptions {
            days_past: Some(7),
            ..Default::default()
        };

        let window = options.apply_to(base);
        assert_eq!(window.days_past, 7);
        assert_eq!(window.days_future, 60);
        assert_eq!(window.max_results, 500);
    }
}
