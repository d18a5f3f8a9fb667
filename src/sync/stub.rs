//! Local development collaborators: an in-process provider that simulates a
//! short import, an integration directory that accepts every user, and a
//! freshness source with no ingested data. Real deployments inject
//! provider-backed implementations instead.

use async_trait::async_trait;
use uuid::Uuid;

use crate::errors::ErrorProvider;
use crate::jobs::status::{FreshnessCounts, FreshnessSource};
use crate::sync::{
    IntegrationDirectory, ProviderSync, ProviderSyncOutcome, SyncError, SyncParams, SyncProgress,
    SyncWindow,
};

/// Provider that "imports" nothing but exercises the full progress flow.
#[derive(Debug, Default, Clone, Copy)]
pub struct StubProvider;

#[async_trait]
impl ProviderSync for StubProvider {
    async fn sync(
        &self,
        user_id: Uuid,
        params: SyncParams,
    ) -> Result<ProviderSyncOutcome, SyncError> {
        tracing::debug!(
            user_id = %user_id,
            session_id = %params.session_id,
            days_past = params.window.days_past,
            "Stub provider sync"
        );

        let _ = params.progress.send(SyncProgress {
            current_step: "Connecting to provider".to_string(),
            progress_percentage: 10,
            total_items: Some(0),
            imported_items: Some(0),
            failed_items: Some(0),
        });

        Ok(ProviderSyncOutcome::default())
    }
}

/// Directory that treats every user as connected, with no stored
/// preferences.
#[derive(Debug, Default, Clone, Copy)]
pub struct OpenDirectory;

#[async_trait]
impl IntegrationDirectory for OpenDirectory {
    async fn has_integration(
        &self,
        _user_id: Uuid,
        _service: ErrorProvider,
    ) -> anyhow::Result<bool> {
        Ok(true)
    }

    async fn sync_preferences(&self, _user_id: Uuid) -> anyhow::Result<Option<SyncWindow>> {
        Ok(None)
    }
}

/// Freshness source reporting an empty store.
#[derive(Debug, Default, Clone, Copy)]
pub struct EmptyFreshness;

#[async_trait]
impl FreshnessSource for EmptyFreshness {
    async fn freshness_counts(&self, _user_id: Uuid) -> anyhow::Result<FreshnessCounts> {
        Ok(FreshnessCounts::default())
    }
}
